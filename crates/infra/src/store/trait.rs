use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use classroll_auth::{NewUser, User};
use classroll_core::{CourseId, Page, PageRequest, UserId};
use classroll_courses::{Course, CourseChanges, CourseSnapshot, CourseSummary, NewCourse};

/// Storage failure.
///
/// These are infrastructure errors, as opposed to business outcomes such as a
/// full course. `LockTimeout` is the only variant a caller may retry as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("timed out after {waited_ms}ms waiting for the lock on course {course_id}")]
    LockTimeout { course_id: CourseId, waited_ms: u64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

/// Durable courses and memberships.
///
/// Reads never block on a course lock. Every mutation of a single course
/// (enrollment, capacity update, deletion) runs inside that course's
/// exclusive lock scope, so they serialize per course and never across
/// courses.
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError>;

    async fn get_course(&self, id: CourseId) -> Result<Option<CourseSummary>, StoreError>;

    /// Courses in creation order.
    async fn list_courses(&self, page: PageRequest) -> Result<Page<CourseSummary>, StoreError>;

    /// Lock-free existence probe.
    async fn course_exists(&self, id: CourseId) -> Result<bool, StoreError>;

    /// Open the exclusive lock scope of one course.
    ///
    /// Waits at most the store's configured lock timeout, then fails with
    /// [`StoreError::LockTimeout`]. Returns `Ok(None)` when the course does
    /// not exist once the lock is obtained.
    async fn lock_course(&self, id: CourseId) -> Result<Option<Box<dyn LockedCourse>>, StoreError>;

    /// Apply changes under the course lock. `Ok(None)` if the course is gone.
    async fn update_course(
        &self,
        id: CourseId,
        changes: CourseChanges,
    ) -> Result<Option<Course>, StoreError>;

    /// Delete a course and its memberships under the course lock.
    async fn delete_course(&self, id: CourseId) -> Result<bool, StoreError>;
}

/// An open, exclusive lock scope over one course.
///
/// Writes become visible only on [`commit`](LockedCourse::commit). Dropping
/// the scope without committing discards them and releases the lock.
#[async_trait]
pub trait LockedCourse: Send {
    fn course_id(&self) -> CourseId;

    /// Capacity and membership count read when the lock was taken.
    fn snapshot(&self) -> CourseSnapshot;

    async fn membership_exists(&mut self, user_id: UserId) -> Result<bool, StoreError>;

    async fn insert_membership(&mut self, user_id: UserId) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Registered users. Emails are unique case-insensitively.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;
}

#[async_trait]
impl<S> CourseStore for Arc<S>
where
    S: CourseStore + ?Sized,
{
    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        (**self).create_course(course).await
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<CourseSummary>, StoreError> {
        (**self).get_course(id).await
    }

    async fn list_courses(&self, page: PageRequest) -> Result<Page<CourseSummary>, StoreError> {
        (**self).list_courses(page).await
    }

    async fn course_exists(&self, id: CourseId) -> Result<bool, StoreError> {
        (**self).course_exists(id).await
    }

    async fn lock_course(&self, id: CourseId) -> Result<Option<Box<dyn LockedCourse>>, StoreError> {
        (**self).lock_course(id).await
    }

    async fn update_course(
        &self,
        id: CourseId,
        changes: CourseChanges,
    ) -> Result<Option<Course>, StoreError> {
        (**self).update_course(id, changes).await
    }

    async fn delete_course(&self, id: CourseId) -> Result<bool, StoreError> {
        (**self).delete_course(id).await
    }
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        (**self).create_user(user).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_by_id(id).await
    }
}
