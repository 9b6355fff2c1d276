//! Enrollment of a student into a course.
//!
//! Every decision is taken inside the course's lock scope from freshly read
//! state: open scope, read capacity and headcount, check for an existing
//! membership, decide, insert, commit. Any failure rolls the scope back.

use thiserror::Error;
use tracing::{info, instrument, warn};

use classroll_auth::{Principal, Role};
use classroll_core::{CourseId, UserId};
use classroll_courses::{Capacity, Enrollment, Rejection, decide};

use crate::store::{CourseStore, LockedCourse, StoreError};

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("only students can enroll (caller is {role})")]
    Forbidden { role: Role },

    #[error("course {0} not found")]
    NotFound(CourseId),

    #[error("already enrolled in this course")]
    AlreadyEnrolled,

    #[error("course is full ({enrolled}/{capacity})")]
    CourseFull { capacity: Capacity, enrolled: u64 },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EnrollError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound(_) => "course_not_found",
            Self::AlreadyEnrolled => "already_enrolled",
            Self::CourseFull { .. } => "course_full",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Only storage failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[derive(Debug, Clone)]
pub struct EnrollmentService<S> {
    store: S,
}

impl<S> EnrollmentService<S>
where
    S: CourseStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enroll `principal` into `course_id`. Never retries on its own.
    #[instrument(
        skip(self, principal),
        fields(course_id = %course_id, user_id = %principal.user_id)
    )]
    pub async fn enroll(
        &self,
        course_id: CourseId,
        principal: &Principal,
    ) -> Result<Enrollment, EnrollError> {
        if !principal.role.is_student() {
            return Err(EnrollError::Forbidden {
                role: principal.role,
            });
        }

        if !self.store.course_exists(course_id).await? {
            info!(outcome = "course_not_found", "enrollment rejected");
            return Err(EnrollError::NotFound(course_id));
        }

        let Some(mut scope) = self.store.lock_course(course_id).await? else {
            info!(outcome = "course_not_found", "course vanished before lock");
            return Err(EnrollError::NotFound(course_id));
        };

        match enroll_locked(scope.as_mut(), principal.user_id).await {
            Ok(enrollment) => {
                info!(
                    enrolled = enrollment.enrolled,
                    capacity = enrollment.capacity.get(),
                    "student enrolled"
                );
                Ok(enrollment)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(error = %rollback_err, "rollback of enrollment scope failed");
                }
                match &err {
                    EnrollError::Storage(cause) => warn!(error = %cause, "enrollment failed"),
                    other => info!(outcome = other.code(), "enrollment rejected"),
                }
                Err(err)
            }
        }
    }
}

async fn enroll_locked(
    scope: &mut dyn LockedCourse,
    user_id: UserId,
) -> Result<Enrollment, EnrollError> {
    let snapshot = scope.snapshot();
    let already_member = scope.membership_exists(user_id).await?;

    decide(&snapshot, already_member).map_err(|rejection| match rejection {
        Rejection::AlreadyEnrolled => EnrollError::AlreadyEnrolled,
        Rejection::CourseFull => EnrollError::CourseFull {
            capacity: snapshot.capacity,
            enrolled: snapshot.enrolled,
        },
    })?;

    match scope.insert_membership(user_id).await {
        Ok(()) => {}
        Err(StoreError::Conflict(_)) => return Err(EnrollError::AlreadyEnrolled),
        Err(other) => return Err(other.into()),
    }
    scope.commit().await?;

    Ok(Enrollment {
        course_id: scope.course_id(),
        user_id,
        enrolled: snapshot.enrolled + 1,
        capacity: snapshot.capacity,
    })
}
