//! Course administration and browsing.

use thiserror::Error;
use tracing::{info, instrument};

use classroll_auth::{AuthzError, Principal, Role, authorize};
use classroll_core::{CourseId, Page, PageRequest, ValidationErrors};
use classroll_courses::{Course, CourseDraft, CoursePatch, CourseSummary};

use crate::store::{CourseStore, StoreError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("course {0} not found")]
    NotFound(CourseId),

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S> CatalogService<S>
where
    S: CourseStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<CourseSummary>, CatalogError> {
        Ok(self.store.list_courses(page).await?)
    }

    pub async fn get(&self, id: CourseId) -> Result<CourseSummary, CatalogError> {
        self.store
            .get_course(id)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    #[instrument(skip(self, principal, draft), fields(admin_id = %principal.user_id))]
    pub async fn create(
        &self,
        principal: &Principal,
        draft: CourseDraft,
    ) -> Result<Course, CatalogError> {
        authorize(principal, Role::Admin)?;
        let new_course = draft.validate().map_err(CatalogError::Validation)?;
        let course = self.store.create_course(new_course).await?;
        info!(course_id = %course.id, capacity = course.capacity.get(), "course created");
        Ok(course)
    }

    /// Update title and/or capacity under the course lock.
    #[instrument(skip(self, principal, patch), fields(admin_id = %principal.user_id, course_id = %id))]
    pub async fn update(
        &self,
        principal: &Principal,
        id: CourseId,
        patch: CoursePatch,
    ) -> Result<Course, CatalogError> {
        authorize(principal, Role::Admin)?;
        let changes = patch.validate().map_err(CatalogError::Validation)?;
        let course = self
            .store
            .update_course(id, changes)
            .await?
            .ok_or(CatalogError::NotFound(id))?;
        info!(capacity = course.capacity.get(), "course updated");
        Ok(course)
    }

    /// Delete a course and, with it, every membership.
    #[instrument(skip(self, principal), fields(admin_id = %principal.user_id, course_id = %id))]
    pub async fn delete(&self, principal: &Principal, id: CourseId) -> Result<(), CatalogError> {
        authorize(principal, Role::Admin)?;
        if !self.store.delete_course(id).await? {
            return Err(CatalogError::NotFound(id));
        }
        info!("course deleted");
        Ok(())
    }
}
