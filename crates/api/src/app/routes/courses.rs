use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde_json::Value;

use classroll_courses::{CourseDraft, CoursePatch};

use crate::app::services::AppServices;
use crate::app::{dto, envelope, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_courses).post(create_course))
        .route(
            "/:id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/:id/enroll", post(enroll))
}

pub async fn list_courses(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::PageQuery>, QueryRejection>,
) -> Response {
    let query = match errors::query_params(query) {
        Ok(q) => q,
        Err(res) => return res,
    };

    match services.catalog.list(query.into()).await {
        Ok(page) => envelope::ok(StatusCode::OK, "Courses retrieved successfully.", page),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn get_course(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse_course_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.catalog.get(id).await {
        Ok(course) => envelope::ok(StatusCode::OK, "Course retrieved successfully.", course),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn create_course(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CourseDraft>, JsonRejection>,
) -> Response {
    if let Err(res) = authz::require_admin(&principal) {
        return res;
    }
    let draft = match errors::json_body(body) {
        Ok(d) => d,
        Err(res) => return res,
    };

    match services.catalog.create(&principal.principal(), draft).await {
        Ok(course) => envelope::ok(StatusCode::CREATED, "Course created successfully.", course),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn update_course(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<CoursePatch>, JsonRejection>,
) -> Response {
    if let Err(res) = authz::require_admin(&principal) {
        return res;
    }
    let id = match errors::parse_course_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let patch = match errors::json_body(body) {
        Ok(p) => p,
        Err(res) => return res,
    };

    match services.catalog.update(&principal.principal(), id, patch).await {
        Ok(course) => envelope::ok(StatusCode::OK, "Course updated successfully.", course),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn delete_course(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(res) = authz::require_admin(&principal) {
        return res;
    }
    let id = match errors::parse_course_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.catalog.delete(&principal.principal(), id).await {
        Ok(()) => envelope::ok(StatusCode::OK, "Course deleted successfully.", Value::Null),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn enroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse_course_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.enrollment.enroll(id, &principal.principal()).await {
        Ok(enrollment) => envelope::ok(StatusCode::OK, "Enrolled successfully.", enrollment),
        Err(e) => errors::enroll_error_to_response(e),
    }
}
