//! Mapping of service errors and request rejections to envelope responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;

use classroll_core::CourseId;
use classroll_infra::store::StoreError;
use classroll_infra::{AccountError, CatalogError, EnrollError};

use crate::app::envelope::{self, error};

pub fn enroll_error_to_response(err: EnrollError) -> Response {
    let code = err.code();
    match err {
        EnrollError::Forbidden { .. } => error(
            StatusCode::FORBIDDEN,
            code,
            "Only students can enroll in courses.",
        ),
        EnrollError::NotFound(_) => error(StatusCode::NOT_FOUND, code, "Course not found."),
        EnrollError::AlreadyEnrolled => error(
            StatusCode::BAD_REQUEST,
            code,
            "You are already enrolled in this course.",
        ),
        EnrollError::CourseFull { .. } => error(StatusCode::BAD_REQUEST, code, "Course is full."),
        EnrollError::Storage(e) => storage_error_to_response(code, &e),
    }
}

pub fn catalog_error_to_response(err: CatalogError) -> Response {
    match err {
        CatalogError::Forbidden(_) => error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Access denied. Admins only.",
        ),
        CatalogError::NotFound(_) => {
            error(StatusCode::NOT_FOUND, "course_not_found", "Course not found.")
        }
        CatalogError::Validation(errors) => envelope::validation(&errors),
        CatalogError::Storage(e) => storage_error_to_response("storage_error", &e),
    }
}

pub fn account_error_to_response(err: AccountError) -> Response {
    match err {
        AccountError::Validation(errors) => envelope::validation(&errors),
        AccountError::InvalidCredentials => error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "Invalid email or password.",
        ),
        AccountError::Token(_) | AccountError::Revoked => {
            error(StatusCode::UNAUTHORIZED, "unauthenticated", "Unauthenticated.")
        }
        AccountError::Storage(e) => storage_error_to_response("storage_error", &e),
        AccountError::Password(e) => {
            tracing::error!(error = %e, "password hashing failed");
            internal_error()
        }
        AccountError::Task(msg) => {
            tracing::error!(error = %msg, "blocking task failed");
            internal_error()
        }
    }
}

fn storage_error_to_response(code: &'static str, err: &StoreError) -> Response {
    if err.is_retryable() {
        tracing::warn!(error = %err, "storage contention");
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            code,
            "The resource is busy, please retry.",
        )
    } else {
        tracing::error!(error = %err, "storage failure");
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            code,
            "A storage error occurred, please retry later.",
        )
    }
}

fn internal_error() -> Response {
    error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Something went wrong.",
    )
}

pub fn parse_course_id(raw: &str) -> Result<CourseId, Response> {
    raw.parse()
        .map_err(|_| error(StatusCode::BAD_REQUEST, "invalid_id", "Invalid course id."))
}

/// Unwrap a JSON body, answering malformed input with 400 `invalid_body`.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(v)| v)
        .map_err(|e| error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text()))
}

pub fn query_params<T>(query: Result<axum::extract::Query<T>, QueryRejection>) -> Result<T, Response> {
    query
        .map(|axum::extract::Query(v)| v)
        .map_err(|e| error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroll_courses::Capacity;

    #[test]
    fn enrollment_outcomes_map_to_distinct_statuses() {
        let cases = [
            (EnrollError::AlreadyEnrolled, StatusCode::BAD_REQUEST),
            (
                EnrollError::CourseFull {
                    capacity: Capacity::new(1).unwrap(),
                    enrolled: 1,
                },
                StatusCode::BAD_REQUEST,
            ),
            (EnrollError::NotFound(CourseId::new()), StatusCode::NOT_FOUND),
            (
                EnrollError::Forbidden {
                    role: classroll_auth::Role::Admin,
                },
                StatusCode::FORBIDDEN,
            ),
            (
                EnrollError::Storage(StoreError::LockTimeout {
                    course_id: CourseId::new(),
                    waited_ms: 5,
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                EnrollError::Storage(StoreError::backend("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(enroll_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn malformed_course_id_is_bad_request() {
        let res = parse_course_id("not-a-uuid").unwrap_err();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
