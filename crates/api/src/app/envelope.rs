//! The JSON envelope every response is wrapped in:
//! `{success, message, data, errors, code?}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Value, json};

use classroll_core::ValidationErrors;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    pub errors: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

pub fn ok<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> Response {
    (
        status,
        Json(Envelope {
            success: true,
            message: message.into(),
            data,
            errors: None,
            code: None,
        }),
    )
        .into_response()
}

pub fn error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    failure(status, code, message.into(), None)
}

/// 422 with a field -> messages map.
pub fn validation(errors: &ValidationErrors) -> Response {
    let errors = serde_json::to_value(errors).unwrap_or(Value::Null);
    failure(
        StatusCode::UNPROCESSABLE_ENTITY,
        "validation_error",
        "The given data was invalid.".to_string(),
        Some(errors),
    )
}

fn failure(status: StatusCode, code: &'static str, message: String, errors: Option<Value>) -> Response {
    (
        status,
        Json(Envelope {
            success: false,
            message,
            data: json!([]),
            errors,
            code: Some(code),
        }),
    )
        .into_response()
}
