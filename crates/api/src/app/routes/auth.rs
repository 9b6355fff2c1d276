use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::Response,
};
use serde_json::Value;

use classroll_auth::Registration;
use classroll_infra::Credentials;

use crate::app::services::AppServices;
use crate::app::{dto, envelope, errors};
use crate::context::PrincipalContext;

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Response {
    let registration = match errors::json_body(body) {
        Ok(r) => r,
        Err(res) => return res,
    };

    match services.accounts.register(registration).await {
        Ok(user) => envelope::ok(
            StatusCode::CREATED,
            "User registered successfully.",
            dto::UserResponse { user },
        ),
        Err(e) => errors::account_error_to_response(e),
    }
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Response {
    let credentials = match errors::json_body(body) {
        Ok(c) => c,
        Err(res) => return res,
    };

    match services.accounts.login(credentials).await {
        Ok(session) => envelope::ok(
            StatusCode::OK,
            "Login successful.",
            dto::LoginResponse::from(session),
        ),
        Err(e) => errors::account_error_to_response(e),
    }
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    services.accounts.logout(principal.claims());
    envelope::ok(StatusCode::OK, "Logged out successfully.", Value::Null)
}
