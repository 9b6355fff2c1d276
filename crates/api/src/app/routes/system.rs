use axum::{Extension, http::StatusCode, response::Response};
use serde_json::json;

use crate::app::{dto, envelope};
use crate::context::PrincipalContext;

pub async fn health() -> Response {
    envelope::ok(StatusCode::OK, "OK", json!({ "status": "ok" }))
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Response {
    let p = principal.principal();
    envelope::ok(
        StatusCode::OK,
        "Authenticated.",
        dto::WhoAmIResponse {
            user_id: p.user_id,
            role: p.role,
            expires_at: principal.expires_at(),
        },
    )
}
