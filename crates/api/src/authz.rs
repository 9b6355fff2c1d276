//! Route-level role checks, run in handlers before calling a service.
//!
//! This is the route gate. `CatalogService` repeats the check as the domain
//! guard for callers that bypass HTTP.

use axum::http::StatusCode;
use axum::response::Response;

use classroll_auth::{Role, authorize};

use crate::app::envelope;
use crate::context::PrincipalContext;

pub fn require_admin(principal: &PrincipalContext) -> Result<(), Response> {
    authorize(&principal.principal(), Role::Admin).map_err(|e| {
        tracing::info!(error = %e, "admin route refused");
        envelope::error(StatusCode::FORBIDDEN, "forbidden", "Access denied. Admins only.")
    })
}
