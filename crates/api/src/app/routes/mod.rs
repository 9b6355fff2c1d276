use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod courses;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/logout", post(auth::logout))
        .nest("/courses", courses::router())
}
