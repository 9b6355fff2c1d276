//! Storage boundary for courses, memberships and users.
//!
//! Two engines implement the ports: an in-memory one for tests and local
//! runs, and Postgres for deployments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryCourseStore, InMemoryUserStore};
pub use postgres::{PostgresCourseStore, PostgresUserStore, connect, migrate};
pub use r#trait::{CourseStore, LockedCourse, StoreError, UserStore};
