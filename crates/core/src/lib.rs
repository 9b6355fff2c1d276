//! `classroll-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod pagination;
pub mod validation;

pub use error::{DomainError, DomainResult};
pub use id::{CourseId, UserId};
pub use pagination::{Page, PageRequest};
pub use validation::ValidationErrors;
