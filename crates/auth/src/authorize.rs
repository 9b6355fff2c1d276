use thiserror::Error;

use crate::{Principal, Role};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: requires role '{required}', caller has '{actual}'")]
    Forbidden { required: Role, actual: Role },
}

/// Authorize a principal for an operation reserved to `required`.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: Role) -> Result<(), AuthzError> {
    if principal.role == required {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            required,
            actual: principal.role,
        })
    }
}
