use serde::{Deserialize, Serialize};

use classroll_core::UserId;

use crate::Role;

/// An authenticated caller: who they are and what role they act with.
///
/// Handed explicitly to every operation that needs it; there is no ambient
/// "current user".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn student(user_id: UserId) -> Self {
        Self::new(user_id, Role::Student)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }
}
