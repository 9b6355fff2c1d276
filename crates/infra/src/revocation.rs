//! Process-local token revocation (logout).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Revoked token ids, each kept until the token would have expired anyway.
#[derive(Debug, Default)]
pub struct TokenRevocations {
    revoked: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl TokenRevocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `jti` and forget entries that expired before `now`.
    pub fn revoke(&self, jti: Uuid, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        let mut revoked = self.revoked.write().unwrap_or_else(PoisonError::into_inner);
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(jti, expires_at);
    }

    pub fn is_revoked(&self, jti: Uuid) -> bool {
        self.revoked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&jti)
    }

    pub fn len(&self) -> usize {
        self.revoked.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
