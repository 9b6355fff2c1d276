use chrono::{DateTime, Utc};

use classroll_auth::{JwtClaims, Principal};

/// Authenticated caller for a request, derived from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    claims: JwtClaims,
}

impl PrincipalContext {
    pub fn new(claims: JwtClaims) -> Self {
        Self { claims }
    }

    pub fn principal(&self) -> Principal {
        self.claims.principal()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at
    }

    pub fn claims(&self) -> &JwtClaims {
        &self.claims
    }
}
