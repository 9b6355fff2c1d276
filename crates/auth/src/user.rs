//! User accounts and self-registration.
//!
//! Registration never chooses a role: [`NewUser::student`] is the only path
//! reachable from user input, admins come from [`NewUser::admin`] (seeding).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroll_core::{UserId, ValidationErrors};

use crate::Role;

const MAX_FIELD_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 8;

/// A persisted user account.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn principal(&self) -> crate::Principal {
        crate::Principal::new(self.id, self.role)
    }
}

impl core::fmt::Debug for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Self-registration form.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "The name field is required.");
        } else if name.chars().count() > MAX_FIELD_LEN {
            errors.add("name", "The name may not be greater than 255 characters.");
        }

        let email = normalize_email(&self.email);
        if email.is_empty() {
            errors.add("email", "The email field is required.");
        } else if email.chars().count() > MAX_FIELD_LEN || !looks_like_email(&email) {
            errors.add("email", "The email must be a valid email address.");
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add("password", "The password must be at least 8 characters.");
        }
        if self.password != self.password_confirmation {
            errors.add("password", "The password confirmation does not match.");
        }

        errors.into_result()
    }
}

/// Account about to be persisted (password already hashed).
#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl NewUser {
    pub fn student(registration: &Registration, password_hash: String) -> Self {
        Self {
            name: registration.name.trim().to_string(),
            email: normalize_email(&registration.email),
            password_hash,
            role: Role::Student,
        }
    }

    pub fn admin(name: impl Into<String>, email: &str, password_hash: String) -> Self {
        Self {
            name: name.into(),
            email: normalize_email(email),
            password_hash,
            role: Role::Admin,
        }
    }

    /// Materialize the account with a fresh id and timestamps.
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: UserId::new(),
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            created_at: now,
            updated_at: now,
        }
    }
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Emails compare case-insensitively and ignore surrounding whitespace.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
