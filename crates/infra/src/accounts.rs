//! Registration, login, logout and bearer-token authentication.
//!
//! Password hashing is CPU-bound and runs on the blocking pool.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use classroll_auth::{
    Hs256Jwt, JwtClaims, JwtValidator, NewUser, PasswordError, PasswordHasher,
    Registration, TokenError, User,
};
use classroll_core::ValidationErrors;

use crate::revocation::TokenRevocations;
use crate::store::{StoreError, UserStore};

const EMAIL_TAKEN: &str = "The email has already been taken.";
const SEEDED_ADMIN_NAME: &str = "System Admin";
const DUMMY_PASSWORD: &str = "classroll-unknown-account";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("token has been revoked")]
    Revoked,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Login form.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.email.trim().is_empty() {
            errors.add("email", "The email field is required.");
        }
        if self.password.is_empty() {
            errors.add("password", "The password field is required.");
        }
        errors.into_result()
    }
}

/// A signed-in user and their bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AccountService<U> {
    users: U,
    hasher: PasswordHasher,
    jwt: Arc<Hs256Jwt>,
    token_ttl: Duration,
    revocations: TokenRevocations,
    // Verified against for unknown emails so both login failures cost one hash.
    dummy_hash: OnceCell<String>,
}

impl<U> AccountService<U>
where
    U: UserStore,
{
    pub fn new(users: U, hasher: PasswordHasher, jwt: Arc<Hs256Jwt>, token_ttl: Duration) -> Self {
        Self {
            users,
            hasher,
            jwt,
            token_ttl,
            revocations: TokenRevocations::new(),
            dummy_hash: OnceCell::new(),
        }
    }

    /// Self-registration. Always creates a student.
    #[instrument(skip_all)]
    pub async fn register(&self, registration: Registration) -> Result<User, AccountError> {
        registration.validate().map_err(AccountError::Validation)?;

        if self.users.find_by_email(&registration.email).await?.is_some() {
            return Err(email_taken());
        }

        let password_hash = self.hash(registration.password.clone()).await?;
        let user = match self
            .users
            .create_user(NewUser::student(&registration, password_hash))
            .await
        {
            Ok(user) => user,
            // Lost a race with a concurrent registration for the same email.
            Err(StoreError::Conflict(_)) => return Err(email_taken()),
            Err(other) => return Err(other.into()),
        };

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    #[instrument(skip_all)]
    pub async fn login(&self, credentials: Credentials) -> Result<Session, AccountError> {
        credentials.validate().map_err(AccountError::Validation)?;

        let Some(user) = self.users.find_by_email(&credentials.email).await? else {
            let dummy = self.dummy_hash().await?;
            self.verify(credentials.password, dummy).await?;
            return Err(AccountError::InvalidCredentials);
        };
        if !self.verify(credentials.password, user.password_hash.clone()).await? {
            info!(user_id = %user.id, "login rejected");
            return Err(AccountError::InvalidCredentials);
        }

        let now = Utc::now();
        let claims = JwtClaims::issue(user.principal(), now, self.token_ttl);
        let token = self.jwt.sign(&claims)?;
        info!(user_id = %user.id, role = %user.role, "user logged in");

        Ok(Session {
            user,
            token,
            expires_at: claims.expires_at,
        })
    }

    /// Revoke the token carrying `claims`.
    pub fn logout(&self, claims: &JwtClaims) {
        self.revocations.revoke(claims.jti, claims.expires_at, Utc::now());
        info!(user_id = %claims.sub, "user logged out");
    }

    /// Validate a bearer token: signature, time window, revocation.
    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, AccountError> {
        let claims = self.jwt.validate(token, now)?;
        if self.revocations.is_revoked(claims.jti) {
            return Err(AccountError::Revoked);
        }
        Ok(claims)
    }

    /// Create the admin account unless that email already exists.
    ///
    /// Returns the new admin, or `None` when nothing was created.
    #[instrument(skip(self, password))]
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<Option<User>, AccountError> {
        if let Some(existing) = self.users.find_by_email(email).await? {
            if !existing.role.is_admin() {
                warn!(user_id = %existing.id, "admin seed email belongs to a non-admin account");
            }
            return Ok(None);
        }

        let password_hash = self.hash(password.to_string()).await?;
        match self
            .users
            .create_user(NewUser::admin(SEEDED_ADMIN_NAME, email, password_hash))
            .await
        {
            Ok(admin) => {
                info!(user_id = %admin.id, "admin account seeded");
                Ok(Some(admin))
            }
            Err(StoreError::Conflict(_)) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn hash(&self, password: String) -> Result<String, AccountError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AccountError::Task(e.to_string()))?
            .map_err(AccountError::from)
    }

    async fn dummy_hash(&self) -> Result<String, AccountError> {
        self.dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD.to_string()))
            .await
            .cloned()
    }

    async fn verify(&self, password: String, stored: String) -> Result<bool, AccountError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| AccountError::Task(e.to_string()))?
            .map_err(AccountError::from)
    }
}

fn email_taken() -> AccountError {
    let mut errors = ValidationErrors::new();
    errors.add("email", EMAIL_TAKEN);
    AccountError::Validation(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroll_auth::{Principal, Role, TokenValidationError};

    use crate::store::InMemoryUserStore;

    fn service() -> AccountService<InMemoryUserStore> {
        AccountService::new(
            InMemoryUserStore::new(),
            PasswordHasher::new(64, 1).unwrap(),
            Arc::new(Hs256Jwt::new(b"test-secret")),
            Duration::minutes(30),
        )
    }

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
            password_confirmation: "correct horse".to_string(),
        }
    }

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn registration_creates_a_student() {
        let accounts = service();
        let user = accounts.register(registration("ada@example.com")).await.unwrap();
        assert_eq!(user.role, Role::Student);
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() {
        let accounts = service();
        accounts.register(registration("ada@example.com")).await.unwrap();

        let err = accounts
            .register(registration("ADA@example.com"))
            .await
            .unwrap_err();
        match err {
            AccountError::Validation(errors) => {
                assert_eq!(errors.messages("email"), [EMAIL_TAKEN.to_string()]);
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[tokio::test]
    async fn login_issues_a_token_that_authenticates() {
        let accounts = service();
        let user = accounts.register(registration("ada@example.com")).await.unwrap();

        let session = accounts
            .login(credentials("ada@example.com", "correct horse"))
            .await
            .unwrap();
        let claims = accounts.authenticate(&session.token, Utc::now()).unwrap();
        assert_eq!(claims.principal(), Principal::student(user.id));
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let accounts = service();
        accounts.register(registration("ada@example.com")).await.unwrap();

        let wrong_password = accounts
            .login(credentials("ada@example.com", "nope nope"))
            .await
            .unwrap_err();
        let unknown_email = accounts
            .login(credentials("bob@example.com", "correct horse"))
            .await
            .unwrap_err();
        assert!(matches!(wrong_password, AccountError::InvalidCredentials));
        assert!(matches!(unknown_email, AccountError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_email_still_pays_for_a_hash_check() {
        let accounts = service();
        assert!(accounts.dummy_hash.get().is_none());

        let err = accounts
            .login(credentials("ghost@example.com", "whatever"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials));

        let dummy = accounts.dummy_hash.get().expect("dummy hash built on first miss");
        assert!(dummy.starts_with("$argon2id$"));
        assert!(!accounts.hasher.verify("whatever", dummy).unwrap());
    }

    #[tokio::test]
    async fn logout_revokes_the_token() {
        let accounts = service();
        accounts.register(registration("ada@example.com")).await.unwrap();
        let session = accounts
            .login(credentials("ada@example.com", "correct horse"))
            .await
            .unwrap();

        let claims = accounts.authenticate(&session.token, Utc::now()).unwrap();
        accounts.logout(&claims);
        assert!(matches!(
            accounts.authenticate(&session.token, Utc::now()),
            Err(AccountError::Revoked)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let accounts = service();
        accounts.register(registration("ada@example.com")).await.unwrap();
        let session = accounts
            .login(credentials("ada@example.com", "correct horse"))
            .await
            .unwrap();

        let later = session.expires_at + Duration::seconds(1);
        assert!(matches!(
            accounts.authenticate(&session.token, later),
            Err(AccountError::Token(TokenError::Claims(TokenValidationError::Expired)))
        ));
    }

    #[tokio::test]
    async fn admin_is_seeded_once() {
        let accounts = service();
        let admin = accounts
            .seed_admin("admin@example.com", "admin-password")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.name, SEEDED_ADMIN_NAME);

        assert!(
            accounts
                .seed_admin("admin@example.com", "admin-password")
                .await
                .unwrap()
                .is_none()
        );

        let session = accounts
            .login(credentials("admin@example.com", "admin-password"))
            .await
            .unwrap();
        assert_eq!(session.user.role, Role::Admin);
    }
}
