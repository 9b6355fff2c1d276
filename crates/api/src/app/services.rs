//! Service wiring: picks the storage engine and builds the application
//! services on top of it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use classroll_auth::{Hs256Jwt, PasswordHasher};
use classroll_infra::store::{
    self, CourseStore, InMemoryCourseStore, InMemoryUserStore, PostgresCourseStore,
    PostgresUserStore, UserStore,
};
use classroll_infra::{AccountService, CatalogService, EnrollmentService};

use crate::config::ApiConfig;

pub struct AppServices {
    pub accounts: AccountService<Arc<dyn UserStore>>,
    pub catalog: CatalogService<Arc<dyn CourseStore>>,
    pub enrollment: EnrollmentService<Arc<dyn CourseStore>>,
}

impl AppServices {
    pub fn new(
        courses: Arc<dyn CourseStore>,
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        jwt: Arc<Hs256Jwt>,
        token_ttl: chrono::Duration,
    ) -> Self {
        Self {
            accounts: AccountService::new(users, hasher, jwt, token_ttl),
            catalog: CatalogService::new(courses.clone()),
            enrollment: EnrollmentService::new(courses),
        }
    }

    /// Services over fresh in-memory stores (dev and tests).
    pub fn in_memory(
        hasher: PasswordHasher,
        jwt_secret: &[u8],
        token_ttl: chrono::Duration,
        lock_timeout: Duration,
    ) -> Self {
        Self::new(
            Arc::new(InMemoryCourseStore::new().with_lock_timeout(lock_timeout)),
            Arc::new(InMemoryUserStore::new()),
            hasher,
            Arc::new(Hs256Jwt::new(jwt_secret)),
            token_ttl,
        )
    }

    /// Build from configuration: Postgres when `DATABASE_URL` is set
    /// (migrations applied), in-memory otherwise. Seeds the admin account
    /// when configured.
    pub async fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(config.password_memory_kib, config.password_iterations)
            .context("invalid password hashing parameters")?;
        let jwt = Arc::new(Hs256Jwt::new(config.jwt_secret().as_bytes()));

        let services = match config.database_url.as_deref() {
            Some(url) => {
                let pool = store::connect(url, config.database_max_connections)
                    .await
                    .context("failed to connect to Postgres")?;
                store::migrate(&pool).await.context("failed to run migrations")?;
                tracing::info!("using Postgres stores");
                Self::new(
                    Arc::new(PostgresCourseStore::new(pool.clone(), config.lock_timeout())),
                    Arc::new(PostgresUserStore::new(pool)),
                    hasher,
                    jwt,
                    config.token_ttl(),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory stores");
                Self::new(
                    Arc::new(InMemoryCourseStore::new().with_lock_timeout(config.lock_timeout())),
                    Arc::new(InMemoryUserStore::new()),
                    hasher,
                    jwt,
                    config.token_ttl(),
                )
            }
        };

        if let Some((email, password)) = config.admin_seed() {
            services
                .accounts
                .seed_admin(email, password)
                .await
                .context("failed to seed admin account")?;
        }

        Ok(services)
    }
}
