//! Runtime configuration, from command-line flags or the environment.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use classroll_observability::LogFormat;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, Parser)]
#[command(name = "classroll-api", about = "Course enrollment HTTP API")]
pub struct ApiConfig {
    /// Address the HTTP server listens on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// HS256 signing secret for bearer tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "TOKEN_TTL_MINUTES", default_value_t = 60)]
    pub token_ttl_minutes: i64,

    /// Postgres connection string. In-memory stores are used when absent.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub database_max_connections: u32,

    /// Upper bound on waiting for a course lock.
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value_t = 5000)]
    pub lock_timeout_ms: u64,

    /// Seed an admin account with this email on startup.
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// `json` or `pretty`.
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    /// Argon2 memory cost in KiB.
    #[arg(long, env = "PASSWORD_MEMORY_KIB", default_value_t = 19 * 1024)]
    pub password_memory_kib: u32,

    /// Argon2 iteration count.
    #[arg(long, env = "PASSWORD_ITERATIONS", default_value_t = 2)]
    pub password_iterations: u32,
}

impl ApiConfig {
    pub fn jwt_secret(&self) -> String {
        match &self.jwt_secret {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.token_ttl_minutes.max(1))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Admin credentials, when both halves are configured.
    pub fn admin_seed(&self) -> Option<(&str, &str)> {
        match (self.admin_email.as_deref(), self.admin_password.as_deref()) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Some((email, password))
            }
            _ => None,
        }
    }
}
