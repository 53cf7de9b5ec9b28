use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::infrastructure::identity::IdentityConfig;
use crate::services::post_service::PageSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub pagination: PaginationConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub max_failed_attempts: u32,
    pub lockout_secs: u64,
    pub sign_in_rate_per_minute: u32,
    /// 0 disables the session sweeper
    pub session_sweep_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// 0 disables the background job
    pub interval_secs: u64,
}

const DEV_JWT_SECRET: &str = "change-me-in-production";

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let config = Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/community_board.db".to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 3000),
            },
            cache: CacheConfig {
                capacity: env_or("CACHE_CAPACITY", 1000),
            },
            auth: AuthConfig {
                jwt_secret,
                token_ttl_secs: env_or("TOKEN_TTL_SECS", 86_400),
                max_failed_attempts: env_or("MAX_FAILED_ATTEMPTS", 5),
                lockout_secs: env_or("LOCKOUT_SECS", 900),
                sign_in_rate_per_minute: env_or("SIGN_IN_RATE_PER_MINUTE", 20),
                session_sweep_secs: env_or("SESSION_SWEEP_SECS", 300),
            },
            storage: StorageConfig {
                root: env::var("STORAGE_ROOT").unwrap_or_else(|_| "data/blobs".to_string()),
                public_base_url: env::var("PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/media".to_string()),
            },
            pagination: PaginationConfig {
                default_page_size: env_or("DEFAULT_PAGE_SIZE", 10),
                max_page_size: env_or("MAX_PAGE_SIZE", 100),
            },
            reconcile: ReconcileConfig {
                interval_secs: env_or("RECONCILE_INTERVAL_SECS", 0),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// In-memory store and blobs under `root`; used by tests and one-off tools.
    pub fn local(root: &Path) -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            cache: CacheConfig { capacity: 100 },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                token_ttl_secs: 3600,
                max_failed_attempts: 5,
                lockout_secs: 900,
                sign_in_rate_per_minute: 100,
                session_sweep_secs: 0,
            },
            storage: StorageConfig {
                root: root.join("blobs").display().to_string(),
                public_base_url: "http://localhost:3000/media".to_string(),
            },
            pagination: PaginationConfig {
                default_page_size: 10,
                max_page_size: 100,
            },
            reconcile: ReconcileConfig { interval_secs: 0 },
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let pages = &self.pagination;
        if pages.default_page_size == 0 || pages.default_page_size > pages.max_page_size {
            anyhow::bail!(
                "DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE ({})",
                pages.max_page_size
            );
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            jwt_secret: self.auth.jwt_secret.clone(),
            token_ttl: Duration::from_secs(self.auth.token_ttl_secs),
            max_failed_attempts: self.auth.max_failed_attempts,
            lockout_duration: Duration::from_secs(self.auth.lockout_secs),
            sign_in_rate_per_minute: self.auth.sign_in_rate_per_minute,
        }
    }

    pub fn page_settings(&self) -> PageSettings {
        PageSettings {
            default_page_size: self.pagination.default_page_size,
            max_page_size: self.pagination.max_page_size,
        }
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        let secs = self.reconcile.interval_secs;
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    pub fn session_sweep_interval(&self) -> Option<Duration> {
        let secs = self.auth.session_sweep_secs;
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}
