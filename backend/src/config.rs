use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string, or `memory` for a process-local store
    /// that does not survive restarts.
    pub database_url: String,

    /// Upper bound on pooled store connections.
    pub db_max_connections: u32,

    /// Address the HTTP endpoints bind to.
    pub bind_addr: String,

    /// Header carrying the caller id, set by the authenticating gateway
    /// in front of this service.
    pub identity_header: String,

    /// Store round-trips slower than this are logged as warnings.
    pub store_slow_threshold: Duration,

    /// Optional JSON file of catalog modules upserted at startup.
    pub catalog_seed_path: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://rewards_dev.db?mode=rwc".to_string());

        Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 16),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            identity_header: std::env::var("IDENTITY_HEADER")
                .unwrap_or_else(|_| "x-verified-user-id".to_string()),
            store_slow_threshold: Duration::from_millis(env_or("STORE_SLOW_MS", 100)),
            catalog_seed_path: std::env::var("CATALOG_SEED_PATH")
                .ok()
                .filter(|p| !p.is_empty()),
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == "memory"
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "invalid config value; using default");
            default
        }),
        Err(_) => default,
    }
}
