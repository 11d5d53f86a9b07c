use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::memory::MemoryStore;
use crate::database::postgres::PgStore;
use crate::database::store::{StoreError, Stores};

/// Opens the backend named by the configured URL.
pub struct DatabaseManager;

impl DatabaseManager {
    /// `memory://` selects the in-process store; `postgres://` /
    /// `postgresql://` connect a pool and run migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Stores, StoreError> {
        let url = url::Url::parse(&config.url)
            .map_err(|_| StoreError::Unavailable(format!("invalid database URL: {:?}", redact(&config.url))))?;

        match url.scheme() {
            "memory" => {
                info!("Using in-memory store");
                Ok(Stores::from_backend(Arc::new(MemoryStore::new())))
            }
            "postgres" | "postgresql" => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(config.connection_timeout))
                    .connect(&config.url)
                    .await?;
                let store = PgStore::new(pool);
                store.migrate().await?;
                info!("Connected to postgres at {}", redact(&config.url));
                Ok(Stores::from_backend(Arc::new(store)))
            }
            other => Err(StoreError::Unavailable(format!("unsupported database scheme: {}", other))),
        }
    }
}

/// Connection string with the password removed, for logs.
fn redact(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}
