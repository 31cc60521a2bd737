//! Database layer for RagForge
//!
//! Provides:
//! - SeaORM entity models
//! - The `DocumentStore` trait with Postgres and in-memory backends
//! - Connection pool management

mod memory;
pub mod models;
mod repository;
mod store;

pub use memory::InMemoryDocumentStore;
pub use repository::Repository;
pub use store::{DocumentStore, NewChunk, NewDocument};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Primary connection plus an optional read replica
#[derive(Clone)]
pub struct DbPool {
    pub primary: DatabaseConnection,
    pub replica: Option<DatabaseConnection>,
}

/// Expression index backing lexical search
const FULL_TEXT_INDEX: &str = "CREATE INDEX IF NOT EXISTS chunks_content_fts \
     ON chunks USING GIN (to_tsvector('english', content))";

/// One row per natural key
const CHUNK_KEY_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS chunks_document_chunk_index \
     ON chunks (document_id, chunk_index)";

impl DbPool {
    /// Connect using `database.url`, plus `database.read_url` when set
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| AppError::Configuration {
            message: "database.url is required for the postgres document store".to_string(),
        })?;

        let primary = connect("primary", url, config).await?;
        let replica = match config.read_url.as_deref() {
            Some(read_url) => Some(connect("replica", read_url, config).await?),
            None => None,
        };

        info!(replica = replica.is_some(), "Database connections established");
        Ok(Self { primary, replica })
    }

    /// Connection for reads; the replica when one is configured
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Create the `documents` and `chunks` tables, the natural-key index and
    /// the full-text index when they do not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        let backend = self.primary.get_database_backend();
        let schema = Schema::new(backend);

        for mut table in [
            schema.create_table_from_entity(models::DocumentEntity),
            schema.create_table_from_entity(models::ChunkEntity),
        ] {
            table.if_not_exists();
            self.primary.execute(backend.build(&table)).await?;
        }
        for index in [CHUNK_KEY_INDEX, FULL_TEXT_INDEX] {
            self.primary.execute_unprepared(index).await?;
        }

        info!("Database schema ready");
        Ok(())
    }

    /// `SELECT 1` against every connection
    pub async fn ping(&self) -> Result<()> {
        let targets = std::iter::once(("primary", &self.primary)).chain(self.replica.iter().map(|r| ("replica", r)));
        for (role, conn) in targets {
            conn.execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("{} ping failed: {}", role, e),
                })?;
        }
        Ok(())
    }
}

async fn connect(role: &str, url: &str, config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut opts = ConnectOptions::new(url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);

    Database::connect(opts)
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect to {}: {}", role, e),
        })
}
