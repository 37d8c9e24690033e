use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::Mutex;

use crate::{
    errors::AdapterError,
    models::{
        connections::{ConnectionConfig, DbType},
        schema::{ColumnSchema, ForeignKeySchema},
    },
};

pub mod mysql;
pub mod postgres;

/// Read-only schema facts for one connected database.
#[async_trait]
pub trait SchemaAdapter: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>, AdapterError>;
    /// Columns in declaration order.
    async fn list_columns(&self, table_name: &str) -> Result<Vec<ColumnSchema>, AdapterError>;
    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeySchema>, AdapterError>;
}

/// Opens one adapter per database name.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn connect(&self, database: &str) -> Result<Arc<dyn SchemaAdapter>, AdapterError>;
}

/// Maps a driver error onto the adapter taxonomy. Errors reported by the
/// server itself mean the query was refused and may be retried another way;
/// everything else (I/O, pool, protocol) is propagated as is.
pub(crate) fn classify(e: sqlx::Error) -> AdapterError {
    match e {
        sqlx::Error::Database(db) => AdapterError::MetadataRejected(db.message().to_string()),
        other => AdapterError::Sqlx(other),
    }
}

/// Runs `primary`; if it fails with `MetadataRejected`, runs `fallback`.
/// Any other failure is returned untouched.
pub async fn with_fallback<T, P, F, Fut>(
    what: &str,
    primary: P,
    fallback: F,
) -> Result<T, AdapterError>
where
    P: Future<Output = Result<T, AdapterError>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    match primary.await {
        Err(AdapterError::MetadataRejected(reason)) => {
            warn!("{} rejected ({}), using information_schema", what, reason);
            fallback().await
        }
        other => other,
    }
}

/// Connects to MySQL or PostgreSQL servers, one pool per database, and
/// reuses the pool for later requests on the same database.
pub struct SqlSchemaSource {
    config: ConnectionConfig,
    connections: Arc<Mutex<HashMap<String, Arc<dyn SchemaAdapter>>>>,
}

impl SqlSchemaSource {
    pub fn new(config: ConnectionConfig) -> Self {
        SqlSchemaSource {
            config,
            connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SchemaSource for SqlSchemaSource {
    async fn connect(&self, database: &str) -> Result<Arc<dyn SchemaAdapter>, AdapterError> {
        let mut connections = self.connections.lock().await;
        if let Some(adapter) = connections.get(database) {
            return Ok(adapter.clone());
        }

        let adapter: Arc<dyn SchemaAdapter> = match self.config.db_type {
            DbType::MySql => Arc::new(mysql::MySqlAdapter::connect(&self.config, database).await?),
            DbType::Postgres => {
                Arc::new(postgres::PostgresAdapter::connect(&self.config, database).await?)
            }
        };
        connections.insert(database.to_string(), adapter.clone());
        Ok(adapter)
    }
}

/// Picks the primary-key column: the first flagged column in declaration
/// order. Composite keys are not represented; the extra columns are logged.
pub fn primary_key_of(table_name: &str, columns: &[ColumnSchema]) -> Option<String> {
    let mut flagged = columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.as_str());
    let first = flagged.next()?;
    let ignored: Vec<&str> = flagged.collect();
    if !ignored.is_empty() {
        warn!(
            "Table {} declares a composite primary key; using {} and ignoring {:?}",
            table_name, first, ignored
        );
    }
    Some(first.to_string())
}
