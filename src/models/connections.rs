use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    MySql,
}

impl DbType {
    /// Parses the `DATASOURCE_TYPE` value.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "mysql" => Ok(DbType::MySql),
            "postgres" | "postgresql" => Ok(DbType::Postgres),
            other => Err(ConfigError::UnsupportedDatabase(other.to_string())),
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DbType::MySql => 3306,
            DbType::Postgres => 5432,
        }
    }
}

/// Server coordinates shared by every database of one run. The database
/// name is chosen per connection.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionConfig {
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}
