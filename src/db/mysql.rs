use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    MySqlPool, Row,
};

use crate::{
    errors::AdapterError,
    models::{
        connections::ConnectionConfig,
        schema::{ColumnSchema, ForeignKeySchema},
    },
};

use super::{classify, with_fallback, SchemaAdapter};

pub struct MySqlAdapter {
    pub pool: MySqlPool,
    database: String,
}

impl MySqlAdapter {
    pub async fn connect(config: &ConnectionConfig, database: &str) -> Result<Self, AdapterError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(database);

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            database: database.to_string(),
        })
    }

    async fn columns_from_show(&self, table_name: &str) -> Result<Vec<ColumnSchema>, AdapterError> {
        let query = format!("SHOW COLUMNS FROM `{}`", table_name.replace('`', "``"));
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows.iter()
            .map(|row| -> Result<ColumnSchema, AdapterError> {
                Ok(ColumnSchema {
                    name: row.try_get("Field")?,
                    data_type: row.try_get("Type")?,
                    is_nullable: row.try_get::<String, _>("Null")? == "YES",
                    is_primary_key: row.try_get::<String, _>("Key")? == "PRI",
                })
            })
            .collect()
    }

    async fn columns_from_information_schema(
        &self,
        table_name: &str,
    ) -> Result<Vec<ColumnSchema>, AdapterError> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR) AS column_name,
                CAST(DATA_TYPE AS CHAR) AS data_type,
                CAST(IS_NULLABLE AS CHAR) AS is_nullable,
                CAST(COALESCE(COLUMN_KEY, '') AS CHAR) AS column_key
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ?
            AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;
        let rows = sqlx::query(query)
            .bind(&self.database)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(AdapterError::Sqlx)?;

        if rows.is_empty() {
            return Err(AdapterError::TableNotFound(format!(
                "{}.{}",
                self.database, table_name
            )));
        }

        rows.iter()
            .map(|row| -> Result<ColumnSchema, AdapterError> {
                Ok(ColumnSchema {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    is_nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                    is_primary_key: row.try_get::<String, _>("column_key")? == "PRI",
                })
            })
            .collect()
    }

    async fn foreign_keys_from_constraints(&self) -> Result<Vec<ForeignKeySchema>, AdapterError> {
        let query = r#"
            SELECT
                CAST(k.TABLE_NAME AS CHAR) AS table_name,
                CAST(k.COLUMN_NAME AS CHAR) AS column_name,
                CAST(k.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table_name,
                CAST(k.REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column_name
            FROM information_schema.REFERENTIAL_CONSTRAINTS r
            JOIN information_schema.KEY_COLUMN_USAGE k
                ON k.CONSTRAINT_SCHEMA = r.CONSTRAINT_SCHEMA
                AND k.CONSTRAINT_NAME = r.CONSTRAINT_NAME
                AND k.TABLE_NAME = r.TABLE_NAME
            WHERE r.CONSTRAINT_SCHEMA = ?
            AND k.ORDINAL_POSITION = 1
            ORDER BY k.TABLE_NAME, r.CONSTRAINT_NAME
        "#;
        self.fetch_foreign_keys(query).await.map_err(classify)
    }

    async fn foreign_keys_from_key_usage(&self) -> Result<Vec<ForeignKeySchema>, AdapterError> {
        let query = r#"
            SELECT
                CAST(TABLE_NAME AS CHAR) AS table_name,
                CAST(COLUMN_NAME AS CHAR) AS column_name,
                CAST(REFERENCED_TABLE_NAME AS CHAR) AS referenced_table_name,
                CAST(REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column_name
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ?
            AND REFERENCED_TABLE_NAME IS NOT NULL
        "#;
        self.fetch_foreign_keys(query).await.map_err(AdapterError::Sqlx)
    }

    async fn fetch_foreign_keys(&self, query: &str) -> Result<Vec<ForeignKeySchema>, sqlx::Error> {
        let rows = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<ForeignKeySchema, sqlx::Error> {
                Ok(ForeignKeySchema {
                    table: row.try_get("table_name")?,
                    column: row.try_get("column_name")?,
                    referenced_table: row.try_get("referenced_table_name")?,
                    referenced_column: row.try_get("referenced_column_name")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SchemaAdapter for MySqlAdapter {
    async fn list_tables(&self) -> Result<Vec<String>, AdapterError> {
        let query = "SHOW TABLES";

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(AdapterError::Sqlx)?;

        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tables)
    }

    async fn list_columns(&self, table_name: &str) -> Result<Vec<ColumnSchema>, AdapterError> {
        let what = format!("SHOW COLUMNS for {}", table_name);
        with_fallback(&what, self.columns_from_show(table_name), || {
            self.columns_from_information_schema(table_name)
        })
        .await
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeySchema>, AdapterError> {
        let what = format!("Constraint lookup in {}", self.database);
        with_fallback(&what, self.foreign_keys_from_constraints(), || {
            self.foreign_keys_from_key_usage()
        })
        .await
    }
}
