use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
    PgPool, Row,
};

use crate::{
    errors::AdapterError,
    models::{
        connections::ConnectionConfig,
        schema::{ColumnSchema, ForeignKeySchema},
    },
};

use super::{classify, with_fallback, SchemaAdapter};

pub struct PostgresAdapter {
    pub pool: PgPool,
    database: String,
}

impl PostgresAdapter {
    pub async fn connect(config: &ConnectionConfig, database: &str) -> Result<Self, AdapterError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(database);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            database: database.to_string(),
        })
    }

    /// Wraps an existing pool; `database` is only used in log messages.
    pub fn from_pool(pool: PgPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    async fn columns_from_catalog(&self, table_name: &str) -> Result<Vec<ColumnSchema>, AdapterError> {
        let query = r#"
            SELECT
                a.attname::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                NOT a.attnotnull AS is_nullable,
                EXISTS (
                    SELECT 1 FROM pg_catalog.pg_index i
                    WHERE i.indrelid = c.oid
                    AND i.indisprimary
                    AND a.attnum = ANY(i.indkey)
                ) AS is_primary_key
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = current_schema()
            AND c.relname = $1
            AND a.attnum > 0
            AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;
        let rows = sqlx::query(query)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        if rows.is_empty() {
            return Err(AdapterError::MetadataRejected(format!(
                "no pg_catalog entry for {}",
                table_name
            )));
        }

        rows.iter().map(column_from_row).collect()
    }

    async fn columns_from_information_schema(
        &self,
        table_name: &str,
    ) -> Result<Vec<ColumnSchema>, AdapterError> {
        let query = r#"
            SELECT
                c.column_name::text AS column_name,
                c.data_type::text AS data_type,
                c.is_nullable = 'YES' AS is_nullable,
                EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage k
                        ON k.constraint_name = tc.constraint_name
                        AND k.table_schema = tc.table_schema
                        AND k.table_name = tc.table_name
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                    AND tc.table_schema = c.table_schema
                    AND tc.table_name = c.table_name
                    AND k.column_name = c.column_name
                ) AS is_primary_key
            FROM information_schema.columns c
            WHERE c.table_schema = current_schema()
            AND c.table_name = $1
            ORDER BY c.ordinal_position
        "#;
        let rows = sqlx::query(query)
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

        rows.iter().map(column_from_row).collect()
    }

    async fn foreign_keys_from_catalog(&self) -> Result<Vec<ForeignKeySchema>, AdapterError> {
        let query = r#"
            SELECT
                cl.relname::text AS table_name,
                a.attname::text AS column_name,
                rcl.relname::text AS referenced_table_name,
                ra.attname::text AS referenced_column_name
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class cl ON cl.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = cl.relnamespace
            JOIN pg_catalog.pg_class rcl ON rcl.oid = con.confrelid
            JOIN pg_catalog.pg_attribute a
                ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
            JOIN pg_catalog.pg_attribute ra
                ON ra.attrelid = con.confrelid AND ra.attnum = con.confkey[1]
            WHERE con.contype = 'f'
            AND n.nspname = current_schema()
            ORDER BY cl.relname, con.conname
        "#;
        self.fetch_foreign_keys(query).await.map_err(classify)
    }

    async fn foreign_keys_from_information_schema(
        &self,
    ) -> Result<Vec<ForeignKeySchema>, AdapterError> {
        let query = r#"
            SELECT
                tc.table_name::text AS table_name,
                k.column_name::text AS column_name,
                ccu.table_name::text AS referenced_table_name,
                ccu.column_name::text AS referenced_column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage k
                ON k.constraint_name = tc.constraint_name
                AND k.table_schema = tc.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.constraint_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
            AND tc.table_schema = current_schema()
            AND k.ordinal_position = 1
        "#;
        self.fetch_foreign_keys(query).await.map_err(AdapterError::Sqlx)
    }

    async fn fetch_foreign_keys(&self, query: &str) -> Result<Vec<ForeignKeySchema>, sqlx::Error> {
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

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

fn column_from_row(row: &PgRow) -> Result<ColumnSchema, AdapterError> {
    Ok(ColumnSchema {
        name: row.try_get("column_name")?,
        data_type: row.try_get("data_type")?,
        is_nullable: row.try_get("is_nullable")?,
        is_primary_key: row.try_get("is_primary_key")?,
    })
}

#[async_trait]
impl SchemaAdapter for PostgresAdapter {
    async fn list_tables(&self) -> Result<Vec<String>, AdapterError> {
        let query = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = current_schema()
            ORDER BY table_name
        "#;
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(AdapterError::Sqlx)?;

        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>("table_name"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tables)
    }

    async fn list_columns(&self, table_name: &str) -> Result<Vec<ColumnSchema>, AdapterError> {
        let what = format!("pg_catalog lookup for {}", table_name);
        with_fallback(&what, self.columns_from_catalog(table_name), || {
            self.columns_from_information_schema(table_name)
        })
        .await
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeySchema>, AdapterError> {
        let what = format!("pg_constraint lookup in {}", self.database);
        with_fallback(&what, self.foreign_keys_from_catalog(), || {
            self.foreign_keys_from_information_schema()
        })
        .await
    }
}
