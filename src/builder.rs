//! Turns one table's schema facts into a [`TableModel`], generating short
//! business-purpose descriptions for the table and each column.
//!
//! Description generation never fails model construction: without a
//! business context, or on any service error, the templated description is
//! used instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::warn;

use crate::db::primary_key_of;
use crate::llm::{CompletionRequest, TextGenerator};
use crate::models::schema::ColumnSchema;
use crate::models::table_model::{ColumnDescriptor, ColumnProperties, TableModel, TableProperties};

pub const MAX_DESCRIPTION_WORDS: usize = 15;

const TABLE_SYSTEM_PROMPT: &str =
    "You are a technical documentation expert who writes clear, concise database table descriptions.";
const COLUMN_SYSTEM_PROMPT: &str =
    "You are a technical documentation expert who writes clear, concise database column descriptions.";

pub fn table_template(table: &str) -> String {
    format!("Table containing {} data", table)
}

pub fn column_template(table: &str, column: &str) -> String {
    format!("Column {} in table {}", column, table)
}

pub struct ModelBuilder {
    generator: Option<Arc<dyn TextGenerator>>,
    business_context: Option<String>,
    timeout: Duration,
}

impl ModelBuilder {
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        business_context: Option<String>,
        timeout: Duration,
    ) -> Self {
        let business_context = business_context.filter(|c| !c.trim().is_empty());
        Self {
            generator,
            business_context,
            timeout,
        }
    }

    /// Builds the model document. Persisting it is the catalog's job.
    pub async fn build(&self, database: &str, table: &str, columns: &[ColumnSchema]) -> TableModel {
        let description = self.describe_table(table).await;

        let mut descriptors = Vec::with_capacity(columns.len());
        for column in columns {
            descriptors.push(ColumnDescriptor {
                name: column.name.clone(),
                data_type: column.data_type.to_uppercase(),
                not_null: !column.is_nullable,
                properties: ColumnProperties {
                    description: self.describe_column(table, column).await,
                    display_name: column.name.clone(),
                },
            });
        }

        TableModel {
            name: table.to_string(),
            database: database.to_string(),
            columns: descriptors,
            primary_key: primary_key_of(table, columns),
            refresh_time: Utc::now(),
            properties: TableProperties {
                description,
                display_name: table.to_string(),
                database: database.to_string(),
            },
        }
    }

    pub async fn describe_table(&self, table: &str) -> String {
        let fallback = table_template(table);
        let Some(context) = &self.business_context else {
            return fallback;
        };

        let prompt = format!(
            "Based on this business context:\n{context}\n\n\
             Generate a brief (max 10-15 words) technical description for this database table:\n\
             Table Name: {table}\n\n\
             Description should explain the business purpose of this table."
        );
        self.generate(TABLE_SYSTEM_PROMPT, prompt, 0.0, fallback, table)
            .await
    }

    pub async fn describe_column(&self, table: &str, column: &ColumnSchema) -> String {
        let fallback = column_template(table, &column.name);
        let Some(context) = &self.business_context else {
            return fallback;
        };

        let prompt = format!(
            "Based on this business context:\n{context}\n\n\
             Generate a brief (max 10-15 words) business description for this database column:\n\
             Table: {table}\n\
             Column: {}\n\
             Data Type: {}\n\
             Description should explain the business purpose of this column.",
            column.name, column.data_type
        );
        let subject = format!("{}.{}", table, column.name);
        self.generate(COLUMN_SYSTEM_PROMPT, prompt, 0.3, fallback, &subject)
            .await
    }

    async fn generate(
        &self,
        system: &str,
        prompt: String,
        temperature: f32,
        fallback: String,
        subject: &str,
    ) -> String {
        let Some(generator) = &self.generator else {
            return fallback;
        };

        let request = CompletionRequest {
            system: system.to_string(),
            prompt,
            temperature,
            max_tokens: 50,
            timeout: self.timeout,
        };

        let outcome = tokio::time::timeout(self.timeout, generator.complete(&request)).await;
        match outcome {
            Ok(Ok(text)) => match clean_description(&text) {
                Some(description) => description,
                None => {
                    warn!("Empty description generated for {}, using template", subject);
                    fallback
                }
            },
            Ok(Err(e)) => {
                warn!("Could not generate description for {}: {}", subject, e);
                fallback
            }
            Err(_) => {
                warn!("Description generation timed out for {}", subject);
                fallback
            }
        }
    }
}

/// First non-empty line, unquoted, capped at [`MAX_DESCRIPTION_WORDS`].
pub fn clean_description(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    let words: Vec<&str> = line.split_whitespace().take(MAX_DESCRIPTION_WORDS).collect();
    if words.is_empty() {
        return None;
    }
    Some(words.join(" "))
}
