use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical semantic document for one table, keyed by (database, name).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableModel {
    pub name: String,
    pub database: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    pub refresh_time: DateTime<Utc>,
    pub properties: TableProperties,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableProperties {
    pub description: String,
    pub display_name: String,
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub properties: ColumnProperties,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProperties {
    pub description: String,
    pub display_name: String,
}

impl TableModel {
    /// `database:table`, for logs and reports.
    pub fn key(&self) -> String {
        format!("{}:{}", self.database, self.name)
    }
}

/// Catalog-relative location of a model: `{database}/{table}.json`, each
/// component escaped so that distinct pairs never share a file.
pub fn model_path(database: &str, table: &str) -> PathBuf {
    PathBuf::from(escape_component(database)).join(format!("{}.json", escape_component(table)))
}

/// Keeps `[A-Za-z0-9_-]` and non-leading dots; every other byte becomes
/// `%XX`, including `%` itself and path separators.
pub fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, b) in raw.bytes().enumerate() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(b as char),
            b'.' if i > 0 => out.push('.'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
