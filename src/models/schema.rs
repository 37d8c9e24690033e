use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::LensError;

/// One column as reported by a schema adapter, in declaration order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

/// A declared foreign-key edge. Multi-column keys are reduced to their
/// first column pair.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForeignKeySchema {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Parses the `database:table` command-line form.
    pub fn parse(value: &str) -> Result<Self, LensError> {
        match value.split_once(':') {
            Some((database, table))
                if !database.is_empty() && !table.is_empty() && !table.contains(':') =>
            {
                Ok(Self::new(database, table))
            }
            _ => Err(LensError::TableFormat(value.to_string())),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.database, self.table)
    }
}

/// The configured table set of a run. Keeps first-seen order for
/// processing and answers membership for the foreign-key relevance filter.
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    tables: Vec<TableRef>,
    members: BTreeSet<TableRef>,
}

impl TableScope {
    pub fn new(tables: impl IntoIterator<Item = TableRef>) -> Self {
        let mut scope = Self::default();
        for table in tables {
            if scope.members.insert(table.clone()) {
                scope.tables.push(table);
            }
        }
        scope
    }

    pub fn contains(&self, database: &str, table: &str) -> bool {
        self.members.contains(&TableRef::new(database, table))
    }

    pub fn tables(&self) -> &[TableRef] {
        &self.tables
    }

    /// Distinct databases in first-seen order.
    pub fn databases(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.tables
            .iter()
            .map(|t| t.database.as_str())
            .filter(|db| seen.insert(*db))
            .collect()
    }

    pub fn tables_in<'a>(&'a self, database: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tables
            .iter()
            .filter(move |t| t.database == database)
            .map(|t| t.table.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }
}
