//! Durable store of one [`TableModel`] per (database, table).
//!
//! Each model is its own pretty-printed JSON file `{database}/{table}.json`
//! with both components escaped (see [`model_path`]), so every pair owns a
//! distinct file. Listing is ordered by path so every consumer sees the same
//! order within and across runs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::warn;

use crate::errors::CatalogError;
use crate::models::table_model::{model_path, TableModel};

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    root: PathBuf,
}

impl ModelCatalog {
    /// Opens the catalog directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CatalogError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, database: &str, table: &str) -> PathBuf {
        self.root.join(model_path(database, table))
    }

    /// Writes or overwrites the entry for (database, table).
    pub fn put(&self, model: &TableModel) -> Result<PathBuf, CatalogError> {
        let path = self.path_for(&model.database, &model.name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(model).map_err(|source| {
            CatalogError::Serialization {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, json).map_err(|source| CatalogError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn get(&self, database: &str, table: &str) -> Result<TableModel, CatalogError> {
        let path = self.path_for(database, table);
        let model = match read_model(&path) {
            Err(CatalogError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                return Err(CatalogError::NotFound {
                    database: database.to_string(),
                    table: table.to_string(),
                })
            }
            other => other?,
        };
        if model.database != database || model.name != table {
            return Err(CatalogError::Mismatch {
                path,
                expected: format!("{}:{}", database, table),
                found: model.key(),
            });
        }
        Ok(model)
    }

    /// Every readable model, ordered by database then table file. Unreadable
    /// documents are logged and skipped.
    pub fn list(&self) -> Result<Vec<TableModel>, CatalogError> {
        let mut databases = sorted_entries(&self.root, |p| p.is_dir())?;
        databases.retain(|p| !is_hidden(p));

        let mut models = Vec::new();
        for dir in databases {
            let files = match sorted_entries(&dir, |p| {
                p.is_file() && p.extension().is_some_and(|ext| ext == "json")
            }) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Skipping catalog directory: {}", e);
                    continue;
                }
            };
            models.extend(files.iter().filter_map(|path| match read_model(path) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!("Skipping catalog entry: {}", e);
                    None
                }
            }));
        }
        Ok(models)
    }
}

fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, CatalogError> {
    let entries = fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| keep(p))
        .collect();
    paths.sort();
    Ok(paths)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn read_model(path: &Path) -> Result<TableModel, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CatalogError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}
