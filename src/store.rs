//! Persisted relationship result sets.
//!
//! Explicit (foreign-key) and semantic (generated) relationships live in
//! separate subdirectories, one pretty-printed JSON file per record. A set is
//! always replaced as a whole: records are written to a staging directory
//! which is then moved over the previous set, so a failed run leaves the old
//! output untouched.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::errors::StoreError;
use crate::models::relationship::Relationship;
use crate::models::schema::{ForeignKeySchema, TableScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipSet {
    Explicit,
    Semantic,
}

impl RelationshipSet {
    fn dir_name(self) -> &'static str {
        match self {
            RelationshipSet::Explicit => "explicit",
            RelationshipSet::Semantic => "semantic",
        }
    }
}

/// File name of the `n`th (1-based) record of a group.
pub fn record_file_name(prefix: &str, n: usize) -> String {
    format!("{}_relationship_{}.json", prefix, n)
}

/// Explicit relationships for the foreign keys of one database whose two
/// endpoints are both in scope. Edges leaving the scope are dropped.
pub fn extract_explicit(
    database: &str,
    foreign_keys: &[ForeignKeySchema],
    scope: &TableScope,
) -> Vec<Relationship> {
    foreign_keys
        .iter()
        .filter(|fk| {
            scope.contains(database, &fk.table) && scope.contains(database, &fk.referenced_table)
        })
        .map(Relationship::from_foreign_key)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RelationshipStore {
    root: PathBuf,
}

impl RelationshipStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn set_dir(&self, set: RelationshipSet) -> PathBuf {
        self.root.join(set.dir_name())
    }

    /// Replaces the explicit set. Records are numbered per database.
    pub fn write_explicit(&self, per_database: &[(String, Vec<Relationship>)]) -> Result<usize, StoreError> {
        self.replace(RelationshipSet::Explicit, per_database)
    }

    /// Replaces the semantic set.
    pub fn write_semantic(&self, records: &[Relationship]) -> Result<usize, StoreError> {
        self.replace(
            RelationshipSet::Semantic,
            &[("semantic".to_string(), records.to_vec())],
        )
    }

    fn replace(&self, set: RelationshipSet, groups: &[(String, Vec<Relationship>)]) -> Result<usize, StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        let staging = tempfile::Builder::new()
            .prefix(".staging")
            .tempdir_in(&self.root)
            .map_err(io_err(&self.root))?;

        let mut written = 0;
        for (prefix, records) in groups {
            for (i, record) in records.iter().enumerate() {
                let path = staging.path().join(record_file_name(prefix, i + 1));
                let json = serde_json::to_string_pretty(record)?;
                fs::write(&path, json).map_err(io_err(&path))?;
                written += 1;
            }
        }

        let target = self.set_dir(set);
        // Holds the previous set until the new one is in place; removed on drop.
        let retired = tempfile::Builder::new()
            .prefix(".retired")
            .tempdir_in(&self.root)
            .map_err(io_err(&self.root))?;
        if target.exists() {
            fs::rename(&target, retired.path().join(set.dir_name())).map_err(io_err(&target))?;
        }
        // After the move, dropping `staging` finds nothing left to clean up.
        fs::rename(staging.path(), &target).map_err(io_err(&target))?;

        info!("Wrote {} {} relationships to {}", written, set.dir_name(), target.display());
        Ok(written)
    }

    /// Reads a set back in record order. Unreadable records are skipped.
    pub fn load(&self, set: RelationshipSet) -> Result<Vec<Relationship>, StoreError> {
        let dir = self.set_dir(set);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort_by_key(|p| record_order(p));

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let decoded = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Relationship>(&raw).map_err(|e| e.to_string()));
            match decoded {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping relationship record {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }
}

/// Sort key `(prefix, n)` so record 10 follows record 9.
fn record_order(path: &Path) -> (String, usize) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match stem.rsplit_once('_') {
        Some((prefix, n)) => match n.parse() {
            Ok(n) => (prefix.to_string(), n),
            Err(_) => (stem.to_string(), 0),
        },
        None => (stem.to_string(), 0),
    }
}
