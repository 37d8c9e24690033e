//! Similarity index over Table Model documents.
//!
//! The index is a derived cache over the [`ModelCatalog`]: it is built from a
//! catalog snapshot in one batch, saved and loaded as a unit, and rebuilt from
//! scratch when it goes stale. Scores are distances: **lower is more
//! similar**, ties keep catalog order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::catalog::ModelCatalog;
use crate::errors::IndexError;
use crate::models::table_model::TableModel;

pub mod flat;

/// Projection of a model kept next to each vector for display and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub table_name: String,
    pub database: String,
    pub column_count: usize,
    pub table_description: String,
}

/// The embeddable form of a Table Model: the full serialized document plus
/// its metadata projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddableDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl EmbeddableDocument {
    pub fn from_model(model: &TableModel) -> Result<Self, serde_json::Error> {
        Ok(Self {
            text: serde_json::to_string_pretty(model)?,
            metadata: DocumentMetadata {
                table_name: model.name.clone(),
                database: model.database.clone(),
                column_count: model.columns.len(),
                table_description: model.properties.description.clone(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub document: EmbeddableDocument,
    pub score: f32,
}

/// A built, queryable index. Read-only once built.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// At most `k` documents ranked by ascending distance to `text`.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Match>, IndexError>;
    fn save(&self, path: &Path) -> Result<(), IndexError>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Constructs and restores indexes of one kind.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    async fn build(
        &self,
        documents: Vec<EmbeddableDocument>,
    ) -> Result<Box<dyn SimilarityIndex>, IndexError>;
    fn load(&self, path: &Path) -> Result<Box<dyn SimilarityIndex>, IndexError>;
}

/// Documents for every model in the catalog, in catalog order.
pub fn documents_from_catalog(catalog: &ModelCatalog) -> Result<Vec<EmbeddableDocument>, IndexError> {
    let models = catalog.list()?;
    let mut documents = Vec::with_capacity(models.len());
    for model in &models {
        match EmbeddableDocument::from_model(model) {
            Ok(doc) => documents.push(doc),
            Err(e) => warn!("Skipping {} from index: {}", model.key(), e),
        }
    }
    Ok(documents)
}

/// Builds from the catalog and durably saves before returning.
pub async fn build_and_save(
    backend: &dyn IndexBackend,
    catalog: &ModelCatalog,
    path: &Path,
) -> Result<Box<dyn SimilarityIndex>, IndexError> {
    let documents = documents_from_catalog(catalog)?;
    let count = documents.len();
    let index = backend.build(documents).await?;
    index.save(path)?;
    info!("Vector index built over {} models and saved to {}", count, path.display());
    Ok(index)
}

/// Query front-end shared by concurrent synthesis tasks. A failed query
/// triggers one rebuild from the catalog and one retry.
pub struct Retriever {
    backend: Arc<dyn IndexBackend>,
    catalog: ModelCatalog,
    path: PathBuf,
    current: RwLock<Current>,
}

/// The live index and how many times it has been rebuilt.
struct Current {
    generation: u64,
    index: Box<dyn SimilarityIndex>,
}

impl Retriever {
    pub fn new(
        backend: Arc<dyn IndexBackend>,
        catalog: ModelCatalog,
        path: PathBuf,
        index: Box<dyn SimilarityIndex>,
    ) -> Self {
        Self {
            backend,
            catalog,
            path,
            current: RwLock::new(Current {
                generation: 0,
                index,
            }),
        }
    }

    /// Loads the saved index; falls back to a rebuild when it cannot be read.
    pub async fn open(
        backend: Arc<dyn IndexBackend>,
        catalog: ModelCatalog,
        path: PathBuf,
    ) -> Result<Self, IndexError> {
        let index = match backend.load(&path) {
            Ok(index) => index,
            Err(e) => {
                warn!("Could not load index at {} ({}), rebuilding", path.display(), e);
                build_and_save(backend.as_ref(), &catalog, &path).await?
            }
        };
        Ok(Self::new(backend, catalog, path, index))
    }

    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Match>, IndexError> {
        let (seen, first) = {
            let current = self.current.read().await;
            (current.generation, current.index.query(text, k).await)
        };
        let e = match first {
            Ok(matches) => return Ok(matches),
            Err(e) => e,
        };

        // Concurrent failures on the same index rebuild it once; later
        // callers find a newer generation and only retry.
        let mut current = self.current.write().await;
        if current.generation == seen {
            warn!("Index query failed ({}), rebuilding from catalog", e);
            current.index =
                build_and_save(self.backend.as_ref(), &self.catalog, &self.path).await?;
            current.generation += 1;
        }
        let current = current.downgrade();
        current.index.query(text, k).await
    }
}
