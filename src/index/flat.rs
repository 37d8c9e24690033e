//! Exact nearest-neighbour index: every query is scored against every
//! stored vector. Catalogs are small (one entry per table), so a linear scan
//! is cheap and gives deterministic, exactly reproducible rankings.
//!
//! The artifact is a directory holding one CBOR file; vectors are stored as
//! f32 so a loaded index answers bit-for-bit like the one that was saved.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::errors::IndexError;
use crate::llm::Embedder;

use super::{EmbeddableDocument, IndexBackend, Match, SimilarityIndex};

pub const INDEX_FILE_NAME: &str = "index.cbor";
pub const INDEX_FILE_VERSION_V1: &str = "schemalens_flat_index_v1";

const EMBED_BATCH_SIZE: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    document: EmbeddableDocument,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexFileV1 {
    version: String,
    model: String,
    dim: usize,
    entries: Vec<IndexEntry>,
}

pub struct FlatBackend {
    embedder: Arc<dyn Embedder>,
}

impl FlatBackend {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

pub struct FlatIndex {
    embedder: Arc<dyn Embedder>,
    file: IndexFileV1,
}

fn normalize_in_place(v: &mut [f32]) {
    let norm2: f32 = v.iter().map(|x| x * x).sum();
    if norm2 <= 0.0 {
        return;
    }
    let inv = 1.0f32 / norm2.sqrt();
    v.iter_mut().for_each(|x| *x *= inv);
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[async_trait]
impl IndexBackend for FlatBackend {
    async fn build(
        &self,
        documents: Vec<EmbeddableDocument>,
    ) -> Result<Box<dyn SimilarityIndex>, IndexError> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(documents.len());
        for batch in documents.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let embedded = self.embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(IndexError::BatchMismatch {
                    expected: texts.len(),
                    actual: embedded.len(),
                });
            }
            vectors.extend(embedded);
        }

        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        let mut entries = Vec::with_capacity(documents.len());
        for (document, mut vector) in documents.into_iter().zip(vectors) {
            if vector.len() != dim {
                return Err(IndexError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                });
            }
            normalize_in_place(&mut vector);
            entries.push(IndexEntry { document, vector });
        }

        Ok(Box::new(FlatIndex {
            embedder: self.embedder.clone(),
            file: IndexFileV1 {
                version: INDEX_FILE_VERSION_V1.to_string(),
                model: self.embedder.model_name(),
                dim,
                entries,
            },
        }))
    }

    fn load(&self, path: &Path) -> Result<Box<dyn SimilarityIndex>, IndexError> {
        let file_path = path.join(INDEX_FILE_NAME);
        let bytes = fs::read(&file_path).map_err(|source| IndexError::Io {
            path: file_path.clone(),
            source,
        })?;
        let file: IndexFileV1 = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| IndexError::Corrupt(format!("{}: {}", file_path.display(), e)))?;
        if file.version != INDEX_FILE_VERSION_V1 {
            return Err(IndexError::Version(file.version));
        }
        if file.entries.iter().any(|e| e.vector.len() != file.dim) {
            return Err(IndexError::Corrupt(format!(
                "{}: vector length differs from declared dim {}",
                file_path.display(),
                file.dim
            )));
        }

        Ok(Box::new(FlatIndex {
            embedder: self.embedder.clone(),
            file,
        }))
    }
}

#[async_trait]
impl SimilarityIndex for FlatIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Match>, IndexError> {
        if k == 0 || self.file.entries.is_empty() {
            return Ok(Vec::new());
        }

        let embedder_model = self.embedder.model_name();
        if embedder_model != self.file.model {
            return Err(IndexError::ModelMismatch {
                index: self.file.model.clone(),
                embedder: embedder_model,
            });
        }

        let mut query = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(IndexError::BatchMismatch {
                expected: 1,
                actual: 0,
            })?;
        if query.len() != self.file.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.file.dim,
                actual: query.len(),
            });
        }
        normalize_in_place(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .file
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, squared_l2(&query, &entry.vector)))
            .collect();
        // Stable: equal distances keep catalog order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| Match {
                document: self.file.entries[i].document.clone(),
                score,
            })
            .collect())
    }

    fn save(&self, path: &Path) -> Result<(), IndexError> {
        let io_err = |source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(path).map_err(io_err)?;

        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&self.file, &mut bytes)
            .map_err(|e| IndexError::Corrupt(format!("failed to encode index: {e}")))?;

        let mut tmp = NamedTempFile::new_in(path).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.persist(path.join(INDEX_FILE_NAME))
            .map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.file.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_model;
    use crate::catalog::ModelCatalog;
    use crate::errors::GenerationError;
    use crate::index::{build_and_save, documents_from_catalog};
    use crate::llm::hash::HashEmbedder;
    use tempfile::tempdir;

    fn names(matches: &[Match]) -> Vec<&str> {
        matches
            .iter()
            .map(|m| m.document.metadata.table_name.as_str())
            .collect()
    }

    fn seeded_catalog(root: &Path) -> ModelCatalog {
        let catalog = ModelCatalog::open(root.join("models")).unwrap();
        catalog
            .put(&sample_model("shop", "customer", &["customer_id", "email", "name"]))
            .unwrap();
        catalog
            .put(&sample_model("shop", "customer_order", &["order_id", "customer_id", "total"]))
            .unwrap();
        catalog
            .put(&sample_model("shop", "product", &["sku", "price", "stock"]))
            .unwrap();
        catalog
    }

    fn backend() -> FlatBackend {
        FlatBackend::new(Arc::new(HashEmbedder::default()))
    }

    #[tokio::test]
    async fn test_query_ranks_and_bounds_results() {
        let dir = tempdir().unwrap();
        let catalog = seeded_catalog(dir.path());
        let index = backend()
            .build(documents_from_catalog(&catalog).unwrap())
            .await
            .unwrap();

        assert_eq!(index.len(), 3);
        let matches = index.query("Find tables related to product price", 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].document.metadata.table_name, "product");
        assert!(matches[0].score <= matches[1].score);

        assert_eq!(index.query("anything", 10).await.unwrap().len(), 3);
        assert!(index.query("anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_load_answers_identically() {
        let dir = tempdir().unwrap();
        let catalog = seeded_catalog(dir.path());
        let path = dir.path().join("vector_index");

        let built = build_and_save(&backend(), &catalog, &path).await.unwrap();
        let loaded = backend().load(&path).unwrap();

        for (q, k) in [("customer", 3), ("order total", 2), ("stock", 1), ("zzz", 3)] {
            assert_eq!(built.query(q, k).await.unwrap(), loaded.query(q, k).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_rebuild_from_unchanged_catalog_is_stable() {
        let dir = tempdir().unwrap();
        let catalog = seeded_catalog(dir.path());

        let first = backend().build(documents_from_catalog(&catalog).unwrap()).await.unwrap();
        let second = backend().build(documents_from_catalog(&catalog).unwrap()).await.unwrap();

        let a = first.query("Find tables related to customer", 3).await.unwrap();
        let b = second.query("Find tables related to customer", 3).await.unwrap();
        assert_eq!(names(&a), names(&b));
    }

    /// Maps every text to the same vector, so every distance ties.
    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GenerationError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn model_name(&self) -> String {
            "constant".to_string()
        }
    }

    #[tokio::test]
    async fn test_ties_keep_catalog_order() {
        let dir = tempdir().unwrap();
        let catalog = ModelCatalog::open(dir.path()).unwrap();
        catalog.put(&sample_model("shop", "product", &["sku"])).unwrap();
        catalog.put(&sample_model("crm", "lead", &["id"])).unwrap();
        catalog.put(&sample_model("shop", "customer", &["id"])).unwrap();

        let index = FlatBackend::new(Arc::new(ConstantEmbedder))
            .build(documents_from_catalog(&catalog).unwrap())
            .await
            .unwrap();
        let matches = index.query("anything", 3).await.unwrap();

        assert!(matches.iter().all(|m| m.score == matches[0].score));
        assert_eq!(names(&matches), vec!["lead", "customer", "product"]);
    }

    #[tokio::test]
    async fn test_empty_catalog_yields_no_matches() {
        let index = backend().build(Vec::new()).await.unwrap();
        assert!(index.is_empty());
        assert!(index.query("customer", 3).await.unwrap().is_empty());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE_NAME), b"not cbor at all").unwrap();
        assert!(backend().load(dir.path()).is_err());
        assert!(matches!(
            backend().load(&dir.path().join("missing")),
            Err(IndexError::Io { .. })
        ));
    }
}
