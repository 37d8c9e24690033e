use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use schemalens::config::LensConfig;
use schemalens::db::{SchemaAdapter, SchemaSource};
use schemalens::errors::{AdapterError, GenerationError, IndexError};
use schemalens::index::flat::FlatBackend;
use schemalens::index::{EmbeddableDocument, IndexBackend, SimilarityIndex};
use schemalens::llm::hash::HashEmbedder;
use schemalens::llm::{CompletionRequest, TextGenerator};
use schemalens::models::schema::{ColumnSchema, ForeignKeySchema, TableRef};
use schemalens::pipeline::{Pipeline, RunOptions, Stage};
use schemalens::store::{RelationshipSet, RelationshipStore};
use tempfile::tempdir;

mock! {
    pub Generator {}

    #[async_trait]
    impl TextGenerator for Generator {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;
    }
}

struct ShopAdapter {
    broken_tables: Vec<String>,
}

fn column(name: &str, data_type: &str, is_primary_key: bool) -> ColumnSchema {
    ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable: !is_primary_key,
        is_primary_key,
    }
}

fn foreign_key(table: &str, column: &str, referenced_table: &str, referenced_column: &str) -> ForeignKeySchema {
    ForeignKeySchema {
        table: table.to_string(),
        column: column.to_string(),
        referenced_table: referenced_table.to_string(),
        referenced_column: referenced_column.to_string(),
    }
}

#[async_trait]
impl SchemaAdapter for ShopAdapter {
    async fn list_tables(&self) -> Result<Vec<String>, AdapterError> {
        Ok(vec![
            "customer".to_string(),
            "customer_order".to_string(),
            "product".to_string(),
        ])
    }

    async fn list_columns(&self, table_name: &str) -> Result<Vec<ColumnSchema>, AdapterError> {
        if self.broken_tables.iter().any(|t| t == table_name) {
            return Err(AdapterError::MetadataRejected(format!("{} is restricted", table_name)));
        }
        match table_name {
            "customer" => Ok(vec![
                column("customer_id", "int", true),
                column("email", "varchar(255)", false),
            ]),
            "customer_order" => Ok(vec![
                column("order_id", "int", true),
                column("customer_id", "int", false),
                column("total", "decimal(10,2)", false),
            ]),
            "product" => Ok(vec![
                column("sku", "varchar(32)", true),
                column("price", "decimal(10,2)", false),
                column("supplier_id", "int", false),
            ]),
            "sales/2024" => Ok(vec![
                column("sale_id", "int", true),
                column("amount", "decimal(10,2)", false),
            ]),
            other => Err(AdapterError::TableNotFound(other.to_string())),
        }
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeySchema>, AdapterError> {
        Ok(vec![
            foreign_key("customer_order", "customer_id", "customer", "customer_id"),
            // supplier is never in scope.
            foreign_key("product", "supplier_id", "supplier", "supplier_id"),
        ])
    }
}

struct ShopSource {
    adapter: Arc<ShopAdapter>,
}

impl ShopSource {
    fn new(broken_tables: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            adapter: Arc::new(ShopAdapter {
                broken_tables: broken_tables.iter().map(|t| t.to_string()).collect(),
            }),
        })
    }
}

#[async_trait]
impl SchemaSource for ShopSource {
    async fn connect(&self, database: &str) -> Result<Arc<dyn SchemaAdapter>, AdapterError> {
        if database == "shop" {
            Ok(self.adapter.clone())
        } else {
            Err(AdapterError::Connection(format!("unknown database {}", database)))
        }
    }
}

fn config(cache_dir: &Path, default_database: Option<&str>) -> LensConfig {
    let mut vars: HashMap<&str, String> = HashMap::new();
    vars.insert("DB_USER", "lens".to_string());
    vars.insert("LENS_EMBEDDER", "hash".to_string());
    vars.insert("LENS_CACHE_DIR", cache_dir.display().to_string());
    if let Some(db) = default_database {
        vars.insert("DB_NAME", db.to_string());
    }
    LensConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

fn pipeline(config: LensConfig, source: Arc<ShopSource>, generator: Option<MockGenerator>) -> Pipeline {
    let generator = generator.map(|g| Arc::new(g) as Arc<dyn TextGenerator>);
    Pipeline::new(
        config,
        source,
        generator,
        Arc::new(FlatBackend::new(Arc::new(HashEmbedder::default()))),
    )
}

fn shop_tables() -> Vec<TableRef> {
    ["customer", "customer_order", "product"]
        .iter()
        .map(|t| TableRef::new("shop", *t))
        .collect()
}

/// Builds normally but cannot read a saved index back.
struct WriteOnlyBackend {
    inner: FlatBackend,
}

#[async_trait]
impl IndexBackend for WriteOnlyBackend {
    async fn build(
        &self,
        documents: Vec<EmbeddableDocument>,
    ) -> Result<Box<dyn SimilarityIndex>, IndexError> {
        self.inner.build(documents).await
    }

    fn load(&self, _path: &Path) -> Result<Box<dyn SimilarityIndex>, IndexError> {
        Err(IndexError::Corrupt("truncated artifact".to_string()))
    }
}

fn working_generator() -> MockGenerator {
    let mut generator = MockGenerator::new();
    generator
        .expect_complete()
        .withf(|req| req.max_tokens == 500)
        .returning(|_| Ok(SEMANTIC_RESPONSE.to_string()));
    generator
        .expect_complete()
        .withf(|req| req.max_tokens != 500)
        .returning(|_| Ok("Records shop data used by the sales team.".to_string()));
    generator
}

const SEMANTIC_RESPONSE: &str = "```json\n[\
    {\"name\": \"CustomerOrders\", \"models\": [\"customer\", \"customer_order\"], \
     \"joinType\": \"ONE_TO_MANY\", \"condition\": \"customer.customer_id = customer_order.customer_id\"}\
]\n```";

#[tokio::test]
async fn test_full_run_with_failing_service() {
    let dir = tempdir().unwrap();
    let mut generator = MockGenerator::new();
    generator
        .expect_complete()
        .returning(|_| Err(GenerationError::Network("connection reset".into())));

    let report = pipeline(config(dir.path(), None), ShopSource::new(&[]), Some(generator))
        .run(&RunOptions {
            business_context: Some("An online shop selling hardware".to_string()),
            tables: shop_tables(),
            test_queries: vec!["Find tables related to customers".to_string()],
        })
        .await
        .unwrap();

    assert_eq!(report.models_written, 3);
    assert_eq!(report.explicit_relationships, 1);
    assert_eq!(report.semantic_relationships, 0);
    assert_eq!(report.skipped.len(), 3);
    assert!(report.skipped.iter().all(|s| s.stage == Stage::Synthesis));

    assert_eq!(report.test_queries.len(), 1);
    assert_eq!(report.test_queries[0].matches.len(), 2);

    let store = RelationshipStore::open(dir.path().join("relationships")).unwrap();
    let explicit = store.load(RelationshipSet::Explicit).unwrap();
    assert_eq!(explicit.len(), 1);
    assert_eq!(explicit[0].name, "customer_order_customer_Relation");
    assert_eq!(explicit[0].condition, "customer.customer_id = customer_order.customer_id");
    assert!(store.load(RelationshipSet::Semantic).unwrap().is_empty());

    // Descriptions fell back to templates.
    let model: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("models/shop/customer.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(model["properties"]["description"], "Table containing customer data");
    assert_eq!(model["primaryKey"], "customer_id");
}

#[tokio::test]
async fn test_full_run_with_working_service() {
    let dir = tempdir().unwrap();
    let report = pipeline(config(dir.path(), None), ShopSource::new(&[]), Some(working_generator()))
        .run(&RunOptions {
            business_context: Some("An online shop".to_string()),
            tables: shop_tables(),
            test_queries: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(report.models_written, 3);
    assert_eq!(report.explicit_relationships, 1);
    assert_eq!(report.semantic_relationships, 3);
    assert!(report.skipped.is_empty());

    let store = RelationshipStore::open(dir.path().join("relationships")).unwrap();
    assert_eq!(store.load(RelationshipSet::Semantic).unwrap().len(), 3);
    assert!(dir
        .path()
        .join("relationships/semantic/semantic_relationship_3.json")
        .exists());
    assert!(dir.path().join("vector_index").exists());
}

#[tokio::test]
async fn test_unreadable_table_is_skipped() {
    let dir = tempdir().unwrap();
    let report = pipeline(config(dir.path(), None), ShopSource::new(&["product"]), None)
        .run(&RunOptions {
            business_context: None,
            tables: shop_tables(),
            test_queries: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(report.models_written, 2);
    assert_eq!(report.explicit_relationships, 1);
    let ingestion: Vec<_> = report
        .skipped
        .iter()
        .filter(|s| s.stage == Stage::Ingestion)
        .collect();
    assert_eq!(ingestion.len(), 1);
    assert_eq!(ingestion[0].subject, "shop:product");
}

#[tokio::test]
async fn test_table_names_with_separators_get_their_own_models() {
    let dir = tempdir().unwrap();
    let tables = ["customer", "sales/2024", "product"]
        .iter()
        .map(|t| TableRef::new("shop", *t))
        .collect();
    let report = pipeline(config(dir.path(), None), ShopSource::new(&[]), None)
        .run(&RunOptions {
            business_context: None,
            tables,
            test_queries: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(report.models_written, 3);
    assert!(report.skipped.iter().all(|s| s.stage == Stage::Synthesis));
    assert!(dir.path().join("models/shop/sales%2F2024.json").is_file());
    assert!(!dir.path().join("models/shop/sales").exists());
}

#[tokio::test]
async fn test_unwritable_model_is_skipped() {
    let dir = tempdir().unwrap();
    // A directory squatting on the model file makes the write fail.
    std::fs::create_dir_all(dir.path().join("models/shop/product.json")).unwrap();

    let report = pipeline(config(dir.path(), None), ShopSource::new(&[]), None)
        .run(&RunOptions {
            business_context: None,
            tables: shop_tables(),
            test_queries: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(report.models_written, 2);
    assert_eq!(report.explicit_relationships, 1);
    let ingestion: Vec<_> = report
        .skipped
        .iter()
        .filter(|s| s.stage == Stage::Ingestion)
        .collect();
    assert_eq!(ingestion.len(), 1);
    assert_eq!(ingestion[0].subject, "shop:product");
    // Synthesis still covers the two stored models.
    assert_eq!(report.skipped.len(), 3);
}

#[tokio::test]
async fn test_unreadable_index_skips_test_queries_only() {
    let dir = tempdir().unwrap();
    let generator: Arc<dyn TextGenerator> = Arc::new(working_generator());
    let backend = Arc::new(WriteOnlyBackend {
        inner: FlatBackend::new(Arc::new(HashEmbedder::default())),
    });

    let report = Pipeline::new(
        config(dir.path(), None),
        ShopSource::new(&[]),
        Some(generator),
        backend,
    )
    .run(&RunOptions {
        business_context: None,
        tables: shop_tables(),
        test_queries: vec!["Find tables related to customers".to_string()],
    })
    .await
    .unwrap();

    assert!(report.test_queries.is_empty());
    assert_eq!(report.models_written, 3);
    assert_eq!(report.semantic_relationships, 3);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_whole_database_mode() {
    let dir = tempdir().unwrap();
    let report = pipeline(config(dir.path(), Some("shop")), ShopSource::new(&[]), None)
        .run(&RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.models_written, 3);
    assert_eq!(report.explicit_relationships, 1);
    assert_eq!(report.semantic_relationships, 0);
}

#[tokio::test]
async fn test_unreachable_database_aborts() {
    let dir = tempdir().unwrap();
    let result = pipeline(config(dir.path(), None), ShopSource::new(&[]), None)
        .run(&RunOptions {
            business_context: None,
            tables: vec![TableRef::new("warehouse", "stock")],
            test_queries: Vec::new(),
        })
        .await;

    assert!(result.is_err());
}
