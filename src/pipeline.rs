//! One full run: ingest schemas into the catalog, build and save the index,
//! answer ad hoc test queries, then synthesize semantic relationships.
//!
//! Only failures that leave nothing meaningful to do abort the run: an
//! unreachable schema source, an unwritable output directory, an index that
//! cannot be built. Everything else is logged and counted as a skipped unit.

use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};

use crate::builder::ModelBuilder;
use crate::catalog::ModelCatalog;
use crate::config::LensConfig;
use crate::db::{SchemaSource, SqlSchemaSource};
use crate::errors::{ConfigError, LensError};
use crate::index::flat::FlatBackend;
use crate::index::{build_and_save, IndexBackend, Match, Retriever};
use crate::llm::{embedder_from_config, generator_from_config, TextGenerator};
use crate::models::relationship::Relationship;
use crate::models::schema::{TableRef, TableScope};
use crate::store::{extract_explicit, RelationshipStore};
use crate::synth::{RelationshipSynthesizer, SynthesisOptions};

/// Matches printed per ad hoc test query.
pub const TEST_QUERY_MATCHES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingestion,
    Synthesis,
}

/// A unit of work that produced no output.
#[derive(Debug, Clone)]
pub struct SkippedUnit {
    pub stage: Stage,
    pub subject: String,
    pub cause: String,
}

#[derive(Debug, Clone)]
pub struct TestQueryResult {
    pub query: String,
    pub matches: Vec<Match>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub models_written: usize,
    pub explicit_relationships: usize,
    pub semantic_relationships: usize,
    pub test_queries: Vec<TestQueryResult>,
    pub skipped: Vec<SkippedUnit>,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub business_context: Option<String>,
    /// Tables to process; empty means every table of the default database.
    pub tables: Vec<TableRef>,
    pub test_queries: Vec<String>,
}

pub struct Pipeline {
    config: LensConfig,
    source: Arc<dyn SchemaSource>,
    generator: Option<Arc<dyn TextGenerator>>,
    backend: Arc<dyn IndexBackend>,
}

impl Pipeline {
    pub fn new(
        config: LensConfig,
        source: Arc<dyn SchemaSource>,
        generator: Option<Arc<dyn TextGenerator>>,
        backend: Arc<dyn IndexBackend>,
    ) -> Self {
        Self {
            config,
            source,
            generator,
            backend,
        }
    }

    /// Wires the SQL source, the hosted services and the flat index from config.
    pub fn from_config(config: LensConfig) -> Result<Self, LensError> {
        let source = Arc::new(SqlSchemaSource::new(config.datasource.clone()));
        let generator = generator_from_config(&config.llm)?;
        let backend = Arc::new(FlatBackend::new(embedder_from_config(&config.llm)?));
        Ok(Self::new(config, source, generator, backend))
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunReport, LensError> {
        let mut report = RunReport::default();

        info!("=== Step 1: Database Ingestion ===");
        let scope = self.resolve_scope(&options.tables).await?;
        let catalog = ModelCatalog::open(self.config.models_dir())?;
        let explicit = self
            .ingest(&scope, options.business_context.clone(), &catalog, &mut report)
            .await?;

        let store = RelationshipStore::open(self.config.relationships_dir())?;
        report.explicit_relationships = store.write_explicit(&explicit)?;
        info!(
            "Ingestion complete: {} models, {} explicit relationships",
            report.models_written, report.explicit_relationships
        );

        info!("=== Step 2: Building Vector Index ===");
        let index_dir = self.config.index_dir();
        let index = build_and_save(self.backend.as_ref(), &catalog, &index_dir).await?;

        if !options.test_queries.is_empty() {
            report.test_queries = self.run_test_queries(&index_dir, &options.test_queries).await;
        }

        info!("=== Step 3: Generating Semantic Relationships ===");
        let models = catalog.list()?;
        let semantic = match &self.generator {
            Some(generator) => {
                let retriever = Arc::new(Retriever::new(
                    self.backend.clone(),
                    catalog.clone(),
                    index_dir,
                    index,
                ));
                let synthesizer = RelationshipSynthesizer::new(
                    generator.clone(),
                    retriever,
                    SynthesisOptions {
                        concurrency: self.config.concurrency,
                        timeout: self.config.llm.timeout,
                        ..SynthesisOptions::default()
                    },
                );
                let outcome = synthesizer.run(models).await;
                report
                    .skipped
                    .extend(outcome.skipped.into_iter().map(|skip| SkippedUnit {
                        stage: Stage::Synthesis,
                        subject: skip.table,
                        cause: skip.cause.to_string(),
                    }));
                outcome.relationships
            }
            None => {
                warn!("OPENAI_API_KEY is not set; skipping relationship synthesis");
                report
                    .skipped
                    .extend(models.into_iter().map(|model| SkippedUnit {
                        stage: Stage::Synthesis,
                        subject: model.name,
                        cause: "no generative service configured".to_string(),
                    }));
                Vec::new()
            }
        };
        report.semantic_relationships = store.write_semantic(&semantic)?;

        info!(
            "Run complete: {} models, {} explicit and {} semantic relationships, {} skipped",
            report.models_written,
            report.explicit_relationships,
            report.semantic_relationships,
            report.skipped.len()
        );
        Ok(report)
    }

    /// Answers ad hoc queries against the index as reloaded from disk. Test
    /// queries are advisory: any failure is logged and the run goes on.
    async fn run_test_queries(&self, index_dir: &Path, queries: &[String]) -> Vec<TestQueryResult> {
        let loaded = match self.backend.load(index_dir) {
            Ok(index) => index,
            Err(e) => {
                warn!("Could not reload index for test queries, skipping them: {}", e);
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            match loaded.query(query, TEST_QUERY_MATCHES).await {
                Ok(matches) => results.push(TestQueryResult {
                    query: query.clone(),
                    matches,
                }),
                Err(e) => warn!("Test query '{}' failed: {}", query, e),
            }
        }
        results
    }

    /// The configured tables, or every table of the default database.
    async fn resolve_scope(&self, tables: &[TableRef]) -> Result<TableScope, LensError> {
        if !tables.is_empty() {
            return Ok(TableScope::new(tables.iter().cloned()));
        }

        let database = self
            .config
            .default_database
            .clone()
            .ok_or(ConfigError::Missing("DB_NAME"))?;
        let adapter = self.source.connect(&database).await?;
        let names = adapter.list_tables().await?;
        info!("No tables given; processing all {} tables of {}", names.len(), database);
        Ok(TableScope::new(
            names.into_iter().map(|table| TableRef::new(database.clone(), table)),
        ))
    }

    /// Writes one model per reachable table and returns the in-scope
    /// explicit relationships grouped by database.
    async fn ingest(
        &self,
        scope: &TableScope,
        business_context: Option<String>,
        catalog: &ModelCatalog,
        report: &mut RunReport,
    ) -> Result<Vec<(String, Vec<Relationship>)>, LensError> {
        let builder = ModelBuilder::new(
            self.generator.clone(),
            business_context,
            self.config.llm.timeout,
        );
        let mut explicit = Vec::new();

        for database in scope.databases() {
            let adapter = self.source.connect(database).await?;

            for table in scope.tables_in(database) {
                let columns = match adapter.list_columns(table).await {
                    Ok(columns) => columns,
                    Err(e) => {
                        error!("Error processing table {}.{}: {}", database, table, e);
                        report.skipped.push(SkippedUnit {
                            stage: Stage::Ingestion,
                            subject: format!("{}:{}", database, table),
                            cause: e.to_string(),
                        });
                        continue;
                    }
                };

                let model = builder.build(database, table, &columns).await;
                match catalog.put(&model) {
                    Ok(path) => {
                        info!("Generated model for {}.{} at {}", database, table, path.display());
                        report.models_written += 1;
                    }
                    Err(e) => {
                        error!("Could not store model for {}.{}: {}", database, table, e);
                        report.skipped.push(SkippedUnit {
                            stage: Stage::Ingestion,
                            subject: format!("{}:{}", database, table),
                            cause: e.to_string(),
                        });
                    }
                }
            }

            match adapter.list_foreign_keys().await {
                Ok(foreign_keys) => {
                    let relationships = extract_explicit(database, &foreign_keys, scope);
                    explicit.push((database.to_string(), relationships));
                }
                Err(e) => {
                    error!("Could not read foreign keys of {}: {}", database, e);
                    report.skipped.push(SkippedUnit {
                        stage: Stage::Ingestion,
                        subject: format!("{} foreign keys", database),
                        cause: e.to_string(),
                    });
                }
            }
        }
        Ok(explicit)
    }
}
