//! Relationship synthesis: for every Table Model, retrieve its nearest
//! neighbours, ask the generative service for relationships between them and
//! decode the answer. Each table is an independent unit of work; a failure in
//! one is recorded as a skip and never stops the others.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::errors::SynthesisError;
use crate::index::Retriever;
use crate::llm::{CompletionRequest, TextGenerator};
use crate::models::relationship::Relationship;
use crate::models::table_model::TableModel;

pub mod parse;

pub use parse::parse_relationships;

const SYSTEM_PROMPT: &str =
    "You are a database relationship expert who generates accurate and meaningful table relationships.";

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Neighbours retrieved per table.
    pub neighbors: usize,
    /// Tables processed at once.
    pub concurrency: usize,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            neighbors: 3,
            concurrency: 4,
            timeout: Duration::from_secs(30),
            temperature: 0.3,
            max_tokens: 500,
        }
    }
}

/// A table that produced no relationships, and why.
#[derive(Debug)]
pub struct Skip {
    pub table: String,
    pub cause: SynthesisError,
}

#[derive(Debug, Default)]
pub struct SynthesisReport {
    pub relationships: Vec<Relationship>,
    pub skipped: Vec<Skip>,
}

#[derive(Clone)]
pub struct RelationshipSynthesizer {
    generator: Arc<dyn TextGenerator>,
    retriever: Arc<Retriever>,
    options: SynthesisOptions,
}

pub fn retrieval_query(table: &str) -> String {
    format!("Find tables related to {}", table)
}

/// `current` is the serialized model; neighbours are embedded as one JSON array.
pub fn relationship_prompt(current: &str, related: &[Value]) -> String {
    let related = Value::Array(related.to_vec()).to_string();
    format!(
        r#"
Based on the following database models, generate potential relationships in JSON format.
Focus on identifying meaningful business relationships between these tables.

Current Model:
{current}

Related Models:
{related}

Generate relationships in the following format:
{{
    "name": "RelationshipName",
    "models": ["Table1", "Table2"],
    "joinType": "ONE_TO_MANY" or "MANY_TO_MANY",
    "condition": "Table1.column = Table2.column"
}}

Consider:
1. Primary and foreign key relationships
2. Business logic connections
3. Common fields that could be used for joins
4. The nature of the relationship (one-to-many, many-to-many)

Return only the JSON object, no additional text.
"#
    )
}

impl RelationshipSynthesizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        retriever: Arc<Retriever>,
        options: SynthesisOptions,
    ) -> Self {
        Self {
            generator,
            retriever,
            options,
        }
    }

    /// Runs every model through retrieve, prompt, parse. Output keeps the
    /// order of `models` regardless of completion order.
    pub async fn run(&self, models: Vec<TableModel>) -> SynthesisReport {
        let total = models.len();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (position, model) in models.into_iter().enumerate() {
            let this = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = this.synthesize_one(&model).await;
                (position, model.name, outcome)
            });
        }

        let mut outcomes: Vec<Option<(String, Result<Vec<Relationship>, SynthesisError>)>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, table, outcome)) => outcomes[position] = Some((table, outcome)),
                Err(e) => error!("Synthesis task aborted: {}", e),
            }
        }

        let mut report = SynthesisReport::default();
        for (table, outcome) in outcomes.into_iter().flatten() {
            match outcome {
                Ok(relationships) => {
                    info!("Synthesized {} relationships for {}", relationships.len(), table);
                    report.relationships.extend(relationships);
                }
                Err(cause) => {
                    warn!("Skipping {}: {}", table, cause);
                    report.skipped.push(Skip { table, cause });
                }
            }
        }
        report
    }

    pub async fn synthesize_one(&self, model: &TableModel) -> Result<Vec<Relationship>, SynthesisError> {
        let matches = self
            .retriever
            .query(&retrieval_query(&model.name), self.options.neighbors)
            .await?;

        let related: Vec<Value> = matches
            .iter()
            .filter_map(|m| match serde_json::from_str::<Value>(&m.document.text) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(
                        "Could not decode neighbour {} retrieved for {}: {}",
                        m.document.metadata.table_name, model.name, e
                    );
                    None
                }
            })
            .collect();
        if related.is_empty() {
            return Err(SynthesisError::RetrievalEmpty);
        }

        let current = serde_json::to_string(model)?;
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: relationship_prompt(&current, &related),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            timeout: self.options.timeout,
        };

        let response = tokio::time::timeout(self.options.timeout, self.generator.complete(&request))
            .await
            .map_err(|_| SynthesisError::Timeout)??;
        debug!("Response for {}:\n{}", model.name, response);

        Ok(parse_relationships(&response)?)
    }
}
