use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a schema adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Error that occurs during database interactions (e.g., SQL query failure).
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    /// The server refused a metadata query (views, restricted objects).
    /// This is the only kind that triggers the fallback catalog query.
    #[error("Metadata query rejected: {0}")]
    MetadataRejected(String),
    /// Connection error (e.g., issues with network or database connection).
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Table not found: {0}")]
    TableNotFound(String),
}

/// Errors from the generative text or embedding service.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Service not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else if e.is_decode() {
            GenerationError::InvalidResponse(e.to_string())
        } else {
            GenerationError::Network(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Model not found: {database}.{table}")]
    NotFound { database: String, table: String },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file for one (database, table) holds a different model.
    #[error("Document {path} holds {found}, expected {expected}")]
    Mismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    /// A persisted document could not be decoded.
    #[error("Unreadable document {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] GenerationError),
    #[error("Index was built with {index} but the embedder is {embedder}")]
    ModelMismatch { index: String, embedder: String },
    #[error("Embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Embedding service returned {actual} vectors for {expected} documents")]
    BatchMismatch { expected: usize, actual: usize },
    #[error("Unsupported index artifact version: {0}")]
    Version(String),
    #[error("Corrupt index artifact: {0}")]
    Corrupt(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode relationship: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure to decode a structured relationship payload.
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Empty response")]
    Empty,
    #[error("Malformed payload: {reason} (content: {excerpt})")]
    Malformed { reason: String, excerpt: String },
    #[error("Payload held {0} records, none of them valid")]
    NoValidRecords(usize),
}

/// Why one table produced no semantic relationships.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("No related models retrieved")]
    RetrievalEmpty,
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] IndexError),
    #[error("Generative service timed out")]
    Timeout,
    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] ParseError),
    #[error("Generative service error: {0}")]
    Service(GenerationError),
    #[error("Could not encode model for the prompt: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<GenerationError> for SynthesisError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Timeout => SynthesisError::Timeout,
            other => SynthesisError::Service(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported database type: {0}")]
    UnsupportedDatabase(String),
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Failures that abort a whole run.
#[derive(Error, Debug)]
pub enum LensError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Invalid table format: {0}. Expected format: 'database:table'")]
    TableFormat(String),
}
