use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::models::connections::{ConnectionConfig, DbType};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Which embedding backend feeds the similarity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    OpenAi,
    /// Deterministic token-hash vectors, no network.
    Hash,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedder: EmbedderKind,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedder: EmbedderKind::OpenAi,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Everything a run needs, read from the environment once at startup and
/// handed to each component.
#[derive(Debug, Clone)]
pub struct LensConfig {
    pub datasource: ConnectionConfig,
    /// Database used when no `database:table` pairs are given.
    pub default_database: Option<String>,
    pub llm: LlmConfig,
    pub cache_dir: PathBuf,
    pub concurrency: usize,
}

impl LensConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_type = DbType::parse(&get("DATASOURCE_TYPE").unwrap_or_else(|| "mysql".into()))?;
        let port = match get("DB_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "DB_PORT",
                value: raw,
            })?,
            None => db_type.default_port(),
        };

        let datasource = ConnectionConfig {
            db_type,
            host: get("DB_HOST").unwrap_or_else(|| "localhost".into()),
            port,
            username: get("DB_USER").ok_or(ConfigError::Missing("DB_USER"))?,
            password: get("DB_PASS").unwrap_or_default(),
        };

        let embedder = match get("LENS_EMBEDDER").as_deref().map(str::to_lowercase) {
            None => EmbedderKind::OpenAi,
            Some(v) if v == "openai" => EmbedderKind::OpenAi,
            Some(v) if v == "hash" => EmbedderKind::Hash,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    name: "LENS_EMBEDDER",
                    value: v,
                })
            }
        };

        let timeout_secs = parse_number(get("LENS_TIMEOUT_SECS"), "LENS_TIMEOUT_SECS", 30)?;
        let concurrency = parse_number(get("LENS_CONCURRENCY"), "LENS_CONCURRENCY", 4)?;

        let llm = LlmConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
            chat_model: get("LENS_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.into()),
            embedding_model: get("LENS_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            embedder,
            timeout: Duration::from_secs(timeout_secs),
        };

        Ok(Self {
            datasource,
            default_database: get("DB_NAME"),
            llm,
            cache_dir: get("LENS_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("fs_cache")),
            concurrency: concurrency.max(1) as usize,
        })
    }

    pub fn models_dir(&self) -> PathBuf {
        self.cache_dir.join("models")
    }

    pub fn relationships_dir(&self) -> PathBuf {
        self.cache_dir.join("relationships")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.cache_dir.join("vector_index")
    }
}

fn parse_number(raw: Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
