use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            url: None,
            model: None,
            dims: None,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Queries shorter than this many characters get a reduced keyword limit.
    #[serde(default = "default_short_query_len")]
    pub short_query_len: usize,
    /// Keyword hits scoring below this are dropped before fusion.
    #[serde(default = "default_min_keyword_score")]
    pub min_keyword_score: f64,
    #[serde(default = "default_top")]
    pub default_top: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            short_query_len: default_short_query_len(),
            min_keyword_score: default_min_keyword_score(),
            default_top: default_top(),
        }
    }
}

fn default_short_query_len() -> usize {
    3
}
fn default_min_keyword_score() -> f64 {
    0.05
}
fn default_top() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccessConfig {
    /// Version codes readable without the `bible:read` capability.
    #[serde(default = "default_public_versions")]
    pub public_versions: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            public_versions: default_public_versions(),
        }
    }
}

fn default_public_versions() -> Vec<String> {
    vec![
        "CUNP-TC".to_string(),
        "CUNP-SC".to_string(),
        "KJV".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    /// Bounded channel capacity for content frames.
    #[serde(default = "default_content_buffer")]
    pub content_buffer: usize,
    /// Bounded channel capacity for binary vector batches.
    #[serde(default = "default_vector_buffer")]
    pub vector_buffer: usize,
    /// Number of vector records per flushed batch.
    #[serde(default = "default_vector_batch")]
    pub vector_batch: usize,
    /// Whole-stream deadline in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            content_buffer: default_content_buffer(),
            vector_buffer: default_vector_buffer(),
            vector_batch: default_vector_batch(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn default_content_buffer() -> usize {
    10
}
fn default_vector_buffer() -> usize {
    50
}
fn default_vector_batch() -> usize {
    100
}
fn default_deadline_secs() -> u64 {
    300
}

impl Config {
    /// A minimal configuration for tests: in-temp database, ephemeral bind,
    /// embeddings disabled.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/scriptorium.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            access: AccessConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.default_top < 1 {
        anyhow::bail!("retrieval.default_top must be >= 1");
    }

    if config.retrieval.min_keyword_score < 0.0 {
        anyhow::bail!("retrieval.min_keyword_score must be >= 0.0");
    }

    if config.stream.content_buffer == 0 || config.stream.vector_buffer == 0 {
        anyhow::bail!("stream buffer capacities must be > 0");
    }

    if config.stream.vector_batch == 0 {
        anyhow::bail!("stream.vector_batch must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.url.is_none() {
            anyhow::bail!(
                "embedding.url must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "remote" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or remote.",
            other
        ),
    }

    Ok(config)
}
