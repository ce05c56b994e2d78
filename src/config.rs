//! Layered configuration for the RAG core: compiled-in defaults, overridden
//! by an optional TOML file, overridden by environment variables.

use serde::{Deserialize, Serialize};

/// Top-level configuration tree, one sub-struct per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub model_client: ModelClientConfig,
    pub store: StoreConfig,
    pub chunker: ChunkerConfig,
    pub embedder: EmbedderConfig,
    pub retriever: RetrieverConfig,
    pub answerer: AnswererConfig,
}

/// The single configured embedding/generation provider endpoint (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelClientConfig {
    /// Base URL of the provider's chat/embedding API
    pub provider_url: String,

    /// Bearer token for the provider, if it requires one
    pub api_key: Option<String>,

    /// Model name used for answer generation
    pub text_model: String,

    /// Model name used for embeddings
    pub embedding_model: String,

    /// Dimensionality the configured embedding model produces
    pub embedding_dimension: usize,

    /// Capacity of the bounded FIFO request queue
    pub queue_capacity: usize,

    /// Minimum spacing enforced between consecutive provider requests
    pub min_interval_ms: u64,

    /// Per-request deadline
    pub request_timeout_ms: u64,

    /// Initial backoff delay on a transient failure
    pub backoff_initial_ms: u64,

    /// Backoff delay ceiling; doubles from `backoff_initial_ms` up to this
    pub backoff_max_ms: u64,

    /// Maximum retry attempts for a transient failure before giving up
    pub max_retries: u32,
}

/// SQLite-backed document/chunk store (§4.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// sqlx connection URL, e.g. `sqlite:onboarding_rag.db`
    pub database_url: String,

    /// Maximum pooled connections
    pub max_connections: u32,
}

/// Paragraph-based chunking with sentence-aware overlap (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Target chunk size in approximate tokens
    pub chunk_tokens: usize,

    /// Approximate token overlap seeded from the tail of the previous chunk
    pub chunk_overlap_tokens: usize,
}

/// Bounded-concurrency, rate-limited embedding stage (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Chunks embedded concurrently per batch
    pub batch_size: usize,

    /// Delay between batches
    pub batch_delay_ms: u64,
}

/// Cosine-similarity retrieval over stored chunk embeddings (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Number of sources returned per query
    pub top_k: usize,

    /// Minimum cosine similarity a chunk must clear to be considered
    pub min_relevance_score: f32,
}

/// Grounded answer synthesis (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswererConfig {
    /// Sampling temperature passed to the Model Client; kept low and
    /// deliberate so answers stay close to the retrieved context
    pub temperature: f32,

    /// Ceiling on generated answer length
    pub max_output_tokens: u32,
}

impl Default for ModelClientConfig {
    fn default() -> Self {
        Self {
            provider_url: "http://localhost:11434".to_string(),
            api_key: None,
            text_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 768,
            queue_capacity: 50,
            min_interval_ms: 6500,
            request_timeout_ms: 300_000,
            backoff_initial_ms: 1000,
            backoff_max_ms: 30_000,
            max_retries: 5,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:onboarding_rag.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_tokens: 512,
            chunk_overlap_tokens: 50,
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_ms: 500,
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_relevance_score: 0.3,
        }
    }
}

impl Default for AnswererConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 1024,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            model_client: ModelClientConfig::default(),
            store: StoreConfig::default(),
            chunker: ChunkerConfig::default(),
            embedder: EmbedderConfig::default(),
            retriever: RetrieverConfig::default(),
            answerer: AnswererConfig::default(),
        }
    }
}

impl RagConfig {
    /// Build configuration from three layered sources, lowest precedence
    /// first: compiled-in defaults, an optional TOML file, then environment
    /// variables prefixed `ONBOARDING_RAG__` (double underscore separates
    /// nesting, e.g. `ONBOARDING_RAG__MODEL_CLIENT__PROVIDER_URL`).
    pub fn load(file_path: Option<&str>) -> anyhow::Result<Self> {
        let defaults = config::Config::try_from(&RagConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = file_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ONBOARDING_RAG")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder.build()?;
        let config: RagConfig = raw.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject structurally invalid configuration before any component is
    /// constructed.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model_client.text_model.is_empty() {
            return Err(anyhow::anyhow!("model_client.text_model cannot be empty"));
        }
        if self.model_client.embedding_model.is_empty() {
            return Err(anyhow::anyhow!(
                "model_client.embedding_model cannot be empty"
            ));
        }
        if self.model_client.embedding_dimension == 0 {
            return Err(anyhow::anyhow!(
                "model_client.embedding_dimension must be greater than 0"
            ));
        }
        if self.model_client.queue_capacity == 0 {
            return Err(anyhow::anyhow!(
                "model_client.queue_capacity must be greater than 0"
            ));
        }
        if self.chunker.chunk_tokens == 0 {
            return Err(anyhow::anyhow!("chunker.chunk_tokens must be greater than 0"));
        }
        if self.chunker.chunk_overlap_tokens >= self.chunker.chunk_tokens {
            return Err(anyhow::anyhow!(
                "chunker.chunk_overlap_tokens must be smaller than chunker.chunk_tokens"
            ));
        }
        if self.embedder.batch_size == 0 {
            return Err(anyhow::anyhow!("embedder.batch_size must be greater than 0"));
        }
        if self.retriever.top_k == 0 {
            return Err(anyhow::anyhow!("retriever.top_k must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.retriever.min_relevance_score) {
            return Err(anyhow::anyhow!(
                "retriever.min_relevance_score must be between 0.0 and 1.0"
            ));
        }
        if !(0.0..=1.0).contains(&self.answerer.temperature) {
            return Err(anyhow::anyhow!(
                "answerer.temperature must be between 0.0 and 1.0"
            ));
        }
        if self.answerer.max_output_tokens == 0 {
            return Err(anyhow::anyhow!(
                "answerer.max_output_tokens must be greater than 0"
            ));
        }
        Ok(())
    }
}
