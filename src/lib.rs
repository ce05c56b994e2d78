//! Retrieval-augmented generation core for onboarding document Q&A.
//!
//! Uploaded PDFs are extracted, chunked, embedded, and stored; questions
//! are answered by retrieving the most relevant chunks and asking the
//! configured provider to synthesize a grounded, cited response. Every
//! call to the external provider — embedding or generation — passes
//! through a single [`model_client::ModelClient`], the one component that
//! knows the provider's request shape, rate limits, and retry behavior.
//!
//! # Example
//!
//! ```rust,no_run
//! use onboarding_rag::config::RagConfig;
//! use onboarding_rag::model_client::{HttpModelProvider, ModelClient};
//! use onboarding_rag::store::SqliteStore;
//! use onboarding_rag::{Answerer, Ingestor, Retriever};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RagConfig::load(Some("onboarding_rag.toml"))?;
//!     let store = Arc::new(SqliteStore::connect(&config.store).await?);
//!     let provider = Arc::new(HttpModelProvider::new(
//!         config.model_client.provider_url.clone(),
//!         config.model_client.api_key.clone(),
//!         config.model_client.text_model.clone(),
//!         config.model_client.embedding_model.clone(),
//!         Duration::from_millis(config.model_client.request_timeout_ms),
//!     )?);
//!     let model_client = Arc::new(ModelClient::spawn(provider, config.model_client.clone()));
//!
//!     let ingestor = Ingestor::new(
//!         store.clone(),
//!         model_client.clone(),
//!         config.chunker.clone(),
//!         config.embedder.clone(),
//!     );
//!     let retriever = Retriever::new(store.clone(), model_client.clone(), config.retriever.clone());
//!     let answerer = Answerer::new(retriever, model_client, config.answerer.clone());
//!
//!     let _ = ingestor;
//!     let _ = answerer;
//!     Ok(())
//! }
//! ```

pub mod answerer;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod extractor;
pub mod ingestor;
pub mod model_client;
pub mod retriever;
pub mod stats;
pub mod store;
pub mod types;

pub use answerer::Answerer;
pub use chunker::Chunker;
pub use config::RagConfig;
pub use embedder::Embedder;
pub use error::{RagError, Result};
pub use extractor::Extractor;
pub use ingestor::Ingestor;
pub use model_client::{HttpModelProvider, ModelClient};
pub use retriever::Retriever;
pub use stats::{KnowledgeBaseStats, StatsReporter};
pub use store::{SqliteStore, Store};
pub use types::{
    Answer, Chunk, ChunkDraft, Document, DocumentMetadataSummary, DocumentType, DocumentWithStats,
    NewChunk, RetrievalSource, Tag,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
