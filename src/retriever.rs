//! Vector similarity search over stored chunks (§4.7).
//!
//! A brute-force scan: embed the query, score every stored chunk that has
//! an embedding by cosine similarity against it, drop anything below the
//! relevance floor, and return the top K. No index structure — the corpus
//! this targets is small enough that a linear scan is the right answer.

use crate::config::RetrieverConfig;
use crate::embedder::cosine_similarity;
use crate::error::{RagError, Result};
use crate::model_client::ModelClient;
use crate::store::Store;
use crate::types::RetrievalSource;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct Retriever {
    store: Arc<dyn Store>,
    model_client: Arc<ModelClient>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(store: Arc<dyn Store>, model_client: Arc<ModelClient>, config: RetrieverConfig) -> Self {
        Self {
            store,
            model_client,
            config,
        }
    }

    /// Retrieves the top-K most relevant chunks for `query`, optionally
    /// restricted to documents carrying `tag_id`. Returns an empty list,
    /// never an error, when no embedded chunks exist yet.
    pub async fn retrieve(
        &self,
        query: &str,
        tag_id: Option<Uuid>,
    ) -> Result<Vec<RetrievalSource>> {
        let query_embedding = self
            .model_client
            .embed(query)
            .await
            .map_err(RagError::Model)?;

        let chunks = self.store.get_all_chunks_with_embeddings(tag_id).await?;

        let mut scored: Vec<RetrievalSource> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                let score = cosine_similarity(&query_embedding, embedding);
                if score < self.config.min_relevance_score {
                    return None;
                }
                Some(RetrievalSource {
                    chunk_id: chunk.id,
                    document_id: chunk.document_id,
                    document_title: chunk.metadata.document_title.clone(),
                    chunk_index: chunk.index,
                    chunk_text: chunk.text,
                    relevance_score: score,
                    // filled in by fill_in_authors after truncation, so the
                    // document lookup only happens for chunks that made it
                    // into the final top-K
                    author: None,
                    document_type: chunk.metadata.document_type,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });

        scored.truncate(self.config.top_k);
        self.fill_in_authors(&mut scored).await?;
        Ok(scored)
    }

    /// Looks up the author of each distinct document among the results,
    /// one `get_document` call per document rather than per chunk — the
    /// chunk-level denormalization deliberately stops at title and type
    /// (§3), so author has to come from the Document row.
    async fn fill_in_authors(&self, sources: &mut [RetrievalSource]) -> Result<()> {
        let mut authors: HashMap<Uuid, Option<String>> = HashMap::new();
        for source in sources.iter() {
            if !authors.contains_key(&source.document_id) {
                let author = self
                    .store
                    .get_document(source.document_id)
                    .await?
                    .and_then(|doc| doc.author);
                authors.insert(source.document_id, author);
            }
        }
        for source in sources.iter_mut() {
            source.author = authors.get(&source.document_id).cloned().flatten();
        }
        Ok(())
    }
}
