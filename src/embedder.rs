//! Turns chunk drafts into embedded chunks by batching calls through the
//! Model Client (§4.5).
//!
//! Batching exists to bound how many requests are in flight against the
//! Model Client's own queue at once; the inter-batch delay gives the
//! provider breathing room on top of the client's minimum spacing. A chunk
//! whose embedding call fails is dropped, not retried here — retries
//! already happened inside the Model Client — and the caller finds out via
//! the returned count of failures.

use crate::config::EmbedderConfig;
use crate::model_client::ModelClient;
use crate::types::{Chunk, ChunkDraft, ChunkMetadata, NewChunk};
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

pub struct Embedder {
    client: Arc<ModelClient>,
    config: EmbedderConfig,
}

/// Result of embedding a batch of chunk drafts: the chunks that embedded
/// successfully, ready for `Store::bulk_insert_chunks`/`replace_chunks`,
/// plus how many were dropped.
pub struct EmbeddingOutcome {
    pub chunks: Vec<NewChunk>,
    pub failed: usize,
}

impl Embedder {
    pub fn new(client: Arc<ModelClient>, config: EmbedderConfig) -> Self {
        Self { client, config }
    }

    /// Embeds every draft, reindexing the survivors contiguously from 0 so a
    /// partial-failure run never leaves a gap in chunk indices.
    pub async fn embed_drafts(
        &self,
        drafts: Vec<ChunkDraft>,
        metadata_for: impl Fn(&ChunkDraft) -> ChunkMetadata,
    ) -> EmbeddingOutcome {
        let total = drafts.len();
        let mut embedded: Vec<(ChunkDraft, Vec<f32>)> = Vec::with_capacity(total);
        let mut failed = 0usize;

        for batch in drafts.chunks(self.config.batch_size.max(1)) {
            let results = join_all(batch.iter().map(|draft| self.client.embed(draft.text.clone()))).await;
            for (draft, result) in batch.iter().zip(results) {
                match result {
                    Ok(embedding) => embedded.push((draft.clone(), embedding)),
                    Err(err) => {
                        failed += 1;
                        warn!(index = draft.index, error = %err, "chunk embedding failed, dropping chunk");
                    }
                }
            }

            if embedded.len() + failed < total {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        if failed > 0 {
            warn!(failed, total, "embedding completed with partial failures");
        }

        let chunks = embedded
            .into_iter()
            .enumerate()
            .map(|(new_index, (draft, embedding))| NewChunk {
                index: new_index as i64,
                token_count: draft.token_count,
                metadata: metadata_for(&draft),
                text: draft.text,
                embedding,
            })
            .collect();

        EmbeddingOutcome { chunks, failed }
    }

}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for
/// zero-norm vectors rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn embedded_chunk_matches_draft(chunk: &Chunk, draft: &ChunkDraft) -> bool {
    chunk.index == draft.index && chunk.text == draft.text
}
