//! Orchestrates the ingestion pipeline end to end (§4.6): extract, merge
//! metadata, insert the Document, chunk, embed, and transactionally insert
//! the chunks that embedded successfully.

use crate::chunker::Chunker;
use crate::config::{ChunkerConfig, EmbedderConfig};
use crate::embedder::Embedder;
use crate::error::{RagError, Result};
use crate::extractor::Extractor;
use crate::model_client::ModelClient;
use crate::store::Store;
use crate::types::{
    ChunkDraft, ChunkMetadata, Document, DocumentMetadata, DocumentMetadataSummary, ReprocessAllReport,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

pub struct Ingestor {
    store: Arc<dyn Store>,
    extractor: Extractor,
    chunker: Chunker,
    embedder: Embedder,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        model_client: Arc<ModelClient>,
        chunker_config: ChunkerConfig,
        embedder_config: EmbedderConfig,
    ) -> Self {
        Self {
            store,
            extractor: Extractor::new(),
            chunker: Chunker::new(chunker_config),
            embedder: Embedder::new(model_client, embedder_config),
        }
    }

    /// Extracts, chunks, embeds, and persists a newly uploaded document.
    pub async fn process_document(
        &self,
        bytes: &[u8],
        title: Option<&str>,
        tag_id: Option<Uuid>,
        filename: Option<&str>,
    ) -> Result<DocumentMetadataSummary> {
        let started = Instant::now();

        let extracted = self.extractor.extract(bytes, filename)?;

        let final_title = title
            .map(|t| t.to_string())
            .or(extracted.metadata.title.clone())
            .unwrap_or_else(|| "Untitled Document".to_string());
        let author = extracted.metadata.author.clone();

        let document_id = Uuid::new_v4();
        let metadata = DocumentMetadata {
            document_type: extracted
                .metadata
                .document_type
                .unwrap_or(crate::types::DocumentType::General),
            language: extracted.metadata.language.unwrap_or(crate::types::Language::Unknown),
            extracted_tags: extracted.metadata.extracted_tags.clone(),
            section_count: extracted.sections.len(),
        };

        let document = Document {
            id: document_id,
            title: final_title.clone(),
            author: author.clone(),
            tag_id,
            content: extracted.text.clone(),
            page_count: extracted.page_count,
            word_count: extracted.word_count,
            metadata: metadata.clone(),
            uploaded_at: chrono::Utc::now(),
        };
        self.store.insert_document(&document).await?;

        let drafts = self.chunker.chunk(&extracted.text);
        let chunk_count = drafts.len();

        let outcome = self
            .embedder
            .embed_drafts(drafts, |draft| chunk_metadata(draft, &final_title, metadata.document_type))
            .await;
        let embedded_chunk_count = outcome.chunks.len();
        let embedding_partial = outcome.failed > 0;

        self.store.bulk_insert_chunks(document_id, outcome.chunks).await?;

        info!(
            document_id = %document_id,
            chunk_count,
            embedded_chunk_count,
            "document ingested"
        );

        Ok(DocumentMetadataSummary {
            document_id,
            title: final_title,
            author,
            page_count: document.page_count,
            word_count: document.word_count,
            chunk_count,
            embedded_chunk_count,
            metadata,
            processing_seconds: started.elapsed().as_secs_f64(),
            embedding_partial,
        })
    }

    /// Re-chunks and re-embeds a document's stored text, atomically
    /// replacing its chunk set. Safe to invoke repeatedly.
    pub async fn reprocess_document(&self, document_id: Uuid) -> Result<DocumentMetadataSummary> {
        let started = Instant::now();

        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| RagError::NotFound(document_id.to_string()))?;

        let drafts = self.chunker.chunk(&document.content);
        let chunk_count = drafts.len();

        let title = document.title.clone();
        let document_type = document.metadata.document_type;
        let outcome = self
            .embedder
            .embed_drafts(drafts, |draft| chunk_metadata(draft, &title, document_type))
            .await;
        let embedded_chunk_count = outcome.chunks.len();
        let embedding_partial = outcome.failed > 0;

        self.store.replace_chunks(document_id, outcome.chunks).await?;

        Ok(DocumentMetadataSummary {
            document_id,
            title: document.title,
            author: document.author,
            page_count: document.page_count,
            word_count: document.word_count,
            chunk_count,
            embedded_chunk_count,
            metadata: document.metadata,
            processing_seconds: started.elapsed().as_secs_f64(),
            embedding_partial,
        })
    }

    /// Reprocesses every stored document. A single document's failure is
    /// recorded and does not abort the batch.
    pub async fn reprocess_all_documents(&self) -> Result<ReprocessAllReport> {
        let ids = self.store.list_document_ids().await?;
        let mut report = ReprocessAllReport::default();

        for id in ids {
            match self.reprocess_document(id).await {
                Ok(_) => report.processed += 1,
                Err(err) => {
                    error!(document_id = %id, error = %err, "reprocess failed");
                    report.errors.push((id, err.to_string()));
                }
            }
        }

        Ok(report)
    }
}

fn chunk_metadata(
    draft: &ChunkDraft,
    document_title: &str,
    document_type: crate::types::DocumentType,
) -> ChunkMetadata {
    ChunkMetadata {
        start_char: draft.start_char,
        end_char: draft.end_char,
        section_title: None,
        document_title: document_title.to_string(),
        document_type,
    }
}
