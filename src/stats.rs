//! Knowledge-base readiness and composition aggregates (§4.9).

use crate::error::Result;
use crate::store::Store;
use crate::types::{Document, DocumentType};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct StatsReporter {
    store: Arc<dyn Store>,
}

/// Aggregate view over the entire corpus, recomputed on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBaseStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_words: i64,
    pub documents_with_embeddings: usize,
    pub avg_chunks_per_document: f64,
    pub document_type_distribution: BTreeMap<DocumentType, usize>,
    pub recent_uploads: Vec<Document>,
    pub is_ready: bool,
}

impl StatsReporter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn compute(&self) -> Result<KnowledgeBaseStats> {
        let documents = self.store.list_documents_with_stats().await?;

        let total_documents = documents.len();
        let total_chunks: usize = documents.iter().map(|d| d.chunk_count).sum();
        let total_words: i64 = documents.iter().map(|d| d.document.word_count).sum();
        let documents_with_embeddings = documents
            .iter()
            .filter(|d| d.embedded_chunk_count > 0)
            .count();
        let avg_chunks_per_document = if total_documents == 0 {
            0.0
        } else {
            total_chunks as f64 / total_documents as f64
        };

        let mut document_type_distribution: BTreeMap<DocumentType, usize> = BTreeMap::new();
        for doc in &documents {
            *document_type_distribution
                .entry(doc.document.metadata.document_type)
                .or_insert(0) += 1;
        }

        // `list_documents_with_stats` already orders by uploaded_at DESC.
        let recent_uploads = documents
            .iter()
            .take(5)
            .map(|d| d.document.clone())
            .collect();

        Ok(KnowledgeBaseStats {
            total_documents,
            total_chunks,
            total_words,
            documents_with_embeddings,
            avg_chunks_per_document,
            document_type_distribution,
            recent_uploads,
            is_ready: documents_with_embeddings > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::SqliteStore;
    use crate::types::{ChunkMetadata, DocumentMetadata, Language, NewChunk};
    use chrono::Utc;
    use uuid::Uuid;

    async fn store_with(docs: Vec<(DocumentType, bool)>) -> Arc<SqliteStore> {
        let store = SqliteStore::connect(&StoreConfig {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
        .unwrap();

        for (document_type, embedded) in docs {
            let id = Uuid::new_v4();
            store
                .insert_document(&Document {
                    id,
                    title: "Doc".to_string(),
                    author: None,
                    tag_id: None,
                    content: "body".to_string(),
                    page_count: 1,
                    word_count: 100,
                    metadata: DocumentMetadata {
                        document_type,
                        language: Language::En,
                        extracted_tags: vec![],
                        section_count: 0,
                    },
                    uploaded_at: Utc::now(),
                })
                .await
                .unwrap();

            if embedded {
                store
                    .bulk_insert_chunks(
                        id,
                        vec![NewChunk {
                            index: 0,
                            text: "chunk".to_string(),
                            token_count: 2,
                            embedding: vec![0.1, 0.2],
                            metadata: ChunkMetadata {
                                start_char: 0,
                                end_char: 5,
                                section_title: None,
                                document_title: "Doc".to_string(),
                                document_type,
                            },
                        }],
                    )
                    .await
                    .unwrap();
            }
        }

        Arc::new(store)
    }

    #[tokio::test]
    async fn empty_store_is_not_ready() {
        let store = store_with(vec![]).await;
        let stats = StatsReporter::new(store).compute().await.unwrap();
        assert_eq!(stats.total_documents, 0);
        assert!(!stats.is_ready);
    }

    #[tokio::test]
    async fn stats_aggregate_across_documents() {
        let store = store_with(vec![
            (DocumentType::Onboarding, true),
            (DocumentType::Policy, false),
            (DocumentType::Onboarding, true),
        ])
        .await;

        let stats = StatsReporter::new(store).compute().await.unwrap();
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.documents_with_embeddings, 2);
        assert!(stats.is_ready);
        assert_eq!(stats.document_type_distribution[&DocumentType::Onboarding], 2);
        assert_eq!(stats.document_type_distribution[&DocumentType::Policy], 1);
        assert!((stats.avg_chunks_per_document - (2.0 / 3.0)).abs() < 1e-9);
    }
}
