//! Document and chunk persistence (§4.2).
//!
//! One `documents` row per uploaded PDF, one `document_chunks` row per
//! chunk. Chunk metadata (document title, document type, section title,
//! character offsets) is denormalized onto the chunk row so retrieval never
//! needs a second round-trip to `documents`.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::types::{
    Chunk, ChunkMetadata, Document, DocumentMetadata, DocumentType, DocumentWithStats, Language,
    NewChunk,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Persistence boundary for documents and chunks.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_document(&self, document: &Document) -> Result<()>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    /// Deletes a document and every chunk belonging to it.
    async fn delete_document(&self, id: Uuid) -> Result<()>;

    async fn list_documents_with_stats(&self) -> Result<Vec<DocumentWithStats>>;

    async fn list_document_ids(&self) -> Result<Vec<Uuid>>;

    /// Inserts a batch of chunks for a document that has none yet.
    async fn bulk_insert_chunks(
        &self,
        document_id: Uuid,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Chunk>>;

    /// Atomically replaces every chunk belonging to a document (reprocess).
    async fn replace_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>>;

    /// All chunks across all documents that have an embedding, for the
    /// Retriever's brute-force scan. `tag_id`, when given, restricts the
    /// scan to chunks whose document carries that tag (§4.7's optional
    /// multi-tenant filter).
    async fn get_all_chunks_with_embeddings(&self, tag_id: Option<Uuid>) -> Result<Vec<Chunk>>;
}

/// sqlx/SQLite-backed implementation.
pub struct SqliteStore {
    pool: SqlitePool,
    // `replace_chunks` serializes on this lock rather than sharding by
    // document id: the onboarding corpus this core targets is small enough
    // that a global lock never becomes a bottleneck, and it rules out two
    // concurrent reprocess calls for different documents racing on SQLite's
    // single-writer model.
    replace_lock: Arc<Mutex<()>>,
}

impl SqliteStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        info!("connecting to store at {}", config.database_url);

        if let Some(db_path) = config.database_url.strip_prefix("sqlite:") {
            let db_path = db_path.split('?').next().unwrap_or(db_path);
            if db_path != ":memory:" {
                if let Some(parent) = std::path::Path::new(db_path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            crate::error::RagError::Internal(format!(
                                "failed to create store directory: {e}"
                            ))
                        })?;
                    }
                }
            }
        }

        let database_url = if config.database_url.contains('?') {
            if config.database_url.contains("mode=") {
                config.database_url.clone()
            } else {
                format!("{}&mode=rwc", config.database_url)
            }
        } else {
            format!("{}?mode=rwc", config.database_url)
        };

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&database_url)
            .await
            .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT,
                tag_id TEXT,
                content TEXT NOT NULL,
                page_count INTEGER NOT NULL,
                word_count INTEGER NOT NULL,
                document_type TEXT NOT NULL,
                language TEXT NOT NULL,
                extracted_tags TEXT NOT NULL DEFAULT '[]',
                section_count INTEGER NOT NULL DEFAULT 0,
                uploaded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                embedding BLOB,
                start_char INTEGER NOT NULL,
                end_char INTEGER NOT NULL,
                section_title TEXT,
                document_title TEXT NOT NULL,
                document_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_document_chunks_document_id ON document_chunks(document_id)",
        )
        .execute(&pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_document_chunks_doc_index ON document_chunks(document_id, chunk_index)",
        )
        .execute(&pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_uploaded_at ON documents(uploaded_at)")
            .execute(&pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(Self {
            pool,
            replace_lock: Arc::new(Mutex::new(())),
        })
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(data: &[u8]) -> Vec<f32> {
        data.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
        let id: String = row.get("id");
        let tag_id: Option<String> = row.get("tag_id");
        let document_type: String = row.get("document_type");
        let language: String = row.get("language");
        let extracted_tags: String = row.get("extracted_tags");
        let uploaded_at: String = row.get("uploaded_at");

        Ok(Document {
            id: Uuid::parse_str(&id).map_err(|e| crate::error::RagError::Internal(e.to_string()))?,
            title: row.get("title"),
            author: row.get("author"),
            tag_id: tag_id
                .map(|t| Uuid::parse_str(&t))
                .transpose()
                .map_err(|e| crate::error::RagError::Internal(e.to_string()))?,
            content: row.get("content"),
            page_count: row.get("page_count"),
            word_count: row.get("word_count"),
            metadata: DocumentMetadata {
                document_type: document_type.parse().unwrap_or(DocumentType::General),
                language: if language == "en" {
                    Language::En
                } else {
                    Language::Unknown
                },
                extracted_tags: serde_json::from_str(&extracted_tags).unwrap_or_default(),
                section_count: row.get::<i64, _>("section_count") as usize,
            },
            uploaded_at: parse_rfc3339(&uploaded_at)?,
        })
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
        let id: String = row.get("id");
        let document_id: String = row.get("document_id");
        let embedding_blob: Option<Vec<u8>> = row.get("embedding");
        let document_type: String = row.get("document_type");
        let created_at: String = row.get("created_at");

        Ok(Chunk {
            id: Uuid::parse_str(&id).map_err(|e| crate::error::RagError::Internal(e.to_string()))?,
            document_id: Uuid::parse_str(&document_id)
                .map_err(|e| crate::error::RagError::Internal(e.to_string()))?,
            index: row.get("chunk_index"),
            text: row.get("text"),
            token_count: row.get("token_count"),
            embedding: embedding_blob.map(|b| Self::deserialize_embedding(&b)),
            metadata: ChunkMetadata {
                start_char: row.get::<i64, _>("start_char") as usize,
                end_char: row.get::<i64, _>("end_char") as usize,
                section_title: row.get("section_title"),
                document_title: row.get("document_title"),
                document_type: document_type.parse().unwrap_or(DocumentType::General),
            },
            created_at: parse_rfc3339(&created_at)?,
        })
    }

    async fn insert_chunks_in_txn(
        txn: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        document_id: Uuid,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Chunk>> {
        let mut inserted = Vec::with_capacity(chunks.len());
        let now = Utc::now();

        for chunk in chunks {
            let id = Uuid::new_v4();
            let embedding_blob = Self::serialize_embedding(&chunk.embedding);

            sqlx::query(
                r#"
                INSERT INTO document_chunks (
                    id, document_id, chunk_index, text, token_count, embedding,
                    start_char, end_char, section_title, document_title,
                    document_type, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(id.to_string())
            .bind(document_id.to_string())
            .bind(chunk.index)
            .bind(&chunk.text)
            .bind(chunk.token_count)
            .bind(&embedding_blob)
            .bind(chunk.metadata.start_char as i64)
            .bind(chunk.metadata.end_char as i64)
            .bind(&chunk.metadata.section_title)
            .bind(&chunk.metadata.document_title)
            .bind(chunk.metadata.document_type.as_str())
            .bind(now.to_rfc3339())
            .execute(&mut **txn)
            .await
            .map_err(StoreError::Database)?;

            inserted.push(Chunk {
                id,
                document_id,
                index: chunk.index,
                text: chunk.text,
                token_count: chunk.token_count,
                embedding: Some(chunk.embedding),
                metadata: chunk.metadata,
                created_at: now,
            });
        }

        Ok(inserted)
    }
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::error::RagError::Internal(e.to_string()))
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, title, author, tag_id, content, page_count, word_count,
                document_type, language, extracted_tags, section_count, uploaded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(document.id.to_string())
        .bind(&document.title)
        .bind(&document.author)
        .bind(document.tag_id.map(|t| t.to_string()))
        .bind(&document.content)
        .bind(document.page_count)
        .bind(document.word_count)
        .bind(document.metadata.document_type.as_str())
        .bind(document.metadata.language.as_str())
        .bind(serde_json::to_string(&document.metadata.extracted_tags).map_err(StoreError::Serialization)?)
        .bind(document.metadata.section_count as i64)
        .bind(document.uploaded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        debug!(document_id = %document.id, "inserted document");
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut txn = self.pool.begin().await.map_err(StoreError::Database)?;

        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(id.to_string())
            .execute(&mut *txn)
            .await
            .map_err(StoreError::Database)?;

        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *txn)
            .await
            .map_err(StoreError::Database)?;

        txn.commit().await.map_err(StoreError::Database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DocumentNotFound(id).into());
        }
        Ok(())
    }

    async fn list_documents_with_stats(&self) -> Result<Vec<DocumentWithStats>> {
        let rows = sqlx::query(
            r#"
            SELECT
                d.*,
                COUNT(c.id) AS chunk_count,
                COUNT(c.embedding) AS embedded_chunk_count
            FROM documents d
            LEFT JOIN document_chunks c ON c.document_id = d.id
            GROUP BY d.id
            ORDER BY d.uploaded_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.iter()
            .map(|row| {
                Ok(DocumentWithStats {
                    document: Self::row_to_document(row)?,
                    chunk_count: row.get::<i64, _>("chunk_count") as usize,
                    embedded_chunk_count: row.get::<i64, _>("embedded_chunk_count") as usize,
                })
            })
            .collect()
    }

    async fn list_document_ids(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                Uuid::parse_str(&id).map_err(|e| crate::error::RagError::Internal(e.to_string()))
            })
            .collect()
    }

    async fn bulk_insert_chunks(
        &self,
        document_id: Uuid,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Chunk>> {
        let mut txn = self.pool.begin().await.map_err(StoreError::Database)?;
        let inserted = Self::insert_chunks_in_txn(&mut txn, document_id, chunks).await?;
        txn.commit().await.map_err(StoreError::Database)?;
        Ok(inserted)
    }

    async fn replace_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>> {
        let _guard = self.replace_lock.lock().await;

        let mut txn = self.pool.begin().await.map_err(StoreError::Database)?;

        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(document_id.to_string())
            .execute(&mut *txn)
            .await
            .map_err(StoreError::Database)?;

        let inserted = Self::insert_chunks_in_txn(&mut txn, document_id, chunks).await?;
        txn.commit().await.map_err(StoreError::Database)?;
        Ok(inserted)
    }

    async fn get_all_chunks_with_embeddings(&self, tag_id: Option<Uuid>) -> Result<Vec<Chunk>> {
        let rows = match tag_id {
            None => {
                sqlx::query("SELECT * FROM document_chunks WHERE embedding IS NOT NULL")
                    .fetch_all(&self.pool)
                    .await
            }
            Some(tag_id) => {
                sqlx::query(
                    r#"
                    SELECT c.* FROM document_chunks c
                    JOIN documents d ON d.id = c.document_id
                    WHERE c.embedding IS NOT NULL AND d.tag_id = ?1
                    "#,
                )
                .bind(tag_id.to_string())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::Database)?;

        rows.iter().map(Self::row_to_chunk).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, DocumentMetadata, Language};

    async fn test_store() -> SqliteStore {
        let config = StoreConfig {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        };
        SqliteStore::connect(&config).await.unwrap()
    }

    fn sample_document(id: Uuid) -> Document {
        Document {
            id,
            title: "Employee Handbook".to_string(),
            author: Some("People Ops".to_string()),
            tag_id: None,
            content: "Welcome to the team.".to_string(),
            page_count: 3,
            word_count: 400,
            metadata: DocumentMetadata {
                document_type: DocumentType::Handbook,
                language: Language::En,
                extracted_tags: vec!["benefits".to_string()],
                section_count: 2,
            },
            uploaded_at: Utc::now(),
        }
    }

    fn sample_chunk(index: i64, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            index,
            text: format!("chunk body {index}"),
            token_count: 10,
            embedding,
            metadata: ChunkMetadata {
                start_char: 0,
                end_char: 10,
                section_title: Some("Benefits".to_string()),
                document_title: "Employee Handbook".to_string(),
                document_type: DocumentType::Handbook,
            },
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_document_round_trips() {
        let store = test_store().await;
        let doc = sample_document(Uuid::new_v4());
        store.insert_document(&doc).await.unwrap();

        let fetched = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Employee Handbook");
        assert_eq!(fetched.metadata.document_type, DocumentType::Handbook);
        assert_eq!(fetched.metadata.extracted_tags, vec!["benefits"]);
    }

    #[tokio::test]
    async fn bulk_insert_then_replace_chunks_is_atomic() {
        let store = test_store().await;
        let doc = sample_document(Uuid::new_v4());
        store.insert_document(&doc).await.unwrap();

        let first_batch = vec![sample_chunk(0, vec![0.1, 0.2]), sample_chunk(1, vec![0.3, 0.4])];
        store.bulk_insert_chunks(doc.id, first_batch).await.unwrap();

        let second_batch = vec![sample_chunk(0, vec![0.5, 0.6])];
        let replaced = store.replace_chunks(doc.id, second_batch).await.unwrap();

        assert_eq!(replaced.len(), 1);
        let all = store.get_all_chunks_with_embeddings(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].embedding.as_ref().unwrap(), &vec![0.5, 0.6]);
    }

    #[tokio::test]
    async fn delete_document_cascades_to_chunks() {
        let store = test_store().await;
        let doc = sample_document(Uuid::new_v4());
        store.insert_document(&doc).await.unwrap();
        store
            .bulk_insert_chunks(doc.id, vec![sample_chunk(0, vec![0.1])])
            .await
            .unwrap();

        store.delete_document(doc.id).await.unwrap();

        assert!(store.get_document(doc.id).await.unwrap().is_none());
        assert!(store.get_all_chunks_with_embeddings(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_document_returns_not_found() {
        let store = test_store().await;
        let err = store.delete_document(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), "StoreError");
    }

    #[tokio::test]
    async fn list_documents_with_stats_reports_chunk_counts() {
        let store = test_store().await;
        let doc = sample_document(Uuid::new_v4());
        store.insert_document(&doc).await.unwrap();
        store
            .bulk_insert_chunks(
                doc.id,
                vec![sample_chunk(0, vec![0.1]), sample_chunk(1, vec![0.2])],
            )
            .await
            .unwrap();

        let stats = store.list_documents_with_stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].chunk_count, 2);
        assert_eq!(stats[0].embedded_chunk_count, 2);
    }
}
