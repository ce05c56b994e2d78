//! Shared data model: documents, chunks, and the transient records produced
//! by a query (retrieval sources and answers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tag managed by the admin collaborator; read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

/// Heuristically detected document type (§4.3 step 6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Onboarding,
    Policy,
    Training,
    Handbook,
    Guide,
    Procedure,
    General,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Onboarding => "onboarding",
            DocumentType::Policy => "policy",
            DocumentType::Training => "training",
            DocumentType::Handbook => "handbook",
            DocumentType::Guide => "guide",
            DocumentType::Procedure => "procedure",
            DocumentType::General => "general",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "onboarding" => DocumentType::Onboarding,
            "policy" => DocumentType::Policy,
            "training" => DocumentType::Training,
            "handbook" => DocumentType::Handbook,
            "guide" => DocumentType::Guide,
            "procedure" => DocumentType::Procedure,
            _ => DocumentType::General,
        })
    }
}

/// Heuristically detected language (§4.3 step 5). Advisory only — never
/// used to route requests or change behavior (§9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A heading detected while scanning the extracted text (§4.3 step 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub title: Option<String>,
    pub level: u8,
    pub start_char: usize,
    pub end_char: usize,
}

/// Raw metadata recovered from the PDF plus the Extractor's heuristics,
/// before it is merged with caller-supplied title/filename (§4.6 step 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub mod_date: Option<String>,
    pub extracted_tags: Vec<String>,
    pub language: Option<Language>,
    pub document_type: Option<DocumentType>,
}

/// Full output of the Extractor for one PDF (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: i64,
    pub word_count: i64,
    pub sections: Vec<ExtractedSection>,
    pub metadata: ExtractedMetadata,
}

/// The metadata blob persisted on a Document (§3): a fixed-field product,
/// not an open extension map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_type: DocumentType,
    pub language: Language,
    pub extracted_tags: Vec<String>,
    pub section_count: usize,
}

/// A stored Document (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub tag_id: Option<Uuid>,
    pub content: String,
    pub page_count: i64,
    pub word_count: i64,
    pub metadata: DocumentMetadata,
    pub uploaded_at: DateTime<Utc>,
}

/// Denormalized metadata carried on every Chunk so retrieval never needs a
/// second round-trip to the Document table (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub start_char: usize,
    pub end_char: usize,
    pub section_title: Option<String>,
    pub document_title: String,
    pub document_type: DocumentType,
}

/// A stored Chunk (§3). Never mutated once embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub index: i64,
    pub text: String,
    pub token_count: i64,
    pub embedding: Option<Vec<f32>>,
    pub metadata: ChunkMetadata,
    pub created_at: DateTime<Utc>,
}

/// A chunk as produced by the Chunker, before it has an id or an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub index: i64,
    pub text: String,
    pub token_count: i64,
    pub start_char: usize,
    pub end_char: usize,
}

/// A chunk ready for `Store::bulk_insert_chunks`/`replace_chunks`: it has an
/// embedding (insertion only happens for chunks that embedded successfully,
/// §4.6 step 6) but not yet a row id.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub index: i64,
    pub text: String,
    pub token_count: i64,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A chunk surfaced by the Retriever for one query (§3). Transient — never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSource {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub document_title: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub relevance_score: f32,
    pub author: Option<String>,
    pub document_type: DocumentType,
}

impl RetrievalSource {
    /// First 200 chars of the chunk text plus an ellipsis (§6 query
    /// interface `excerpt`).
    pub fn excerpt(&self) -> String {
        const EXCERPT_CHARS: usize = 200;
        let truncated: String = self.chunk_text.chars().take(EXCERPT_CHARS).collect();
        if self.chunk_text.chars().count() > EXCERPT_CHARS {
            format!("{truncated}…")
        } else {
            truncated
        }
    }
}

/// The result of a query (§3, §6). Transient — owned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<RetrievalSource>,
    pub confidence: f32,
    pub response_time_seconds: f64,
}

/// Summary returned from `Ingestor::process_document`/`reprocess_document`
/// (§4.6, §6 ingestion interface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadataSummary {
    pub document_id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub page_count: i64,
    pub word_count: i64,
    pub chunk_count: usize,
    pub embedded_chunk_count: usize,
    pub metadata: DocumentMetadata,
    pub processing_seconds: f64,
    pub embedding_partial: bool,
}

/// A Document paired with its chunk counts, as returned by
/// `Store::list_documents_with_stats` (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentWithStats {
    pub document: Document,
    pub chunk_count: usize,
    pub embedded_chunk_count: usize,
}

/// Result of `Ingestor::reprocess_all_documents` (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReprocessAllReport {
    pub processed: usize,
    pub errors: Vec<(Uuid, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_round_trips_through_as_str() {
        for dt in [
            DocumentType::Onboarding,
            DocumentType::Policy,
            DocumentType::Training,
            DocumentType::Handbook,
            DocumentType::Guide,
            DocumentType::Procedure,
            DocumentType::General,
        ] {
            let parsed: DocumentType = dt.as_str().parse().unwrap();
            assert_eq!(parsed.as_str(), dt.as_str());
        }
    }

    #[test]
    fn excerpt_truncates_long_chunks_with_ellipsis() {
        let source = RetrievalSource {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            document_title: "Handbook".to_string(),
            chunk_index: 0,
            chunk_text: "a".repeat(250),
            relevance_score: 0.9,
            author: None,
            document_type: DocumentType::General,
        };
        let excerpt = source.excerpt();
        assert_eq!(excerpt.chars().count(), 201);
        assert!(excerpt.ends_with('…'));
    }

    #[test]
    fn excerpt_leaves_short_chunks_untouched() {
        let source = RetrievalSource {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            document_title: "Handbook".to_string(),
            chunk_index: 0,
            chunk_text: "short chunk".to_string(),
            relevance_score: 0.9,
            author: None,
            document_type: DocumentType::General,
        };
        assert_eq!(source.excerpt(), "short chunk");
    }
}
