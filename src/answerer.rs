//! Grounded answer synthesis over retrieved sources (§4.8).
//!
//! The generator is instructed to cite `[SOURCE i]` and to refuse when the
//! retrieved context doesn't answer the question; this module builds that
//! prompt, validates the response carries a citation, and scores
//! confidence from the underlying relevance numbers rather than trusting
//! the model's own sense of certainty.

use crate::config::AnswererConfig;
use crate::error::{RagError, Result};
use crate::model_client::{system_message, user_message, GenerationParams, ModelClient};
use crate::retriever::Retriever;
use crate::types::{Answer, RetrievalSource};
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const EMPTY_RETRIEVAL_MESSAGE: &str = "I couldn't find any relevant information in the uploaded onboarding documents to answer your question. Please ensure the relevant materials have been uploaded in the Admin section, or try rephrasing your question.";

const SYSTEM_INSTRUCTIONS: &str = "You are an onboarding assistant. Answer using ONLY the information in the numbered source blocks below. Never use outside knowledge. Cite every claim with its source using the exact form [SOURCE i]. If the sources do not contain the answer, respond with exactly: \"This information is not available in the current onboarding materials. Please contact HR or your manager for clarification.\"";

const MISSING_CITATION_NOTE: &str = "(Note: This answer is based on the uploaded onboarding documents.)";

pub struct Answerer {
    retriever: Retriever,
    model_client: Arc<ModelClient>,
    config: AnswererConfig,
}

impl Answerer {
    pub fn new(retriever: Retriever, model_client: Arc<ModelClient>, config: AnswererConfig) -> Self {
        Self {
            retriever,
            model_client,
            config,
        }
    }

    pub async fn answer(&self, question: &str, tag_id: Option<Uuid>) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::Validation("question cannot be empty".to_string()));
        }

        let started = Instant::now();
        let sources = self.retriever.retrieve(question, tag_id).await?;

        if sources.is_empty() {
            return Ok(Answer {
                answer: EMPTY_RETRIEVAL_MESSAGE.to_string(),
                sources,
                confidence: 0.0,
                response_time_seconds: started.elapsed().as_secs_f64(),
            });
        }

        let context = build_context(&sources);
        let messages = vec![
            system_message(SYSTEM_INSTRUCTIONS),
            user_message(format!("{context}\n\nQuestion: {question}")),
        ];

        let generation = self
            .model_client
            .generate(
                messages,
                GenerationParams {
                    temperature: self.config.temperature,
                    max_output_tokens: self.config.max_output_tokens,
                },
            )
            .await
            .map_err(RagError::Model)?;

        let citation_pattern = Regex::new(r"\[SOURCE\s*\d+\]").expect("static pattern is valid");
        let has_citation = citation_pattern.is_match(&generation.text);

        let answer_text = if has_citation {
            generation.text
        } else {
            format!("{}\n\n{MISSING_CITATION_NOTE}", generation.text)
        };

        let confidence = score_confidence(&sources, has_citation);

        Ok(Answer {
            answer: answer_text,
            sources,
            confidence,
            response_time_seconds: started.elapsed().as_secs_f64(),
        })
    }
}

/// Builds the `[SOURCE i: "<title>"...]` context blocks, one per source,
/// separated by `\n\n---\n\n`.
fn build_context(sources: &[RetrievalSource]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let author_suffix = source
                .author
                .as_ref()
                .map(|a| format!(" by {a}"))
                .unwrap_or_default();
            let type_suffix = format!(" [{}]", source.document_type);
            let percent = source.relevance_score * 100.0;

            format!(
                "[SOURCE {}: \"{}\"{author_suffix}{type_suffix} - Section {} (Relevance: {:.1}%)]\n{}",
                i + 1,
                source.document_title,
                source.chunk_index + 1,
                percent,
                source.chunk_text,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// `0.5*avg + 0.5*top`, boosted 1.1x when a citation was found, clamped to
/// `[0, 1]`.
fn score_confidence(sources: &[RetrievalSource], has_citation: bool) -> f32 {
    if sources.is_empty() {
        return 0.0;
    }
    let scores: Vec<f32> = sources.iter().map(|s| s.relevance_score).collect();
    let avg = scores.iter().sum::<f32>() / scores.len() as f32;
    let top = scores.iter().cloned().fold(f32::MIN, f32::max);

    let base = 0.5 * avg + 0.5 * top;
    let boosted = if has_citation { base * 1.1 } else { base };
    boosted.clamp(0.0, 1.0)
}
