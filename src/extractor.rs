//! PDF ingestion: text, metadata and heading extraction (§4.3).
//!
//! Text comes from `pdf-extract`; document-level metadata (title, author,
//! creation date, ...) comes from the trailer's Info dictionary via `lopdf`,
//! since `pdf-extract` only surfaces page text. Everything past that —
//! language, document type, tag, and section detection — is a heuristic
//! over the normalized text, never a second pass over the PDF object graph.

use crate::error::RagError;
use crate::types::{DocumentType, ExtractedDocument, ExtractedMetadata, ExtractedSection, Language};
use regex::Regex;

const ENGLISH_STOPWORDS: &[&str] = &["the", "and", "is", "in", "to", "of", "a", "for"];

pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract text, metadata and section headings from a PDF's raw bytes.
    pub fn extract(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> Result<ExtractedDocument, RagError> {
        let raw_text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| RagError::ExtractFailed(format!("could not extract PDF text: {e}")))?;
        let text = normalize_text(&raw_text);
        if text.is_empty() {
            return Err(RagError::ExtractFailed(
                "PDF contained no extractable text".to_string(),
            ));
        }

        let pdf_doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| RagError::ExtractFailed(format!("could not parse PDF structure: {e}")))?;
        let page_count = pdf_doc.get_pages().len() as i64;
        let info = read_info_dict(&pdf_doc);

        let word_count = text.split_whitespace().count() as i64;
        let sections = detect_sections(&text);
        let extracted_tags = extract_tags(&info);
        let language = detect_language(&text);
        let document_type = detect_document_type(info.title.as_deref(), &text);

        let title = info
            .title
            .clone()
            .or_else(|| filename.map(title_from_filename));

        Ok(ExtractedDocument {
            text,
            page_count,
            word_count,
            sections,
            metadata: ExtractedMetadata {
                title,
                author: info.author,
                subject: info.subject,
                keywords: info.keywords,
                creator: info.creator,
                producer: info.producer,
                creation_date: info.creation_date,
                mod_date: info.mod_date,
                extracted_tags,
                language: Some(language),
                document_type: Some(document_type),
            },
        })
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct InfoDict {
    title: Option<String>,
    author: Option<String>,
    subject: Option<String>,
    keywords: Option<String>,
    creator: Option<String>,
    producer: Option<String>,
    creation_date: Option<String>,
    mod_date: Option<String>,
}

/// Reads the trailer's `/Info` dictionary. Absent or malformed metadata is
/// not an extraction failure — only the text matters for that.
fn read_info_dict(doc: &lopdf::Document) -> InfoDict {
    let dict = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| obj.as_reference().ok())
        .and_then(|id| doc.get_object(id).ok())
        .and_then(|obj| obj.as_dict().ok());

    let Some(dict) = dict else {
        return InfoDict::default();
    };

    InfoDict {
        title: pdf_string(dict.get(b"Title").ok()),
        author: pdf_string(dict.get(b"Author").ok()),
        subject: pdf_string(dict.get(b"Subject").ok()),
        keywords: pdf_string(dict.get(b"Keywords").ok()),
        creator: pdf_string(dict.get(b"Creator").ok()),
        producer: pdf_string(dict.get(b"Producer").ok()),
        creation_date: pdf_string(dict.get(b"CreationDate").ok()),
        mod_date: pdf_string(dict.get(b"ModDate").ok()),
    }
}

fn pdf_string(obj: Option<&lopdf::Object>) -> Option<String> {
    match obj {
        Some(lopdf::Object::String(bytes, _)) => {
            let decoded = String::from_utf8_lossy(bytes).trim().to_string();
            if decoded.is_empty() {
                None
            } else {
                Some(decoded)
            }
        }
        _ => None,
    }
}

/// Collapses CRLF, blank-line runs and in-line whitespace runs, strips NUL
/// bytes, and trims the result.
fn normalize_text(raw: &str) -> String {
    let without_nul = raw.replace('\u{0}', "");
    let unix_newlines = without_nul.replace("\r\n", "\n").replace('\r', "\n");

    let blank_run = Regex::new(r"\n{3,}").expect("static pattern is valid");
    let collapsed_blank = blank_run.replace_all(&unix_newlines, "\n\n");

    let whitespace_run = Regex::new(r"[ \t]{2,}").expect("static pattern is valid");
    let collapsed_whitespace = whitespace_run.replace_all(&collapsed_blank, " ");

    collapsed_whitespace.trim().to_string()
}

/// Splits `Keywords` on `,`/`;`/`|`, then appends `Subject` whole (not
/// further split): a comma-separated keyword list and a free-text subject
/// line are different shapes of metadata.
fn extract_tags(info: &InfoDict) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(keywords) = info.keywords.as_deref() {
        for part in keywords.split([',', ';', '|']) {
            let trimmed = part.trim();
            if !trimmed.is_empty() {
                tags.push(trimmed.to_string());
            }
        }
    }
    if let Some(subject) = info.subject.as_deref() {
        let trimmed = subject.trim();
        if !trimmed.is_empty() {
            tags.push(trimmed.to_string());
        }
    }
    tags
}

/// Inspects the first 1000 characters only; `en` requires at least 4 of the
/// 8 stopwords to appear as whole words somewhere in that prefix.
fn detect_language(text: &str) -> Language {
    let prefix: String = text.chars().take(1000).collect::<String>().to_lowercase();
    let padded = format!(" {padded} ", padded = prefix.replace('\n', " "));

    let hits = ENGLISH_STOPWORDS
        .iter()
        .filter(|word| padded.contains(&format!(" {word} ")))
        .count();

    if hits >= 4 {
        Language::En
    } else {
        Language::Unknown
    }
}

/// Priority-ordered substring search over the title and the first 2000
/// characters of the text; first matching rule wins.
fn detect_document_type(title: Option<&str>, text: &str) -> DocumentType {
    const RULES: &[(DocumentType, &[&str])] = &[
        (DocumentType::Onboarding, &["onboarding"]),
        (DocumentType::Policy, &["policy", "policies"]),
        (DocumentType::Training, &["training", "tutorial"]),
        (DocumentType::Handbook, &["handbook", "manual"]),
        (DocumentType::Guide, &["guide"]),
        (DocumentType::Procedure, &["procedure", "process"]),
    ];

    let prefix: String = text.chars().take(2000).collect::<String>().to_lowercase();
    let haystack = format!("{} {}", title.unwrap_or_default().to_lowercase(), prefix);

    for (doc_type, needles) in RULES {
        if needles.iter().any(|needle| haystack.contains(needle)) {
            return *doc_type;
        }
    }
    DocumentType::General
}

fn title_from_filename(filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _ext)| stem)
        .unwrap_or(filename);
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Heading detection over plain extracted text: a line is a heading when it
/// is a short all-caps line, a numbered heading (`2.1 Title`), or a short
/// capitalized line with no sentence-ending punctuation. A heading found
/// while the current section is still empty replaces it rather than
/// closing it, so consecutive headings with nothing between them collapse
/// into the last one.
fn detect_sections(text: &str) -> Vec<ExtractedSection> {
    let numbered = Regex::new(r"^\d+(?:\.\d+)*[.)]?\s+[A-Z]").expect("static pattern is valid");
    let numeric_prefix = Regex::new(r"^\d+(?:\.\d+)*").expect("static pattern is valid");
    let bare_sentence = Regex::new(r"^[A-Z][^.!?]*$").expect("static pattern is valid");

    let is_all_caps = |content: &str| -> bool {
        content.len() < 100
            && content == content.to_uppercase()
            && content.chars().any(|c| c.is_alphabetic())
    };

    let is_heading = |content: &str| -> bool {
        if content.is_empty() {
            return false;
        }
        let token_count = content.split_whitespace().count();
        let all_caps = is_all_caps(content) && token_count <= 10;
        let is_numbered = numbered.is_match(content);
        let is_bare_sentence = content.len() < 80 && bare_sentence.is_match(content);
        all_caps || is_numbered || is_bare_sentence
    };

    let heading_level = |content: &str| -> u8 {
        if let Some(m) = numeric_prefix.find(content) {
            return (m.as_str().matches('.').count() as u8 + 1).min(3);
        }
        if is_all_caps(content) {
            1
        } else {
            2
        }
    };

    let mut sections = Vec::new();
    let mut current: Option<(String, u8, usize)> = None;
    let mut current_has_content = false;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let content = line.trim_end_matches('\n').trim();

        if content.is_empty() {
            continue;
        }

        if is_heading(content) {
            if let Some((title, level, start_char)) = current.take() {
                if current_has_content {
                    sections.push(ExtractedSection {
                        title: Some(title),
                        level,
                        start_char,
                        end_char: line_start,
                    });
                }
            }
            current = Some((content.to_string(), heading_level(content), line_start));
            current_has_content = false;
        } else if current.is_some() {
            current_has_content = true;
        }
    }

    if let Some((title, level, start_char)) = current {
        if current_has_content {
            sections.push(ExtractedSection {
                title: Some(title),
                level,
                start_char,
                end_char: text.len(),
            });
        }
    }

    sections
}
