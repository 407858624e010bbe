//! Short-Answer Extractor.
//!
//! Proposes up to 3 [`ShortAnswer`]s from a document, in priority order:
//! proper nouns, specific numbers, dates, locations, technical terms.
//! Grounded on `keyword_hierarchy_manager.py`'s regex-fallback extraction
//! style and the original `config.py`'s document length screening.

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::gateway::llm::LlmGateway;
use crate::model::{AnswerType, Document, ShortAnswer};
use crate::text;

const MAX_ANSWERS: usize = 3;

/// Extracts candidate short answers from a document, asking the LLM first
/// and falling back to the deterministic regex path if the response is
/// unusable. Never returns more than 3 answers, never panics.
pub struct ShortAnswerExtractor<'a> {
    llm: &'a dyn LlmGateway,
}

impl<'a> ShortAnswerExtractor<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmGateway) -> Self {
        Self { llm }
    }

    /// Returns `[]` on any disqualifying condition rather than failing the
    /// caller; it fails gracefully instead.
    pub async fn extract(&self, document: &Document, config: &EngineConfig) -> Vec<ShortAnswer> {
        if document.content.chars().count() < config.min_document_length {
            debug!(doc_id = %document.doc_id, "document below min_document_length, skipping extraction");
            return Vec::new();
        }
        let content: String = if document.content.chars().count() > config.max_document_length {
            document.content.chars().take(config.max_document_length).collect()
        } else {
            document.content.clone()
        };

        let prompt = format!(
            "Extract up to {MAX_ANSWERS} short, objectively verifiable answers from the \
             following text. Prefer proper nouns, then specific numbers, then dates, then \
             locations, then technical terms. Each answer must appear verbatim in the text. \
             Respond as a JSON array of objects with fields \"text\" and \"type\" (one of \
             \"proper_noun\", \"number\", \"date\", \"location\", \"technical_term\").\n\nText:\n{content}"
        );

        let candidates = match self.llm.generate(&prompt, 0.0, 256).await {
            Ok(raw) => match parse_llm_answers(&raw, &content) {
                Some(answers) if !answers.is_empty() => answers,
                _ => {
                    warn!(doc_id = %document.doc_id, "LLM short-answer response unusable, falling back to regex extraction");
                    regex_fallback(&content)
                }
            },
            Err(err) => {
                warn!(doc_id = %document.doc_id, error = %err, "LLM short-answer extraction failed, falling back to regex extraction");
                regex_fallback(&content)
            }
        };

        let filtered = filter_candidates(candidates, &content, config);
        info!(doc_id = %document.doc_id, count = filtered.len(), "short answers extracted");
        filtered
    }
}

#[derive(serde::Deserialize)]
struct RawShortAnswer {
    text: String,
    #[serde(rename = "type")]
    answer_type: String,
}

fn parse_llm_answers(raw: &str, content: &str) -> Option<Vec<ShortAnswer>> {
    let json_slice = extract_json_array(raw)?;
    let parsed: Vec<RawShortAnswer> = serde_json::from_str(json_slice).ok()?;
    Some(
        parsed
            .into_iter()
            .filter_map(|r| {
                let answer_type = parse_answer_type(&r.answer_type)?;
                let span = content.find(&r.text).map(|start| (start, start + r.text.len()))?;
                Some(ShortAnswer {
                    text: r.text,
                    answer_type,
                    confidence: 0.8,
                    source_span: span,
                })
            })
            .collect(),
    )
}

fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

fn parse_answer_type(s: &str) -> Option<AnswerType> {
    match s {
        "proper_noun" => Some(AnswerType::ProperNoun),
        "number" => Some(AnswerType::Number),
        "date" => Some(AnswerType::Date),
        "location" => Some(AnswerType::Location),
        "technical_term" => Some(AnswerType::TechnicalTerm),
        _ => None,
    }
}

/// Deterministic regex-driven fallback, in priority order.
fn regex_fallback(content: &str) -> Vec<ShortAnswer> {
    let mut answers = Vec::new();

    for noun in text::proper_nouns(content) {
        push_candidate(&mut answers, content, noun, AnswerType::ProperNoun, 0.6);
    }
    for year in text::years(content) {
        push_candidate(&mut answers, content, year, AnswerType::Date, 0.5);
    }
    for number in text::numbers(content) {
        push_candidate(&mut answers, content, number, AnswerType::Number, 0.5);
    }
    for term in text::technical_terms(content) {
        push_candidate(&mut answers, content, term, AnswerType::TechnicalTerm, 0.4);
    }

    answers
}

fn push_candidate(
    answers: &mut Vec<ShortAnswer>,
    content: &str,
    text_value: String,
    answer_type: AnswerType,
    confidence: f64,
) {
    if let Some(start) = content.find(&text_value) {
        answers.push(ShortAnswer {
            source_span: (start, start + text_value.len()),
            text: text_value,
            answer_type,
            confidence,
        });
    }
}

/// Rejects subjective phrases, out-of-bounds-length fragments, items absent
/// from the source, and generic words; caps the result at [`MAX_ANSWERS`].
fn filter_candidates(candidates: Vec<ShortAnswer>, content: &str, config: &EngineConfig) -> Vec<ShortAnswer> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for candidate in candidates {
        let trimmed = candidate.text.trim();
        let len = trimmed.chars().count();
        if len < config.min_answer_len || len > config.max_answer_len {
            continue;
        }
        if !content.contains(trimmed) {
            continue;
        }
        if text::is_generic_word(trimmed) {
            continue;
        }
        if is_subjective(trimmed) {
            continue;
        }
        let key = trimmed.to_lowercase();
        if !seen.insert(key) {
            continue;
        }
        out.push(candidate);
        if out.len() >= MAX_ANSWERS {
            break;
        }
    }
    out
}

fn is_subjective(text: &str) -> bool {
    const SUBJECTIVE_MARKERS: &[&str] = &["best", "worst", "greatest", "most", "least", "favorite"];
    let lower = text.to_lowercase();
    SUBJECTIVE_MARKERS.iter().any(|m| lower.contains(m))
}
