//! Web-Search Extension Synthesizer.
//!
//! For a target keyword and the extension type chosen by the orchestrator,
//! forms a biased search query, calls the Search Gateway, and fuses
//! snippets into a bounded `synthesized_text` via the LLM while avoiding
//! the parent answer's literal text.

use tracing::{debug, info, warn};

use crate::gateway::llm::LlmGateway;
use crate::gateway::search::SearchGateway;
use crate::model::{ExtensionContext, ExtensionType};
use crate::text;

const SEARCH_TOP_K: usize = 5;
const SYNTHESIS_MAX_TOKENS: u32 = 220;

pub struct SearchExtensionSynthesizer<'a> {
    llm: &'a dyn LlmGateway,
    search: &'a dyn SearchGateway,
}

impl<'a> SearchExtensionSynthesizer<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmGateway, search: &'a dyn SearchGateway) -> Self {
        Self { llm, search }
    }

    /// Returns `None` if the search gateway yields zero snippets.
    pub async fn synthesize(
        &self,
        target_keyword: &str,
        parent_question: &str,
        parent_answer: &str,
        extension_type: ExtensionType,
    ) -> Option<ExtensionContext> {
        let query = form_query(target_keyword, parent_question, extension_type);

        let response = match self.search.search(&query, SEARCH_TOP_K).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, query, "search gateway call failed");
                return None;
            }
        };
        let snippets = response.results;
        if snippets.is_empty() {
            debug!(query, "search returned zero snippets, aborting extension");
            return None;
        }
        debug!(query, latency_ms = response.latency_ms, snippet_count = snippets.len(), "search gateway responded");

        let snippet_text = snippets
            .iter()
            .map(|s| format!("[{}] {}", s.title, s.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Synthesize the following search snippets about \"{target_keyword}\" into a short \
             passage that retains novel facts. Do not restate the phrase \"{parent_answer}\" \
             anywhere in your output. Respond with only the synthesized passage.\n\n{snippet_text}"
        );

        let synthesized_text = match self.llm.generate(&prompt, 0.3, SYNTHESIS_MAX_TOKENS).await {
            Ok(text) => sanitize_synthesis(&text, parent_answer),
            Err(err) => {
                warn!(error = %err, "synthesis LLM call failed");
                return None;
            }
        };

        let confidence = (snippets.len() as f64 / 5.0).min(1.0) * llm_self_report_confidence(&synthesized_text);

        info!(target_keyword, snippet_count = snippets.len(), confidence, "extension context synthesized");

        Some(ExtensionContext {
            target_keyword: target_keyword.to_string(),
            search_query: query,
            snippets,
            synthesized_text,
            confidence,
        })
    }
}

fn form_query(target_keyword: &str, parent_question: &str, extension_type: ExtensionType) -> String {
    let parent_nouns: Vec<String> = text::proper_nouns(parent_question);
    match extension_type {
        ExtensionType::Series => {
            let context = parent_nouns.first().cloned().unwrap_or_default();
            format!("{target_keyword} {context}").trim().to_string()
        }
        ExtensionType::Parallel | ExtensionType::Root => {
            format!("{target_keyword} related aspects comparison")
        }
    }
}

/// Strips any residual occurrence of the parent answer from the synthesized
/// text; the LLM is instructed not to include it, but this is a
/// deterministic backstop.
fn sanitize_synthesis(raw: &str, parent_answer: &str) -> String {
    let trimmed = raw.trim();
    if parent_answer.trim().is_empty() {
        return trimmed.to_string();
    }
    let mut sanitized = trimmed.to_string();
    while let Some((start, end)) = text::leaks_answer(&sanitized, parent_answer) {
        sanitized.replace_range(start..end, "[redacted]");
    }
    sanitized
}

/// A cheap proxy for "LLM self-report" confidence: longer, more concrete
/// synthesis text (more content words) scores higher, capped at 1.0.
fn llm_self_report_confidence(synthesized_text: &str) -> f64 {
    let word_count = text::content_words(synthesized_text).len();
    (word_count as f64 / 30.0).clamp(0.3, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::llm::StubLlmGateway;
    use crate::gateway::search::{SearchResult, StubSearchGateway};

    fn result(title: &str, content: &str) -> SearchResult {
        SearchResult {
            url: format!("https://example.com/{title}"),
            title: title.to_string(),
            content: content.to_string(),
            rank: 0,
        }
    }

    #[tokio::test]
    async fn aborts_when_no_snippets_found() {
        let llm = StubLlmGateway::new("synthesis");
        let search = StubSearchGateway::new();
        let synthesizer = SearchExtensionSynthesizer::new(&llm, &search);
        let context = synthesizer
            .synthesize("Hubble", "Which telescope succeeded Hubble?", "James Webb", ExtensionType::Series)
            .await;
        assert!(context.is_none());
    }

    #[tokio::test]
    async fn synthesizes_when_snippets_present() {
        let llm = StubLlmGateway::new("Hubble observed distant galaxies for three decades before retirement.");
        let search = StubSearchGateway::new().with_results(
            "Hubble",
            vec![result("Hubble history", "Hubble launched in 1990 and observed deep space.")],
        );
        let synthesizer = SearchExtensionSynthesizer::new(&llm, &search);
        let context = synthesizer
            .synthesize("Hubble", "Which telescope succeeded Hubble?", "James Webb", ExtensionType::Series)
            .await;
        assert!(context.is_some());
        let context = context.unwrap();
        assert!(!context.synthesized_text.contains("James Webb"));
        assert!(context.confidence > 0.0);
    }

    #[test]
    fn form_query_biases_by_extension_type() {
        let series = form_query("Hubble", "Which telescope succeeded Hubble?", ExtensionType::Series);
        let parallel = form_query("Hubble", "Which telescope succeeded Hubble?", ExtensionType::Parallel);
        assert!(series.contains("Hubble"));
        assert!(parallel.contains("related aspects comparison"));
    }

    #[test]
    fn sanitize_synthesis_redacts_residual_answer() {
        let sanitized = sanitize_synthesis("James Webb Space Telescope replaced it.", "James Webb Space Telescope");
        assert!(!sanitized.contains("James Webb Space Telescope"));
    }
}
