//! Engine configuration.
//!
//! This is a plain, library-owned struct: loading it from a file or the
//! environment is the embedding runner's job. `EngineConfig::default()`
//! carries the engine's documented defaults; builder-style `with_*` methods
//! return `Self` so configuration can be chained fluently.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Integration strategy used by the Tree-Level Integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationStrategy {
    HierarchicalFusion,
    KeywordReplacement,
}

impl Default for IntegrationStrategy {
    fn default() -> Self {
        IntegrationStrategy::HierarchicalFusion
    }
}

/// Allowed leading question words (`how` is always excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionWord {
    What,
    Which,
    Who,
    When,
    Where,
}

impl QuestionWord {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionWord::What => "what",
            QuestionWord::Which => "which",
            QuestionWord::Who => "who",
            QuestionWord::When => "when",
            QuestionWord::Where => "where",
        }
    }

    #[must_use]
    pub fn all() -> [QuestionWord; 5] {
        [
            QuestionWord::What,
            QuestionWord::Which,
            QuestionWord::Who,
            QuestionWord::When,
            QuestionWord::Where,
        ]
    }

    /// Parse the leading word of a question, case-insensitively.
    #[must_use]
    pub fn leading_word(text: &str) -> Option<QuestionWord> {
        let first = text.split_whitespace().next()?.to_lowercase();
        QuestionWord::all()
            .into_iter()
            .find(|w| w.as_str() == first)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum tree depth.
    pub depth_max: usize,
    /// Maximum parallel branches per parent.
    pub branch_max: usize,
    /// Retries for a single node before it is skipped.
    pub retries_per_node: usize,
    /// Hard budget on LLM calls per document.
    pub llm_calls_per_doc: u32,
    /// Hard budget on search calls per document.
    pub search_calls_per_doc: u32,
    /// Minimum validity sub-score to pass.
    pub validity_threshold: f64,
    /// Minimum uniqueness sub-score to pass.
    pub uniqueness_threshold: f64,
    /// Minimum overall score to pass.
    pub overall_threshold: f64,
    /// Allowed leading question words (`how` always excluded).
    pub question_types_allowed: HashSet<&'static str>,
    /// Strategy used by the Tree-Level Integrator.
    pub integration_strategy: IntegrationStrategy,
    /// Minimum accepted answer length.
    pub min_answer_len: usize,
    /// Maximum accepted answer length.
    pub max_answer_len: usize,
    /// Minimum document length (chars) the Short-Answer Extractor will consider.
    pub min_document_length: usize,
    /// Maximum document length (chars); longer documents are truncated before extraction.
    pub max_document_length: usize,
    /// Per-gateway-call timeout.
    pub search_timeout_secs: u64,
    /// Per-document wall-clock cap.
    pub per_document_wall_clock_secs: u64,
    /// Hard cap on search calls per document, independent of `search_calls_per_doc`
    /// bookkeeping — the smaller of the two always wins.
    pub search_calls_per_doc_hard_cap: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            depth_max: 3,
            branch_max: 2,
            retries_per_node: 2,
            llm_calls_per_doc: 60,
            search_calls_per_doc: 10,
            validity_threshold: 0.6,
            uniqueness_threshold: 0.6,
            overall_threshold: 0.65,
            question_types_allowed: ["what", "which", "who", "when", "where"]
                .into_iter()
                .collect(),
            integration_strategy: IntegrationStrategy::default(),
            min_answer_len: 2,
            max_answer_len: 50,
            min_document_length: 200,
            max_document_length: 10_000,
            search_timeout_secs: 30,
            per_document_wall_clock_secs: 300,
            search_calls_per_doc_hard_cap: 10,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_depth_max(mut self, depth_max: usize) -> Self {
        self.depth_max = depth_max;
        self
    }

    #[must_use]
    pub fn with_branch_max(mut self, branch_max: usize) -> Self {
        self.branch_max = branch_max;
        self
    }

    #[must_use]
    pub fn with_llm_calls_per_doc(mut self, calls: u32) -> Self {
        self.llm_calls_per_doc = calls;
        self
    }

    #[must_use]
    pub fn with_search_calls_per_doc(mut self, calls: u32) -> Self {
        self.search_calls_per_doc = calls;
        self.search_calls_per_doc_hard_cap = calls;
        self
    }

    #[must_use]
    pub fn with_integration_strategy(mut self, strategy: IntegrationStrategy) -> Self {
        self.integration_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_answer_len_bounds(mut self, min_answer_len: usize, max_answer_len: usize) -> Self {
        self.min_answer_len = min_answer_len;
        self.max_answer_len = max_answer_len;
        self
    }

    /// Basic sanity checks; callers loading config from an external source
    /// should call this before handing it to the orchestrator.
    pub fn validate(&self) -> Result<(), String> {
        if self.depth_max == 0 {
            return Err("depth_max must be >= 1".to_string());
        }
        if self.branch_max == 0 {
            return Err("branch_max must be >= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.validity_threshold)
            || !(0.0..=1.0).contains(&self.uniqueness_threshold)
            || !(0.0..=1.0).contains(&self.overall_threshold)
        {
            return Err("thresholds must be within [0, 1]".to_string());
        }
        if self.min_answer_len > self.max_answer_len {
            return Err("min_answer_len must be <= max_answer_len".to_string());
        }
        Ok(())
    }
}
