//! Core data model.
//!
//! Plain serde structs, no runtime reflection; builder-style helpers where
//! they read more naturally than exposing public fields directly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single source document from the external loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub topic_id: String,
    pub content: String,
    pub value_score: f64,
}

/// Category of an extracted short answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerType {
    ProperNoun,
    Number,
    Date,
    Location,
    TechnicalTerm,
}

/// A candidate short answer proposed by the Short-Answer Extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortAnswer {
    pub text: String,
    pub answer_type: AnswerType,
    pub confidence: f64,
    pub source_span: (usize, usize),
}

/// Allowed question words (`how` is never produced).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    What,
    Which,
    Who,
    When,
    Where,
}

impl QuestionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::What => "what",
            QuestionType::Which => "which",
            QuestionType::Who => "who",
            QuestionType::When => "when",
            QuestionType::Where => "where",
        }
    }
}

/// A question node's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub text: String,
    pub expected_answer: String,
    pub question_type: QuestionType,
    pub answer_type: AnswerType,
    pub level: u32,
    pub parent_id: Option<String>,
    pub keywords: Vec<String>,
    pub validation_score: f64,
}

impl Question {
    /// Invariant checks: ends with `?`, never leaks the answer
    /// as a substring (proper-noun exceptions are recorded separately by the
    /// caller, not silently waived here).
    #[must_use]
    pub fn surface_valid(&self) -> bool {
        self.text.trim_end().ends_with('?')
            && crate::text::leaks_answer(&self.text, &self.expected_answer).is_none()
    }
}

/// A keyword extracted from a parent question/answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    pub parent_context: String,
    pub keyword_type: AnswerType,
    pub specificity_score: f64,
    pub confidence: f64,
    pub position: usize,
}

/// Search-grounded synthesis for one (keyword, extension_type) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionContext {
    pub target_keyword: String,
    pub search_query: String,
    pub snippets: Vec<crate::gateway::search::SearchResult>,
    pub synthesized_text: String,
    pub confidence: f64,
}

/// Series (deepen) vs. parallel (breadth) extension, or the root itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionType {
    Root,
    Series,
    Parallel,
}

/// Scores recorded against a node by the components that validated it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeValidationScores {
    pub hierarchy: f64,
    pub shortcut: f64,
    pub dual_model: f64,
    /// 1.0 if the minimum-keyword check found the parent's keyword set
    /// essentiality-bounded, 0.0 otherwise. Annotation only; it does not
    /// factor into the tree's confidence product.
    pub minimum_keyword: f64,
}

/// A node in the reasoning tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub node_id: String,
    pub question: Question,
    pub extension_type: ExtensionType,
    pub depth: u32,
    pub parent_node_id: Option<String>,
    pub keywords_used: Vec<String>,
    pub search_context_id: Option<String>,
    pub validation_scores: NodeValidationScores,
    pub workflow_compliant: bool,
}

/// The full reasoning tree for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningTree {
    pub tree_id: String,
    pub root_node_id: String,
    pub nodes: HashMap<String, TreeNode>,
    pub keyword_hierarchy: HashMap<u32, Vec<Keyword>>,
    pub integrated_query: Option<crate::integrator::IntegratedQuery>,
    pub creation_metadata: TreeCreationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeCreationMetadata {
    pub document_id: String,
    pub trajectory_id: String,
    pub created_at: DateTime<Utc>,
}

impl ReasoningTree {
    #[must_use]
    pub fn new(document_id: impl Into<String>, trajectory_id: impl Into<String>) -> Self {
        Self {
            tree_id: Uuid::new_v4().to_string(),
            root_node_id: String::new(),
            nodes: HashMap::new(),
            keyword_hierarchy: HashMap::new(),
            integrated_query: None,
            creation_metadata: TreeCreationMetadata {
                document_id: document_id.into(),
                trajectory_id: trajectory_id.into(),
                created_at: Utc::now(),
            },
        }
    }

    #[must_use]
    pub fn root(&self) -> Option<&TreeNode> {
        self.nodes.get(&self.root_node_id)
    }

    #[must_use]
    pub fn children_of(&self, node_id: &str) -> Vec<&TreeNode> {
        self.nodes
            .values()
            .filter(|n| n.parent_node_id.as_deref() == Some(node_id))
            .collect()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.nodes.values().map(|n| n.depth).max().unwrap_or(0)
    }
}
