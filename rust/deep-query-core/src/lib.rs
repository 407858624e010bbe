//! Tree Extension Deep Query engine.
//!
//! Builds **deep, multi-hop research question trees** from a corpus of web
//! documents: given a document, the engine proposes a factually grounded
//! root question, extracts the minimal set of keywords that pin down its
//! answer, and repeatedly extends the tree with child questions whose
//! answers are themselves parent keywords — validated at every step for
//! specificity, hierarchy membership, shortcut-freeness, and
//! non-circularity. The finished tree is collapsed into one composite
//! "deep" question that can only be answered by multi-step reasoning.
//!
//! # Architecture
//!
//! One component per module, re-exported below:
//!
//! - [`gateway::llm`] / [`gateway::search`]: the only I/O boundaries.
//! - [`extraction`]: Short-Answer Extractor.
//! - [`root_question`]: Root Question Generator.
//! - [`validation`]: Dual-Model Validator.
//! - [`keyword_hierarchy`]: Keyword Hierarchy Manager.
//! - [`search_synthesis`]: Web-Search Extension Synthesizer.
//! - [`child_question`]: Child Question Generator.
//! - [`circular`]: Circular-Question Detector.
//! - [`orchestrator`]: Tree Orchestrator, the only component that owns a
//!   [`model::ReasoningTree`] mutably.
//! - [`integrator`]: Tree-Level Integrator.
//! - [`trajectory`]: Trajectory Recorder.
//!
//! # Usage
//!
//! ```rust,ignore
//! use deep_query_core::{run_document, config::EngineConfig, model::Document};
//! use deep_query_core::gateway::{StubLlmGateway, StubSearchGateway};
//!
//! # async fn example() {
//! let llm = StubLlmGateway::new("...");
//! let search = StubSearchGateway::new();
//! let config = EngineConfig::default();
//! let document = Document {
//!     doc_id: "d1".into(),
//!     topic_id: "t1".into(),
//!     content: "...".into(),
//!     value_score: 1.0,
//! };
//!
//! let result = run_document(&document, &llm, &search, &config).await;
//! println!("tree size: {}", result.tree.size());
//! # }
//! ```

pub mod child_question;
pub mod circular;
pub mod config;
pub mod error;
pub mod extraction;
pub mod gateway;
pub mod integrator;
pub mod keyword_hierarchy;
pub mod model;
pub mod orchestrator;
pub mod root_question;
pub mod search_synthesis;
pub mod text;
pub mod trajectory;
pub mod validation;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use model::{Document, Question, ReasoningTree, ShortAnswer, TreeNode};
pub use orchestrator::{CancelSignal, NeverCancel, TreeOrchestrator};
pub use trajectory::TrajectoryRecord;

/// The engine's top-level return value for one document: the built
/// `ReasoningTree` alongside the closed-out `TrajectoryRecord` that logged
/// its construction. Kept as two separate typed values rather than
/// flattened into one struct, matching the recorder's role as sole writer
/// of its own log.
#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub tree: ReasoningTree,
    pub trajectory: TrajectoryRecord,
}

/// Runs the whole engine over a single document against real or stub
/// gateway implementations. This is the crate's single entry point — an
/// outer runner supplies the document, the two gateways, and drives many
/// of these concurrently across documents, since building one document's
/// tree is independent of any other.
pub async fn run_document(
    document: &model::Document,
    llm: &dyn gateway::llm::LlmGateway,
    search: &dyn gateway::search::SearchGateway,
    config: &EngineConfig,
) -> DocumentResult {
    run_document_cancellable(document, llm, search, config, &NeverCancel).await
}

/// Like [`run_document`] but with an explicit cooperative cancellation
/// source, checked at suspension points inside the orchestrator.
pub async fn run_document_cancellable(
    document: &model::Document,
    llm: &dyn gateway::llm::LlmGateway,
    search: &dyn gateway::search::SearchGateway,
    config: &EngineConfig,
    cancel: &dyn CancelSignal,
) -> DocumentResult {
    let orchestrator = TreeOrchestrator::new(llm, search, config);
    let (tree, trajectory) = orchestrator.process_document(document, cancel).await;
    DocumentResult { tree, trajectory }
}
