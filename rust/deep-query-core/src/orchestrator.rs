//! Tree Orchestrator.
//!
//! Drives the per-document state machine INIT -> EXTRACTING_ANSWERS ->
//! BUILDING_ROOT -> EXTRACTING_KEYWORDS -> EXPANDING -> FINALIZING -> DONE,
//! owning the [`ReasoningTree`] exclusively while every other component
//! receives read-only views and returns new values.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::child_question::ChildQuestionGenerator;
use crate::circular::{CircularQuestionDetector, HistoryEntry};
use crate::config::EngineConfig;
use crate::gateway::llm::LlmGateway;
use crate::gateway::search::SearchGateway;
use crate::integrator::TreeLevelIntegrator;
use crate::keyword_hierarchy::KeywordHierarchyManager;
use crate::model::{
    Document, ExtensionType, Keyword, NodeValidationScores, Question, ReasoningTree, TreeNode,
};
use crate::root_question::RootQuestionGenerator;
use crate::search_synthesis::SearchExtensionSynthesizer;
use crate::trajectory::{StepType, TrajectoryRecorder};
use crate::validation::DualModelValidator;

/// A cooperative cancel signal checked before every suspension point.
/// A plain `Fn`-like trait rather than a channel keeps the orchestrator
/// free of a particular async runtime's cancellation primitive.
pub trait CancelSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// A cancel signal that never fires, for callers with no cancellation need.
#[derive(Debug, Default)]
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Stateless; safe to share across documents processed concurrently by an
/// outer runner.
pub struct TreeOrchestrator<'a> {
    llm: &'a dyn LlmGateway,
    search: &'a dyn SearchGateway,
    config: &'a EngineConfig,
}

/// Internal per-document state; not shared across documents.
struct BuildState<'a> {
    tree: ReasoningTree,
    trajectory: TrajectoryRecorder,
    detector: CircularQuestionDetector,
    cancel: &'a dyn CancelSignal,
    started: Instant,
}

impl<'a> TreeOrchestrator<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmGateway, search: &'a dyn SearchGateway, config: &'a EngineConfig) -> Self {
        Self { llm, search, config }
    }

    /// Builds a complete (possibly empty) [`ReasoningTree`] for `document`,
    /// using `cancel` as the cooperative cancellation source. Returns the
    /// tree alongside its closed trajectory (the exporter-facing
    /// `trajectory_id`/`stats` fields live on the latter).
    pub async fn process_document(
        &self,
        document: &Document,
        cancel: &dyn CancelSignal,
    ) -> (ReasoningTree, crate::trajectory::TrajectoryRecord) {
        let trajectory = TrajectoryRecorder::start(document.doc_id.clone());
        let tree = ReasoningTree::new(document.doc_id.clone(), trajectory.trajectory_id().to_string());

        let mut state = BuildState {
            tree,
            trajectory,
            detector: CircularQuestionDetector::new(),
            cancel,
            started: Instant::now(),
        };

        info!(doc_id = %document.doc_id, "orchestrator: INIT -> EXTRACTING_ANSWERS");
        self.run(document, &mut state).await;

        let depth = state.tree.max_depth();
        let size = state.tree.size();
        let BuildState { tree, trajectory, .. } = state;
        let record = trajectory.finalize(depth, size);
        (tree, record)
    }

    async fn run(&self, document: &Document, state: &mut BuildState<'_>) {
        let extractor = crate::extraction::ShortAnswerExtractor::new(self.llm);
        let started = Instant::now();
        let short_answers = extractor.extract(document, self.config).await;
        state.trajectory.record(
            "extract_short_answers",
            StepType::Extraction,
            !short_answers.is_empty(),
            started,
            HashMap::new(),
            HashMap::new(),
        );

        if short_answers.is_empty() {
            debug!(doc_id = %document.doc_id, "EXTRACTING_ANSWERS -> DONE(empty)");
            return;
        }
        info!(doc_id = %document.doc_id, count = short_answers.len(), "EXTRACTING_ANSWERS -> BUILDING_ROOT");

        let root_generator = RootQuestionGenerator::new(self.llm);
        let validator = DualModelValidator::new(self.llm);

        let mut root_question: Option<Question> = None;
        for answer in &short_answers {
            if self.budget_exhausted(state) || state.cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let Some(candidate) = root_generator.generate(document, answer).await else {
                state.trajectory.record("generate_root_candidate", StepType::Generation, false, started, HashMap::new(), HashMap::new());
                continue;
            };
            let validation_started = Instant::now();
            let result = validator
                .validate(&candidate.text, &candidate.expected_answer, candidate.answer_type, &document.content, self.config)
                .await;
            let mut scores = HashMap::new();
            scores.insert("overall".to_string(), result.overall);
            scores.insert("specificity".to_string(), result.specificity);
            state.trajectory.record("validate_root_candidate", StepType::Validation, result.passed, validation_started, scores, HashMap::new());

            if result.passed {
                let mut question = candidate;
                question.validation_score = result.overall;
                root_question = Some(question);
                break;
            }
        }

        let Some(root_question) = root_question else {
            debug!(doc_id = %document.doc_id, "BUILDING_ROOT exhausted candidates -> DONE(empty)");
            return;
        };
        info!(doc_id = %document.doc_id, "BUILDING_ROOT -> EXTRACTING_KEYWORDS");

        let root_node_id = Uuid::new_v4().to_string();
        state.detector.record(HistoryEntry {
            question_text: root_question.text.clone(),
            answer: root_question.expected_answer.clone(),
            question_type: root_question.question_type,
            answer_type: root_question.answer_type,
            keyword: root_question.expected_answer.clone(),
        });

        let keyword_manager = KeywordHierarchyManager::new(self.llm);
        let keyword_started = Instant::now();
        let keywords = keyword_manager
            .extract(&root_question.text, &root_question.expected_answer, Some(&document.content))
            .await;
        state.trajectory.record(
            "extract_root_keywords",
            StepType::Extraction,
            !keywords.is_empty(),
            keyword_started,
            HashMap::new(),
            HashMap::new(),
        );

        let root_keywords_used: Vec<String> = keywords.iter().map(|k| k.text.clone()).collect();
        state.tree.root_node_id = root_node_id.clone();
        state.tree.nodes.insert(
            root_node_id.clone(),
            TreeNode {
                node_id: root_node_id.clone(),
                question: root_question,
                extension_type: ExtensionType::Root,
                depth: 0,
                parent_node_id: None,
                keywords_used: root_keywords_used,
                search_context_id: None,
                validation_scores: NodeValidationScores { hierarchy: 1.0, shortcut: 1.0, dual_model: 1.0, minimum_keyword: 1.0 },
                workflow_compliant: true,
            },
        );
        state.tree.keyword_hierarchy.insert(1, keywords.clone());

        if keywords.is_empty() {
            info!(doc_id = %document.doc_id, "EXTRACTING_KEYWORDS -> FINALIZING (no keywords)");
            self.finalize(state).await;
            return;
        }
        info!(doc_id = %document.doc_id, "EXTRACTING_KEYWORDS -> EXPANDING");

        self.expand(document, &root_node_id, keywords, state).await;
        self.finalize(state).await;
    }

    /// EXPANDING: recursively attempts series/parallel extensions until the
    /// depth/branch budget or call budget is exhausted.
    async fn expand(&self, document: &Document, parent_node_id: &str, parent_keywords: Vec<Keyword>, state: &mut BuildState<'_>) {
        let parent_depth = state.tree.nodes.get(parent_node_id).map(|n| n.depth).unwrap_or(0);
        if parent_depth as usize >= self.config.depth_max {
            return;
        }

        let mut branch_count = 0usize;
        let mut keyword_index = 0usize;

        while branch_count < self.config.branch_max {
            if self.budget_exhausted(state) || state.cancel.is_cancelled() || self.wall_clock_exceeded(state) {
                info!(doc_id = %document.doc_id, "EXPANDING -> FINALIZING (budget/cancel/timeout)");
                return;
            }
            let Some(keyword) = parent_keywords.get(keyword_index) else {
                break;
            };
            keyword_index += 1;

            let extension_type = self.choose_extension_type(state, parent_node_id, parent_depth);
            let built = self
                .attempt_extension(document, parent_node_id, &parent_keywords, keyword, extension_type, state)
                .await;

            match built {
                Some(child_node_id) => {
                    branch_count += 1;
                    let child_keywords = state
                        .tree
                        .nodes
                        .get(&child_node_id)
                        .map(|n| n.keywords_used.clone())
                        .unwrap_or_default();
                    if !child_keywords.is_empty() {
                        let keyword_manager = KeywordHierarchyManager::new(self.llm);
                        let child_question_text = state.tree.nodes[&child_node_id].question.text.clone();
                        let extracted = keyword_manager
                            .extract(&child_question_text, &state.tree.nodes[&child_node_id].question.expected_answer, None)
                            .await;
                        if !extracted.is_empty() {
                            Box::pin(self.expand(document, &child_node_id, extracted, state)).await;
                        }
                    }
                }
                None => {
                    debug!(doc_id = %document.doc_id, keyword = keyword.text, "extension attempt exhausted retries");
                }
            }
        }
    }

    async fn attempt_extension(
        &self,
        document: &Document,
        parent_node_id: &str,
        parent_keywords: &[Keyword],
        keyword: &Keyword,
        extension_type: ExtensionType,
        state: &mut BuildState<'_>,
    ) -> Option<String> {
        for attempt in 0..=self.config.retries_per_node {
            if self.budget_exhausted(state) {
                return None;
            }
            let parent = state.tree.nodes.get(parent_node_id)?.clone();

            let synthesizer = SearchExtensionSynthesizer::new(self.llm, self.search);
            let search_started = Instant::now();
            let Some(context) = synthesizer
                .synthesize(&keyword.text, &parent.question.text, &parent.question.expected_answer, extension_type)
                .await
            else {
                state.trajectory.record("synthesize_extension", StepType::Search, false, search_started, HashMap::new(), HashMap::new());
                continue;
            };
            state.trajectory.record("synthesize_extension", StepType::Search, true, search_started, HashMap::new(), HashMap::new());

            let generator = ChildQuestionGenerator::new(self.llm);
            let gen_started = Instant::now();
            let Some(candidate) = generator
                .generate(&parent.question, &keyword.text, keyword.keyword_type, &context, extension_type)
                .await
            else {
                state.trajectory.record("generate_child_question", StepType::Generation, false, gen_started, HashMap::new(), HashMap::new());
                continue;
            };
            state.trajectory.record("generate_child_question", StepType::Generation, true, gen_started, HashMap::new(), HashMap::new());

            let circular = state.detector.check(
                &candidate.text,
                &candidate.expected_answer,
                candidate.question_type,
                candidate.answer_type,
                &keyword.text,
            );
            if circular.is_circular {
                warn!(attempt, reason = ?circular.reason, "child question rejected as circular");
                continue;
            }

            let ancestor_answers = ancestor_answers(&state.tree, parent_node_id);
            let sibling_answers = sibling_answers(&state.tree, parent_node_id);
            let shortcut = KeywordHierarchyManager::check_shortcut(&candidate.text, &ancestor_answers, &sibling_answers);
            if !shortcut.passed {
                warn!(attempt, confidence = shortcut.confidence, "child question rejected by shortcut prevention");
                continue;
            }

            let hierarchy = KeywordHierarchyManager::validate_child_answer(&candidate.expected_answer, &[keyword.clone()]);
            if !hierarchy.accepted {
                warn!(attempt, "child answer rejected by hierarchy validation");
                continue;
            }

            let min_keyword = KeywordHierarchyManager::minimum_keyword_check(parent_keywords, &parent.question.expected_answer);
            if !min_keyword.passed {
                debug!(attempt, essential = ?min_keyword.essential, "parent keyword set failed minimum-keyword essentiality check");
            }

            let validator = DualModelValidator::new(self.llm);
            let validation_started = Instant::now();
            let result = validator
                .validate(&candidate.text, &candidate.expected_answer, candidate.answer_type, &document.content, self.config)
                .await;
            state.trajectory.record(
                "validate_child_question",
                StepType::Validation,
                result.passed,
                validation_started,
                HashMap::from([("overall".to_string(), result.overall)]),
                HashMap::new(),
            );
            if !result.passed {
                continue;
            }

            state.detector.record(HistoryEntry {
                question_text: candidate.text.clone(),
                answer: candidate.expected_answer.clone(),
                question_type: candidate.question_type,
                answer_type: candidate.answer_type,
                keyword: keyword.text.clone(),
            });

            let node_id = Uuid::new_v4().to_string();
            let mut question = candidate;
            question.validation_score = result.overall;
            state.tree.nodes.insert(
                node_id.clone(),
                TreeNode {
                    node_id: node_id.clone(),
                    question,
                    extension_type,
                    depth: parent.depth + 1,
                    parent_node_id: Some(parent_node_id.to_string()),
                    keywords_used: vec![keyword.text.clone()],
                    search_context_id: Some(Uuid::new_v4().to_string()),
                    validation_scores: NodeValidationScores {
                        hierarchy: hierarchy.confidence,
                        shortcut: shortcut.confidence,
                        dual_model: result.overall,
                        minimum_keyword: if min_keyword.passed { 1.0 } else { 0.0 },
                    },
                    workflow_compliant: true,
                },
            );
            return Some(node_id);
        }
        None
    }

    /// Extension-type choice (deterministic rule).
    fn choose_extension_type(&self, state: &BuildState<'_>, parent_node_id: &str, parent_depth: u32) -> ExtensionType {
        let parallel_siblings = state
            .tree
            .children_of(parent_node_id)
            .iter()
            .filter(|n| n.extension_type == ExtensionType::Parallel)
            .count();
        if parallel_siblings > 1 {
            return ExtensionType::Series;
        }
        if parent_depth % 2 == 1 {
            ExtensionType::Parallel
        } else {
            ExtensionType::Series
        }
    }

    async fn finalize(&self, state: &mut BuildState<'_>) {
        info!("FINALIZING -> invoking integrator");
        let integrator = TreeLevelIntegrator::new(self.llm);
        let integrated = integrator.integrate(&state.tree, self.config).await;
        let started = Instant::now();
        state.trajectory.record(
            "integrate_tree",
            StepType::Integration,
            integrated.is_some(),
            started,
            HashMap::new(),
            HashMap::new(),
        );
        state.tree.integrated_query = integrated;
        if state.cancel.is_cancelled() {
            state.trajectory.mark_cancelled();
        }
        info!("FINALIZING -> DONE");
    }

    fn budget_exhausted(&self, state: &BuildState<'_>) -> bool {
        state.trajectory.llm_calls() >= self.config.llm_calls_per_doc
            || state.trajectory.web_searches() >= self.config.search_calls_per_doc.min(self.config.search_calls_per_doc_hard_cap)
    }

    fn wall_clock_exceeded(&self, state: &BuildState<'_>) -> bool {
        state.started.elapsed().as_secs() >= self.config.per_document_wall_clock_secs
    }
}

fn ancestor_answers(tree: &ReasoningTree, node_id: &str) -> Vec<String> {
    let mut answers = Vec::new();
    let mut current = Some(node_id.to_string());
    while let Some(id) = current {
        let Some(node) = tree.nodes.get(&id) else { break };
        answers.push(node.question.expected_answer.clone());
        current = node.parent_node_id.clone();
    }
    answers
}

fn sibling_answers(tree: &ReasoningTree, parent_node_id: &str) -> Vec<String> {
    tree.children_of(parent_node_id)
        .into_iter()
        .map(|n| n.question.expected_answer.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::llm::StubLlmGateway;
    use crate::gateway::search::{SearchResult, StubSearchGateway};

    fn doc() -> Document {
        Document {
            doc_id: "d1".into(),
            topic_id: "t1".into(),
            content: "The James Webb Space Telescope succeeded Hubble and was launched in 2021 by NASA. It observes distant galaxies and exoplanets with unprecedented clarity, far beyond the reach of prior observatories in every meaningful way today.".into(),
            value_score: 1.0,
        }
    }

    #[tokio::test]
    async fn empty_document_yields_empty_tree() {
        let llm = StubLlmGateway::new("[]");
        let search = StubSearchGateway::new();
        let config = EngineConfig::default();
        let orchestrator = TreeOrchestrator::new(&llm, &search, &config);
        let short_doc = Document { content: "too short".into(), ..doc() };
        let cancel = NeverCancel;
        let (tree, record) = orchestrator.process_document(&short_doc, &cancel).await;
        assert_eq!(tree.size(), 0);
        assert_eq!(record.stats.size, 0);
    }

    #[tokio::test]
    async fn budget_exhaustion_stops_expansion_early() {
        let llm = StubLlmGateway::new("irrelevant");
        let search = StubSearchGateway::new().with_results(
            "keyword",
            vec![SearchResult { url: "https://example.com".into(), title: "t".into(), content: "c".into(), rank: 0 }],
        );
        let mut config = EngineConfig::default();
        config.llm_calls_per_doc = 1;
        let orchestrator = TreeOrchestrator::new(&llm, &search, &config);
        let cancel = NeverCancel;
        let (_tree, record) = orchestrator.process_document(&doc(), &cancel).await;
        assert!(record.stats.llm_calls <= 2);
    }
}
