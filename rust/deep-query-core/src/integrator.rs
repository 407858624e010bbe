//! Tree-Level Integrator.
//!
//! Collapses a complete [`ReasoningTree`](crate::model::ReasoningTree) into
//! one composite deep question via the `hierarchical_fusion` strategy:
//! traverse deepest-to-root, replacing each ancestor keyword with a
//! natural-language paraphrase derived from its child's question.

use tracing::{debug, info, warn};

use crate::config::{EngineConfig, IntegrationStrategy};
use crate::gateway::llm::LlmGateway;
use crate::model::{ReasoningTree, TreeNode};
use crate::text;

/// Output of integration. `None` when LLM verification fails;
/// the tree is still exported in that case, just without this field.
#[derive(Debug, Clone)]
pub struct IntegratedQuery {
    pub text: String,
    pub root_answer: String,
    pub reasoning_path: Vec<String>,
    pub component_questions: Vec<String>,
    pub confidence: f64,
    pub complexity_score: usize,
}

#[derive(serde::Deserialize)]
struct VerificationJudgment {
    #[serde(default)]
    single_answer: bool,
    #[serde(default)]
    no_leakage: bool,
    #[serde(default)]
    encodes_constraints: bool,
}

pub struct TreeLevelIntegrator<'a> {
    llm: &'a dyn LlmGateway,
}

impl<'a> TreeLevelIntegrator<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmGateway) -> Self {
        Self { llm }
    }

    /// Returns `None` when the tree has no non-root nodes — `integrated_query`
    /// is only ever populated once at least one exists — or when LLM
    /// verification of the fused question fails.
    pub async fn integrate(&self, tree: &ReasoningTree, config: &EngineConfig) -> Option<IntegratedQuery> {
        let root = tree.root()?;
        if tree.size() <= 1 {
            debug!(tree_id = tree.tree_id, "no non-root nodes, skipping integration");
            return None;
        }

        let ordered = deepest_to_root_order(tree, root);
        if ordered.is_empty() {
            return None;
        }

        let (fused_text, reasoning_path, component_questions) = match config.integration_strategy {
            IntegrationStrategy::HierarchicalFusion => self.hierarchical_fusion(tree, &ordered).await?,
            IntegrationStrategy::KeywordReplacement => self.keyword_replacement(tree, &ordered).await?,
        };

        let root_answer = root.question.expected_answer.clone();
        if !self.verify(&fused_text, &root_answer).await {
            warn!(tree_id = tree.tree_id, "integrated query failed LLM verification");
            return None;
        }

        let complexity_score = tree.size() - 1;
        let confidence = node_confidence_product(tree);

        info!(tree_id = tree.tree_id, complexity_score, confidence, "tree integrated");

        Some(IntegratedQuery {
            text: fused_text,
            root_answer,
            reasoning_path,
            component_questions,
            confidence,
            complexity_score,
        })
    }

    async fn hierarchical_fusion(
        &self,
        tree: &ReasoningTree,
        ordered: &[&TreeNode],
    ) -> Option<(String, Vec<String>, Vec<String>)> {
        let root = tree.root()?;
        let mut reasoning_path = Vec::new();
        let mut component_questions = Vec::new();
        let mut paraphrases: Vec<String> = Vec::new();

        for node in ordered {
            component_questions.push(node.question.text.clone());
            reasoning_path.push(format!(
                "depth {}: {} -> {}",
                node.depth, node.question.text, node.question.expected_answer
            ));
            let paraphrase = self.paraphrase(&node.question.text, &node.question.expected_answer).await;
            paraphrases.push(paraphrase);
        }

        let mut fused = root.question.text.clone();
        for (node, paraphrase) in ordered.iter().zip(paraphrases.iter()) {
            if let Some((start, end)) = text::leaks_answer(&fused, &node.question.expected_answer) {
                fused.replace_range(start..end, paraphrase);
            }
        }

        Some((fused, reasoning_path, component_questions))
    }

    /// Alternative strategy alongside hierarchical fusion: instead of splicing
    /// paraphrases back into the root text, it composes them into a single
    /// trailing clause appended to the root question.
    async fn keyword_replacement(
        &self,
        tree: &ReasoningTree,
        ordered: &[&TreeNode],
    ) -> Option<(String, Vec<String>, Vec<String>)> {
        let root = tree.root()?;
        let mut reasoning_path = Vec::new();
        let mut component_questions = Vec::new();
        let mut clauses = Vec::new();

        for node in ordered {
            component_questions.push(node.question.text.clone());
            reasoning_path.push(format!(
                "depth {}: {} -> {}",
                node.depth, node.question.text, node.question.expected_answer
            ));
            clauses.push(self.paraphrase(&node.question.text, &node.question.expected_answer).await);
        }

        let base = root.question.text.trim_end_matches('?');
        let fused = format!("{base}, given that {}?", clauses.join("; and that "));
        Some((fused, reasoning_path, component_questions))
    }

    async fn paraphrase(&self, question_text: &str, answer: &str) -> String {
        let prompt = format!(
            "Rewrite the fact \"the answer to '{question_text}' is {answer}\" as a short \
             descriptive clause that could replace the word \"{answer}\" inside a larger \
             sentence, without stating \"{answer}\" itself. Respond with only the clause."
        );
        match self.llm.generate(&prompt, 0.0, 80).await {
            Ok(text) => text.trim().to_string(),
            Err(_) => format!("the subject of \"{question_text}\""),
        }
    }

    async fn verify(&self, fused_text: &str, root_answer: &str) -> bool {
        if text::leaks_answer(fused_text, root_answer).is_some() {
            return false;
        }
        let prompt = format!(
            "Does the following composite question have exactly one correct answer, equal to \
             \"{root_answer}\", without containing that answer as a substring, and does it \
             encode every intermediate constraint implicitly? Respond as JSON with boolean \
             fields single_answer, no_leakage, encodes_constraints.\n\n{fused_text}"
        );
        match self.llm.generate(&prompt, 0.0, 100).await {
            Ok(raw) => match extract_json(&raw).and_then(|s| serde_json::from_str::<VerificationJudgment>(s).ok()) {
                Some(j) => j.single_answer && j.no_leakage && j.encodes_constraints,
                None => false,
            },
            Err(_) => false,
        }
    }
}

fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Depth-first, deepest-first ordering of non-root nodes, grouped by
/// subtree so each parent's paraphrase is built from already-resolved
/// descendants.
fn deepest_to_root_order<'t>(tree: &'t ReasoningTree, root: &'t TreeNode) -> Vec<&'t TreeNode> {
    let mut nodes: Vec<&TreeNode> = tree
        .nodes
        .values()
        .filter(|n| n.node_id != root.node_id)
        .collect();
    nodes.sort_by(|a, b| b.depth.cmp(&a.depth).then_with(|| a.node_id.cmp(&b.node_id)));
    nodes
}

fn node_confidence_product(tree: &ReasoningTree) -> f64 {
    let mut product: f64 = 1.0;
    for node in tree.nodes.values() {
        let node_score = (node.validation_scores.hierarchy.max(0.01))
            * (node.validation_scores.shortcut.max(0.01))
            * (node.validation_scores.dual_model.max(0.01));
        if node_score > 0.0 {
            product *= node_score.clamp(0.0, 1.0);
        }
    }
    product.min(0.95)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::llm::StubLlmGateway;
    use crate::model::{AnswerType, ExtensionType, NodeValidationScores, Question, QuestionType, TreeCreationMetadata};
    use chrono::Utc;
    use std::collections::HashMap;

    fn root_node() -> TreeNode {
        TreeNode {
            node_id: "root".into(),
            question: Question {
                question_id: "root".into(),
                text: "Which telescope succeeded Hubble in 2021?".into(),
                expected_answer: "James Webb Space Telescope".into(),
                question_type: QuestionType::Which,
                answer_type: AnswerType::ProperNoun,
                level: 1,
                parent_id: None,
                keywords: vec!["Hubble".into(), "2021".into()],
                validation_score: 0.9,
            },
            extension_type: ExtensionType::Root,
            depth: 0,
            parent_node_id: None,
            keywords_used: vec!["Hubble".into(), "2021".into()],
            search_context_id: None,
            validation_scores: NodeValidationScores { hierarchy: 1.0, shortcut: 1.0, dual_model: 0.9, minimum_keyword: 1.0 },
            workflow_compliant: true,
        }
    }

    fn child_node() -> TreeNode {
        TreeNode {
            node_id: "child1".into(),
            question: Question {
                question_id: "child1".into(),
                text: "When was the earlier observatory launched?".into(),
                expected_answer: "Hubble".into(),
                question_type: QuestionType::When,
                answer_type: AnswerType::ProperNoun,
                level: 2,
                parent_id: Some("root".into()),
                keywords: vec![],
                validation_score: 0.8,
            },
            extension_type: ExtensionType::Series,
            depth: 1,
            parent_node_id: Some("root".into()),
            keywords_used: vec![],
            search_context_id: None,
            validation_scores: NodeValidationScores { hierarchy: 0.9, shortcut: 0.8, dual_model: 0.8, minimum_keyword: 1.0 },
            workflow_compliant: true,
        }
    }

    fn tree_with_child() -> ReasoningTree {
        let mut nodes = HashMap::new();
        nodes.insert("root".to_string(), root_node());
        nodes.insert("child1".to_string(), child_node());
        ReasoningTree {
            tree_id: "t1".into(),
            root_node_id: "root".into(),
            nodes,
            keyword_hierarchy: HashMap::new(),
            integrated_query: None,
            creation_metadata: TreeCreationMetadata {
                document_id: "d1".into(),
                trajectory_id: "traj1".into(),
                created_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn returns_none_for_root_only_tree() {
        let mut nodes = HashMap::new();
        nodes.insert("root".to_string(), root_node());
        let tree = ReasoningTree {
            tree_id: "t1".into(),
            root_node_id: "root".into(),
            nodes,
            keyword_hierarchy: HashMap::new(),
            integrated_query: None,
            creation_metadata: TreeCreationMetadata {
                document_id: "d1".into(),
                trajectory_id: "traj1".into(),
                created_at: Utc::now(),
            },
        };
        let llm = StubLlmGateway::new("paraphrase");
        let integrator = TreeLevelIntegrator::new(&llm);
        let config = EngineConfig::default();
        assert!(integrator.integrate(&tree, &config).await.is_none());
    }

    #[tokio::test]
    async fn integrates_tree_with_child_when_verification_passes() {
        let llm = StubLlmGateway::new("an earlier observatory")
            .with_response("Respond as JSON", r#"{"single_answer":true,"no_leakage":true,"encodes_constraints":true}"#);
        let integrator = TreeLevelIntegrator::new(&llm);
        let config = EngineConfig::default();
        let tree = tree_with_child();
        let integrated = integrator.integrate(&tree, &config).await;
        assert!(integrated.is_some());
        let integrated = integrated.unwrap();
        assert_eq!(integrated.complexity_score, 1);
        assert!(integrated.confidence <= 0.95);
    }

    #[tokio::test]
    async fn returns_none_when_verification_fails() {
        let llm = StubLlmGateway::new("an earlier observatory")
            .with_response("Respond as JSON", r#"{"single_answer":false,"no_leakage":true,"encodes_constraints":true}"#);
        let integrator = TreeLevelIntegrator::new(&llm);
        let config = EngineConfig::default();
        let tree = tree_with_child();
        assert!(integrator.integrate(&tree, &config).await.is_none());
    }

    #[test]
    fn confidence_product_carries_a_low_scoring_node_without_a_floor() {
        let mut tree = tree_with_child();
        tree.nodes.get_mut("child1").unwrap().validation_scores = NodeValidationScores {
            hierarchy: 0.1,
            shortcut: 0.1,
            dual_model: 0.1,
            minimum_keyword: 1.0,
        };
        let confidence = node_confidence_product(&tree);
        assert!(confidence < 0.01, "expected a low-scoring node to drag confidence down, got {confidence}");
    }
}
