//! End-to-end tests against the deterministic in-memory gateway doubles,
//! exercising a full document run without a live LLM or search backend.

use deep_query_core::config::EngineConfig;
use deep_query_core::gateway::{StubLlmGateway, StubSearchGateway};
use deep_query_core::gateway::search::SearchResult;
use deep_query_core::model::Document;
use deep_query_core::run_document;

const DOC_CONTENT: &str = "The James Webb Space Telescope succeeded Hubble and was launched in \
2021 by NASA. It observes distant galaxies and exoplanets with unprecedented clarity, far \
beyond the reach of prior observatories in every meaningful way. Researchers worldwide use \
its infrared instruments to study the earliest stars and galaxies ever observed.";

fn classic_document() -> Document {
    Document {
        doc_id: "doc-classic".into(),
        topic_id: "topic-astronomy".into(),
        content: DOC_CONTENT.into(),
        value_score: 1.0,
    }
}

fn configured_llm() -> StubLlmGateway {
    StubLlmGateway::new("What is the nature of this subject?")
        .with_response(
            "Extract up to",
            r#"[{"text":"James Webb Space Telescope","type":"proper_noun"},{"text":"2021","type":"date"},{"text":"NASA","type":"proper_noun"}]"#,
        )
        .with_response(
            "grounded only in facts",
            "Which observatory succeeded Hubble and launched in 2021 with NASA support?",
        )
        .with_response(
            "single_answer, solvable",
            r#"{"single_answer":0.9,"solvable":0.9,"unambiguous":0.85,"verifiable":0.9,"no_answer_leakage":0.95}"#,
        )
        .with_response(
            "distinctive, non_ambiguous",
            r#"{"distinctive":0.9,"non_ambiguous":0.85,"not_repeated":0.9,"precise":0.85}"#,
        )
        .with_response(
            "multiple_referents",
            r#"{"multiple_referents":0.1,"sufficiently_specific":0.9,"potential_confusion":0.1,"objectively_verifiable":0.9}"#,
        )
        .with_response(
            "extract the minimum set of keywords",
            r#"[{"text":"Hubble","type":"proper_noun"},{"text":"2021","type":"date"},{"text":"NASA","type":"proper_noun"}]"#,
        )
        .with_response(
            "Synthesize the following search snippets",
            "An earlier orbital observatory studied the cosmos for decades before retirement.",
        )
        .with_response(
            "write a single",
            "Which earlier observatory did this mission succeed in orbit?",
        )
        .with_response("Rewrite the fact", "the earlier orbital observatory")
        .with_response(
            "Respond as JSON with boolean fields",
            r#"{"single_answer":true,"no_leakage":true,"encodes_constraints":true}"#,
        )
}

fn configured_search() -> StubSearchGateway {
    StubSearchGateway::new().with_results(
        "Hubble",
        vec![SearchResult {
            url: "https://example.com/hubble".into(),
            title: "Hubble Space Telescope".into(),
            content: "Hubble launched in 1990 and has observed deep space for over three decades.".into(),
            rank: 0,
        }],
    )
}

#[tokio::test]
async fn classic_root_produces_grounded_tree() {
    let llm = configured_llm();
    let search = configured_search();
    let config = EngineConfig::default();

    let result = run_document(&classic_document(), &llm, &search, &config).await;

    assert!(result.tree.size() >= 1, "expected at least a root node");
    let root = result.tree.root().expect("root node present");
    assert_eq!(root.depth, 0);
    assert!(root.question.text.ends_with('?'));
    assert!(root.question.text.to_lowercase().starts_with("which")
        || root.question.text.to_lowercase().starts_with("what")
        || root.question.text.to_lowercase().starts_with("who")
        || root.question.text.to_lowercase().starts_with("when")
        || root.question.text.to_lowercase().starts_with("where"));

    // Resource caps are never exceeded.
    assert!(result.trajectory.stats.llm_calls <= config.llm_calls_per_doc);
    assert!(result.trajectory.stats.web_searches <= config.search_calls_per_doc);
}

#[tokio::test]
async fn every_non_root_node_answer_matches_a_parent_keyword() {
    let llm = configured_llm();
    let search = configured_search();
    let config = EngineConfig::default();

    let result = run_document(&classic_document(), &llm, &search, &config).await;

    // Every non-root node's expected_answer matches one of its
    // parent's keywords_used.
    for node in result.tree.nodes.values() {
        if let Some(parent_id) = &node.parent_node_id {
            let parent = result.tree.nodes.get(parent_id).expect("parent present");
            assert!(
                parent.keywords_used.iter().any(|k| k.eq_ignore_ascii_case(&node.question.expected_answer)),
                "child answer {:?} not found among parent keywords {:?}",
                node.question.expected_answer,
                parent.keywords_used
            );
        }
    }
}

#[tokio::test]
async fn every_node_depth_respects_depth_max_and_tree_is_acyclic() {
    let llm = configured_llm();
    let search = configured_search();
    let config = EngineConfig::default();

    let result = run_document(&classic_document(), &llm, &search, &config).await;

    // Depth bound and acyclicity: every non-root node's parent chain
    // terminates at the root without revisiting a node.
    for node in result.tree.nodes.values() {
        assert!((node.depth as usize) <= config.depth_max);
        let mut seen = std::collections::HashSet::new();
        let mut current = Some(node.node_id.clone());
        while let Some(id) = current {
            assert!(seen.insert(id.clone()), "cycle detected at node {id}");
            current = result.tree.nodes.get(&id).and_then(|n| n.parent_node_id.clone());
        }
    }
}

#[tokio::test]
async fn empty_document_yields_empty_tree_with_no_extension_calls() {
    let llm = StubLlmGateway::new("[]");
    let search = StubSearchGateway::new();
    let config = EngineConfig::default();
    let document = Document {
        doc_id: "doc-empty".into(),
        topic_id: "topic-empty".into(),
        content: "too short".into(),
        value_score: 1.0,
    };

    let result = run_document(&document, &llm, &search, &config).await;

    assert_eq!(result.tree.size(), 0);
    assert!(result.tree.integrated_query.is_none());
    assert_eq!(result.trajectory.stats.web_searches, 0);
}

#[tokio::test]
async fn non_root_nodes_carry_a_minimum_keyword_annotation() {
    let llm = configured_llm();
    let search = configured_search();
    let config = EngineConfig::default();

    let result = run_document(&classic_document(), &llm, &search, &config).await;

    for node in result.tree.nodes.values() {
        if node.parent_node_id.is_some() {
            assert!(
                node.validation_scores.minimum_keyword == 0.0 || node.validation_scores.minimum_keyword == 1.0,
                "expected minimum_keyword annotation to be 0.0 or 1.0, got {}",
                node.validation_scores.minimum_keyword
            );
        }
    }
}

#[tokio::test]
async fn llm_budget_of_one_call_yields_at_most_a_partial_tree() {
    let llm = configured_llm();
    let search = configured_search();
    let config = EngineConfig::default().with_llm_calls_per_doc(1);

    let result = run_document(&classic_document(), &llm, &search, &config).await;

    assert!(result.trajectory.stats.llm_calls <= 2);
    assert!(result.tree.size() <= 1);
}
