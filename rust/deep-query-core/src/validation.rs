//! Dual-Model Validator.
//!
//! Computes deterministic specificity plus dual-LLM validity/uniqueness,
//! combined into an overall score with threshold/tie-break gating.
//! Grounded on `research/verification.rs`'s `verify_claims` pattern of
//! parsing independent LLM judgments into typed sub-scores.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::gateway::llm::LlmGateway;
use crate::model::AnswerType;
use crate::text;

/// Result of validating one `(question, answer, document)` triple.
/// This is a value, not an error: a failed validation is an ordinary,
/// expected outcome the orchestrator branches on.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub validity: f64,
    pub uniqueness: f64,
    pub specificity: f64,
    pub overall: f64,
    pub passed: bool,
    pub reasoning: String,
    pub issues: Vec<String>,
}

#[derive(Deserialize, Default)]
struct ValidityJudgment {
    #[serde(default)]
    single_answer: f64,
    #[serde(default)]
    solvable: f64,
    #[serde(default)]
    unambiguous: f64,
    #[serde(default)]
    verifiable: f64,
    #[serde(default)]
    no_answer_leakage: f64,
}

impl ValidityJudgment {
    fn mean(&self) -> f64 {
        (self.single_answer + self.solvable + self.unambiguous + self.verifiable + self.no_answer_leakage) / 5.0
    }
}

#[derive(Deserialize, Default)]
struct UniquenessJudgment {
    #[serde(default)]
    distinctive: f64,
    #[serde(default)]
    non_ambiguous: f64,
    #[serde(default)]
    not_repeated: f64,
    #[serde(default)]
    precise: f64,
}

impl UniquenessJudgment {
    fn mean(&self) -> f64 {
        (self.distinctive + self.non_ambiguous + self.not_repeated + self.precise) / 4.0
    }
}

/// Model 2's judgment, framed around the negative indicators that would
/// undermine uniqueness rather than restating it positively.
/// `multiple_referents` and `potential_confusion` are inverted before
/// averaging with the positively-framed `sufficiently_specific` and
/// `objectively_verifiable`.
#[derive(Deserialize, Default)]
struct NegativeUniquenessJudgment {
    #[serde(default)]
    multiple_referents: f64,
    #[serde(default)]
    sufficiently_specific: f64,
    #[serde(default)]
    potential_confusion: f64,
    #[serde(default)]
    objectively_verifiable: f64,
}

impl NegativeUniquenessJudgment {
    fn mean(&self) -> f64 {
        let distinctive = 1.0 - self.multiple_referents;
        let non_ambiguous = 1.0 - self.potential_confusion;
        (distinctive + self.sufficiently_specific + non_ambiguous + self.objectively_verifiable) / 4.0
    }
}

pub struct DualModelValidator<'a> {
    llm: &'a dyn LlmGateway,
}

impl<'a> DualModelValidator<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmGateway) -> Self {
        Self { llm }
    }

    pub async fn validate(
        &self,
        question_text: &str,
        expected_answer: &str,
        answer_type: AnswerType,
        document_content: &str,
        config: &EngineConfig,
    ) -> ValidationResult {
        let mut issues = Vec::new();

        let specificity = score_specificity(question_text, expected_answer, answer_type);

        if let Some((start, end)) = text::leaks_answer(question_text, expected_answer) {
            issues.push(format!("answer leaks into question text at [{start}, {end}]"));
            return ValidationResult {
                validity: 0.0,
                uniqueness: 0.0,
                specificity,
                overall: 0.4 * specificity,
                passed: false,
                reasoning: "short-circuited: substring leakage pre-check failed".to_string(),
                issues,
            };
        }

        let validity = self
            .dual_validity(question_text, expected_answer, document_content, &mut issues)
            .await;
        let uniqueness = self
            .dual_uniqueness(question_text, expected_answer, document_content, &mut issues)
            .await;

        let overall = 0.4 * specificity + 0.3 * validity + 0.3 * uniqueness;
        let passed = gate(specificity, validity, uniqueness, overall, config);

        debug!(specificity, validity, uniqueness, overall, passed, "validation computed");

        ValidationResult {
            validity,
            uniqueness,
            specificity,
            overall,
            passed,
            reasoning: format!(
                "specificity={specificity:.2} validity={validity:.2} uniqueness={uniqueness:.2} overall={overall:.2}"
            ),
            issues,
        }
    }

    async fn dual_validity(
        &self,
        question_text: &str,
        expected_answer: &str,
        document_content: &str,
        issues: &mut Vec<String>,
    ) -> f64 {
        let prompt = format!(
            "Judge this question/answer pair against the document. Respond as JSON with fields \
             single_answer, solvable, unambiguous, verifiable, no_answer_leakage, each a number \
             in [0,1].\n\nQuestion: {question_text}\nAnswer: {expected_answer}\nDocument: {document_content}"
        );
        let judgment_a = self.judge_validity(&prompt, 0.0, issues).await;
        let judgment_b = self.judge_validity(&prompt, 0.7, issues).await;
        (judgment_a + judgment_b) / 2.0
    }

    async fn judge_validity(&self, prompt: &str, temperature: f32, issues: &mut Vec<String>) -> f64 {
        match self.llm.generate(prompt, temperature, 200).await {
            Ok(raw) => match extract_json(&raw).and_then(|s| serde_json::from_str::<ValidityJudgment>(s).ok()) {
                Some(j) => j.mean().clamp(0.0, 1.0),
                None => {
                    issues.push("validity judgment unparseable, scored 0".to_string());
                    warn!("validity judgment unparseable");
                    0.0
                }
            },
            Err(err) => {
                issues.push(format!("validity LLM call failed: {err}"));
                0.0
            }
        }
    }

    async fn dual_uniqueness(
        &self,
        question_text: &str,
        expected_answer: &str,
        document_content: &str,
        issues: &mut Vec<String>,
    ) -> f64 {
        let prompt_a = format!(
            "Judge how unique and unambiguous this answer is for the question, given the \
             document. Respond as JSON with fields distinctive, non_ambiguous, not_repeated, \
             precise, each a number in [0,1].\n\nQuestion: {question_text}\nAnswer: \
             {expected_answer}\nDocument: {document_content}"
        );
        let prompt_b = format!(
            "Judge whether this answer could be confused with something else in the document. \
             Respond as JSON with fields multiple_referents, sufficiently_specific, \
             potential_confusion, objectively_verifiable, each a number in [0,1]. \
             multiple_referents and potential_confusion are negative indicators: higher means \
             worse.\n\nQuestion: {question_text}\nAnswer: {expected_answer}\nDocument: {document_content}"
        );
        let judgment_a = self.judge_uniqueness(&prompt_a, 0.0, issues).await;
        let judgment_b = self.judge_negative_uniqueness(&prompt_b, 0.7, issues).await;
        (judgment_a + judgment_b) / 2.0
    }

    async fn judge_uniqueness(&self, prompt: &str, temperature: f32, issues: &mut Vec<String>) -> f64 {
        match self.llm.generate(prompt, temperature, 200).await {
            Ok(raw) => match extract_json(&raw).and_then(|s| serde_json::from_str::<UniquenessJudgment>(s).ok()) {
                Some(j) => j.mean().clamp(0.0, 1.0),
                None => {
                    issues.push("uniqueness judgment unparseable, scored 0".to_string());
                    warn!("uniqueness judgment unparseable");
                    0.0
                }
            },
            Err(err) => {
                issues.push(format!("uniqueness LLM call failed: {err}"));
                0.0
            }
        }
    }

    async fn judge_negative_uniqueness(&self, prompt: &str, temperature: f32, issues: &mut Vec<String>) -> f64 {
        match self.llm.generate(prompt, temperature, 200).await {
            Ok(raw) => match extract_json(&raw).and_then(|s| serde_json::from_str::<NegativeUniquenessJudgment>(s).ok()) {
                Some(j) => j.mean().clamp(0.0, 1.0),
                None => {
                    issues.push("negative uniqueness judgment unparseable, scored 0".to_string());
                    warn!("negative uniqueness judgment unparseable");
                    0.0
                }
            },
            Err(err) => {
                issues.push(format!("uniqueness LLM call failed: {err}"));
                0.0
            }
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

/// Deterministic specificity score.
fn score_specificity(question_text: &str, expected_answer: &str, answer_type: AnswerType) -> f64 {
    let mut score: f64 = 0.0;

    if expected_answer.trim().chars().count() >= 3 {
        score += 0.2;
    }

    match answer_type {
        AnswerType::ProperNoun => {
            if !text::proper_nouns(expected_answer).is_empty() {
                score += 0.3;
            }
            if expected_answer.split_whitespace().count() == 1 && is_plain_given_name(expected_answer) {
                score -= 0.15;
            }
        }
        AnswerType::Number => {
            if !text::numbers(expected_answer).is_empty() {
                score += 0.3;
            }
        }
        AnswerType::Date => {
            if !text::years(expected_answer).is_empty() {
                score += 0.3;
            }
        }
        AnswerType::Location => score += 0.25,
        AnswerType::TechnicalTerm => {
            if !text::technical_terms(expected_answer).is_empty() {
                score += 0.3;
            }
        }
    }

    if text::is_generic_word(expected_answer) {
        score -= 0.3;
    }

    if question_text.split_whitespace().count() >= 6 {
        score += 0.2;
    }

    score.clamp(0.0, 1.0)
}

fn is_plain_given_name(text: &str) -> bool {
    const COMMON_GIVEN_NAMES: &[&str] = &["John", "Mary", "James", "Anna", "David", "Sarah"];
    COMMON_GIVEN_NAMES.contains(&text.trim())
}

/// Threshold gate with a tie-break: tolerate one weak sub-model
/// score when its partner compensates.
fn gate(specificity: f64, validity: f64, uniqueness: f64, overall: f64, config: &EngineConfig) -> bool {
    let base = specificity >= 0.6 && overall >= config.overall_threshold;
    if !base {
        return false;
    }
    let strict = validity >= config.validity_threshold && uniqueness >= config.uniqueness_threshold;
    let tie_break = (validity >= 0.75 && uniqueness >= 0.5) || (uniqueness >= 0.75 && validity >= 0.5);
    let result = strict || tie_break;
    if result {
        info!(specificity, validity, uniqueness, overall, "validation passed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::llm::StubLlmGateway;

    #[test]
    fn specificity_rewards_proper_noun_and_length() {
        let score = score_specificity(
            "Which space observatory succeeded Hubble in 2021?",
            "James Webb Space Telescope",
            AnswerType::ProperNoun,
        );
        assert!(score > 0.6);
    }

    #[test]
    fn specificity_penalizes_generic_word() {
        let score = score_specificity("What is it called?", "system", AnswerType::ProperNoun);
        assert!(score < 0.3);
    }

    #[test]
    fn gate_allows_tie_break_when_one_score_compensates() {
        let config = EngineConfig::default();
        assert!(gate(0.7, 0.8, 0.55, 0.7, &config));
        assert!(!gate(0.7, 0.5, 0.5, 0.7, &config));
    }

    #[tokio::test]
    async fn leaked_answer_short_circuits_to_fail() {
        let llm = StubLlmGateway::new(r#"{"single_answer":1,"solvable":1,"unambiguous":1,"verifiable":1,"no_answer_leakage":1}"#);
        let validator = DualModelValidator::new(&llm);
        let config = EngineConfig::default();
        let result = validator
            .validate(
                "What is James Webb known for replacing?",
                "James Webb",
                AnswerType::ProperNoun,
                "doc content",
                &config,
            )
            .await;
        assert!(!result.passed);
        assert_eq!(result.validity, 0.0);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn full_validation_passes_with_strong_scores() {
        let llm = StubLlmGateway::new(r#"{"single_answer":0.9,"solvable":0.9,"unambiguous":0.9,"verifiable":0.9,"no_answer_leakage":0.9,"distinctive":0.9,"non_ambiguous":0.9,"not_repeated":0.9,"precise":0.9}"#)
            .with_response(
                "multiple_referents",
                r#"{"multiple_referents":0.1,"sufficiently_specific":0.9,"potential_confusion":0.1,"objectively_verifiable":0.9}"#,
            );
        let validator = DualModelValidator::new(&llm);
        let config = EngineConfig::default();
        let result = validator
            .validate(
                "Which space observatory succeeded Hubble in 2021?",
                "James Webb Space Telescope",
                AnswerType::ProperNoun,
                "The James Webb Space Telescope succeeded Hubble in 2021.",
                &config,
            )
            .await;
        assert!(result.passed);
        assert_eq!(llm.call_count(), 4);
    }

    #[tokio::test]
    async fn negatively_framed_uniqueness_prompt_is_distinct_and_inverted() {
        let llm = StubLlmGateway::new("unrelated")
            .with_response(
                "distinctive, non_ambiguous",
                r#"{"distinctive":0.9,"non_ambiguous":0.9,"not_repeated":0.9,"precise":0.9}"#,
            )
            .with_response(
                "multiple_referents",
                r#"{"multiple_referents":1.0,"sufficiently_specific":0.0,"potential_confusion":1.0,"objectively_verifiable":0.0}"#,
            );
        let validator = DualModelValidator::new(&llm);
        let mut issues = Vec::new();
        let uniqueness = validator
            .dual_uniqueness("Q", "A", "doc", &mut issues)
            .await;
        // Model 1 scores 0.9; model 2's negative indicators are maxed out,
        // inverting to 0.0 everywhere, so the average is pulled down sharply.
        assert!(uniqueness < 0.5, "expected inversion to drag the average down, got {uniqueness}");
    }
}
