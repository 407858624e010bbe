//! Keyword Hierarchy Manager.
//!
//! Extracts the minimal keyword set from a (question, answer) pair,
//! checks minimum-keyword essentiality, validates a child answer against
//! a parent's keywords through the five-rule cascade, and screens for
//! shortcut questions. Grounded on
//! `keyword_hierarchy_manager.py`'s `common_variants`/`technical_relationships`
//! tables and its rule cascade.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::gateway::llm::LlmGateway;
use crate::model::{AnswerType, Keyword};
use crate::text;

const MAX_KEYWORDS: usize = 5;
const SHORTCUT_CONFIDENCE_THRESHOLD: f64 = 0.4;

/// Variant groups treated as interchangeable in rule 2 (abbreviation pairs,
/// common synonyms). Grounded on `common_variants` in the original framework.
const COMMON_VARIANTS: &[&[&str]] = &[
    &["usa", "united states", "united states of america", "us"],
    &["uk", "united kingdom", "britain", "great britain"],
    &["un", "united nations"],
    &["eu", "european union"],
    &["nasa", "national aeronautics and space administration"],
];

/// Curated technical-term relation map backing rule 5 ("diversity concession").
/// Grounded on `_get_related_technical_terms`'s `technical_relationships`.
const TECHNICAL_RELATIONS: &[(&str, &[&str])] = &[
    ("telescope", &["optics", "lens", "mirror", "observatory"]),
    ("satellite", &["orbit", "spacecraft", "payload"]),
    ("reactor", &["fission", "fusion", "core", "containment"]),
    ("algorithm", &["heuristic", "procedure", "method"]),
    ("vaccine", &["immunization", "antigen", "dose"]),
];

pub struct KeywordHierarchyManager<'a> {
    llm: &'a dyn LlmGateway,
}

/// Outcome of the minimum-keyword check: whether the essential subset size
/// lies in the valid `[1, n-1]` range.
#[derive(Debug, Clone)]
pub struct MinimumKeywordCheck {
    pub essential: Vec<String>,
    pub passed: bool,
}

/// Outcome of validating a child answer against a parent's keywords.
#[derive(Debug, Clone)]
pub struct HierarchyValidation {
    pub accepted: bool,
    pub matched_keyword: Option<String>,
    pub confidence: f64,
    pub rule: Option<u8>,
    pub issues: Vec<String>,
}

/// Outcome of the shortcut-prevention check.
#[derive(Debug, Clone)]
pub struct ShortcutCheck {
    pub passed: bool,
    pub confidence: f64,
    pub issues: Vec<String>,
}

#[derive(serde::Deserialize)]
struct RawKeyword {
    text: String,
    #[serde(rename = "type")]
    keyword_type: String,
}

impl<'a> KeywordHierarchyManager<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmGateway) -> Self {
        Self { llm }
    }

    /// Asks the LLM for the minimum set of keywords uniquely identifying
    /// `parent_answer` within `parent_question` (+ optional document
    /// context), falling back to a regex-derived set on parse failure.
    pub async fn extract(
        &self,
        parent_question: &str,
        parent_answer: &str,
        doc_context: Option<&str>,
    ) -> Vec<Keyword> {
        let context = doc_context.unwrap_or(parent_question);
        let prompt = format!(
            "From the question and answer below, extract the minimum set of keywords (at most \
             {MAX_KEYWORDS}) that together uniquely identify the answer. Exclude stopwords and \
             question words. Respond as a JSON array of objects with fields \"text\" and \
             \"type\" (one of \"proper_noun\", \"number\", \"date\", \"location\", \
             \"technical_term\").\n\nQuestion: {parent_question}\nAnswer: {parent_answer}\nContext: {context}"
        );

        let keywords = match self.llm.generate(&prompt, 0.0, 200).await {
            Ok(raw) => parse_keywords(&raw, parent_question, parent_answer)
                .unwrap_or_else(|| regex_fallback_keywords(parent_question, parent_answer)),
            Err(err) => {
                warn!(error = %err, "keyword extraction LLM call failed, using regex fallback");
                regex_fallback_keywords(parent_question, parent_answer)
            }
        };

        let filtered = post_filter(keywords, parent_answer);
        info!(count = filtered.len(), "keywords extracted");
        filtered
    }

    /// As a diversity concession when `extract` yields fewer than 2 usable
    /// keywords not already used elsewhere in the tree, generate variant
    /// keywords from the technical-term/proper-noun relation tables rather
    /// than giving up.
    #[must_use]
    pub fn extract_diverse(&self, base: Vec<Keyword>, already_used: &HashSet<String>) -> Vec<Keyword> {
        let usable: Vec<_> = base
            .iter()
            .filter(|k| !already_used.contains(&text::normalize(&k.text)))
            .cloned()
            .collect();
        if usable.len() >= 2 {
            return usable;
        }

        let mut out = usable;
        for keyword in &base {
            let lower = keyword.text.to_lowercase();
            if let Some((_, related)) = TECHNICAL_RELATIONS.iter().find(|(term, _)| lower.contains(term)) {
                for variant in *related {
                    if already_used.contains(*variant) {
                        continue;
                    }
                    out.push(Keyword {
                        text: (*variant).to_string(),
                        parent_context: keyword.parent_context.clone(),
                        keyword_type: AnswerType::TechnicalTerm,
                        specificity_score: keyword.specificity_score * 0.7,
                        confidence: keyword.confidence * 0.6,
                        position: keyword.position,
                    });
                    if out.len() >= 2 {
                        return out;
                    }
                }
            }
        }
        out
    }

    /// Minimum keyword check: asks, for each keyword, whether
    /// removing it still lets the remainder uniquely identify the answer.
    /// Deterministic proxy: a keyword is "essential" if it is the longest
    /// proper-noun/technical-term token or if removing its content words
    /// drops overlap with the answer below 0.5.
    #[must_use]
    pub fn minimum_keyword_check(keywords: &[Keyword], parent_answer: &str) -> MinimumKeywordCheck {
        let answer_words = text::content_words(parent_answer);
        let mut essential = Vec::new();
        for keyword in keywords {
            let remaining: HashSet<String> = keywords
                .iter()
                .filter(|k| k.text != keyword.text)
                .flat_map(|k| text::content_words(&k.text))
                .collect();
            let remaining_overlap = if answer_words.is_empty() {
                0.0
            } else {
                remaining.intersection(&answer_words).count() as f64 / answer_words.len() as f64
            };
            if remaining_overlap < 0.5 {
                essential.push(keyword.text.clone());
            }
        }
        let n = keywords.len();
        let passed = n > 0 && (1..n).contains(&essential.len()) || (n == 1 && essential.len() == 1);
        debug!(essential_count = essential.len(), total = n, passed, "minimum keyword check");
        MinimumKeywordCheck { essential, passed }
    }

    /// Child-Answer Hierarchy Validation, the five-rule cascade
    /// in priority order.
    #[must_use]
    pub fn validate_child_answer(child_answer: &str, parent_keywords: &[Keyword]) -> HierarchyValidation {
        let normalized_child = text::normalize(child_answer);

        // Rule 1: exact normalized match.
        for keyword in parent_keywords {
            if text::normalize(&keyword.text) == normalized_child {
                return HierarchyValidation {
                    accepted: true,
                    matched_keyword: Some(keyword.text.clone()),
                    confidence: 1.0,
                    rule: Some(1),
                    issues: Vec::new(),
                };
            }
        }

        // Rule 2: acceptable variant (punctuation/case/number/plural, curated abbreviations).
        for keyword in parent_keywords {
            if is_acceptable_variant(&normalized_child, &text::normalize(&keyword.text)) {
                return HierarchyValidation {
                    accepted: true,
                    matched_keyword: Some(keyword.text.clone()),
                    confidence: 0.9,
                    rule: Some(2),
                    issues: Vec::new(),
                };
            }
        }

        // Rule 3: proper-noun extension (parent tokens subset, child adds <=3 tokens).
        for keyword in parent_keywords {
            if let Some(extra) = proper_noun_extension_extra_tokens(&normalized_child, &text::normalize(&keyword.text)) {
                if extra <= 3 {
                    return HierarchyValidation {
                        accepted: true,
                        matched_keyword: Some(keyword.text.clone()),
                        confidence: 0.8,
                        rule: Some(3),
                        issues: Vec::new(),
                    };
                }
            }
        }

        // Rule 4: semantic word-overlap >= 0.5 weighted by extraction confidence.
        let mut best: Option<(&Keyword, f64)> = None;
        for keyword in parent_keywords {
            let overlap = text::word_overlap(child_answer, &keyword.text);
            let weighted = overlap * keyword.confidence;
            if overlap >= 0.5 && best.as_ref().is_none_or(|(_, b)| weighted > *b) {
                best = Some((keyword, weighted));
            }
        }
        if let Some((keyword, weighted)) = best {
            return HierarchyValidation {
                accepted: true,
                matched_keyword: Some(keyword.text.clone()),
                confidence: weighted.clamp(0.0, 1.0),
                rule: Some(4),
                issues: Vec::new(),
            };
        }

        // Rule 5: diversity concession via curated technical-term relation map.
        for keyword in parent_keywords {
            let keyword_lower = keyword.text.to_lowercase();
            if let Some((_, related)) = TECHNICAL_RELATIONS.iter().find(|(term, _)| keyword_lower.contains(term)) {
                if related.iter().any(|r| normalized_child.contains(r)) {
                    return HierarchyValidation {
                        accepted: true,
                        matched_keyword: Some(keyword.text.clone()),
                        confidence: 0.45,
                        rule: Some(5),
                        issues: Vec::new(),
                    };
                }
            }
        }

        HierarchyValidation {
            accepted: false,
            matched_keyword: None,
            confidence: 0.0,
            rule: None,
            issues: vec![format!(
                "child answer \"{child_answer}\" does not match any parent keyword under rules 1-5"
            )],
        }
    }

    /// Shortcut Prevention.
    #[must_use]
    pub fn check_shortcut(
        child_question: &str,
        ancestor_answers: &[String],
        sibling_answers: &[String],
    ) -> ShortcutCheck {
        let mut issues = Vec::new();
        let mut confidence: f64 = 1.0;

        for ancestor in ancestor_answers {
            if text::leaks_answer(child_question, ancestor).is_some() {
                issues.push(format!("question leaks ancestor answer \"{ancestor}\""));
                confidence -= 0.4;
            }
        }
        for sibling in sibling_answers {
            if text::leaks_answer(child_question, sibling).is_some() {
                issues.push(format!("question leaks sibling answer \"{sibling}\""));
                confidence -= 0.4;
            }
        }

        let word_count = child_question.split_whitespace().count();
        if word_count < 5 {
            issues.push("question lacks structural specificity (too short)".to_string());
            confidence -= 0.2;
        }
        if has_broad_quantifier(child_question) {
            issues.push("question uses a broad quantifier".to_string());
            confidence -= 0.15;
        }
        if crate::config::QuestionWord::leading_word(child_question).is_none() {
            issues.push("question lacks a wh-constraint".to_string());
            confidence -= 0.2;
        }

        confidence = confidence.clamp(0.0, 1.0);
        let passed = confidence >= SHORTCUT_CONFIDENCE_THRESHOLD;
        ShortcutCheck {
            passed,
            confidence,
            issues,
        }
    }
}

fn has_broad_quantifier(text: &str) -> bool {
    const BROAD: &[&str] = &["any", "all", "every", "anything", "everything", "some"];
    let lower = text.to_lowercase();
    BROAD.iter().any(|w| lower.split_whitespace().any(|token| token == *w))
}

fn is_acceptable_variant(normalized_child: &str, normalized_keyword: &str) -> bool {
    if normalized_child == normalized_keyword {
        return true;
    }
    if let Some(singular) = normalized_child.strip_suffix('s') {
        if singular == normalized_keyword {
            return true;
        }
    }
    if let Some(singular) = normalized_keyword.strip_suffix('s') {
        if singular == normalized_child {
            return true;
        }
    }
    for group in COMMON_VARIANTS {
        let in_group_child = group.contains(&normalized_child);
        let in_group_keyword = group.contains(&normalized_keyword);
        if in_group_child && in_group_keyword {
            return true;
        }
    }
    false
}

fn proper_noun_extension_extra_tokens(normalized_child: &str, normalized_keyword: &str) -> Option<usize> {
    let keyword_tokens: HashSet<&str> = normalized_keyword.split_whitespace().collect();
    let child_tokens: Vec<&str> = normalized_child.split_whitespace().collect();
    if !keyword_tokens.iter().all(|t| child_tokens.contains(t)) {
        return None;
    }
    let extra = child_tokens.iter().filter(|t| !keyword_tokens.contains(*t)).count();
    Some(extra)
}

fn parse_keywords(raw: &str, parent_question: &str, parent_answer: &str) -> Option<Vec<Keyword>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end < start {
        return None;
    }
    let parsed: Vec<RawKeyword> = serde_json::from_str(&raw[start..=end]).ok()?;
    let _ = parent_answer;
    Some(
        parsed
            .into_iter()
            .enumerate()
            .map(|(i, r)| Keyword {
                position: parent_question.find(&r.text).unwrap_or(i),
                keyword_type: parse_answer_type(&r.keyword_type),
                specificity_score: 0.7,
                confidence: 0.75,
                parent_context: parent_question.to_string(),
                text: r.text,
            })
            .collect(),
    )
}

fn parse_answer_type(s: &str) -> AnswerType {
    match s {
        "number" => AnswerType::Number,
        "date" => AnswerType::Date,
        "location" => AnswerType::Location,
        "technical_term" => AnswerType::TechnicalTerm,
        _ => AnswerType::ProperNoun,
    }
}

fn regex_fallback_keywords(parent_question: &str, parent_answer: &str) -> Vec<Keyword> {
    let mut keywords = Vec::new();
    for (i, noun) in text::proper_nouns(parent_question).into_iter().enumerate() {
        if noun != parent_answer {
            keywords.push(Keyword {
                position: i,
                text: noun,
                parent_context: parent_question.to_string(),
                keyword_type: AnswerType::ProperNoun,
                specificity_score: 0.5,
                confidence: 0.5,
            });
        }
    }
    for year in text::years(parent_question) {
        keywords.push(Keyword {
            position: 0,
            text: year,
            parent_context: parent_question.to_string(),
            keyword_type: AnswerType::Date,
            specificity_score: 0.4,
            confidence: 0.5,
        });
    }
    keywords
}

/// Post-filters a raw keyword list: drop stopwords/question words,
/// duplicates, and any keyword identical to the parent's own answer; caps
/// at [`MAX_KEYWORDS`].
fn post_filter(keywords: Vec<Keyword>, parent_answer: &str) -> Vec<Keyword> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let normalized_answer = text::normalize(parent_answer);
    for keyword in keywords {
        let normalized = text::normalize(&keyword.text);
        if normalized.is_empty() || text::is_stopword(&normalized) {
            continue;
        }
        if crate::config::QuestionWord::leading_word(&keyword.text).is_some() && keyword.text.split_whitespace().count() == 1 {
            continue;
        }
        if normalized == normalized_answer {
            continue;
        }
        if !seen.insert(normalized) {
            continue;
        }
        out.push(keyword);
        if out.len() >= MAX_KEYWORDS {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::llm::StubLlmGateway;

    fn keyword(text: &str) -> Keyword {
        Keyword {
            text: text.to_string(),
            parent_context: "ctx".into(),
            keyword_type: AnswerType::ProperNoun,
            specificity_score: 0.7,
            confidence: 0.8,
            position: 0,
        }
    }

    #[test]
    fn validate_child_answer_exact_match() {
        let parent_keywords = vec![keyword("Hubble"), keyword("2021")];
        let result = KeywordHierarchyManager::validate_child_answer("2021", &parent_keywords);
        assert!(result.accepted);
        assert_eq!(result.rule, Some(1));
    }

    #[test]
    fn validate_child_answer_rejects_unrelated() {
        let parent_keywords = vec![keyword("Hubble"), keyword("2021")];
        let result = KeywordHierarchyManager::validate_child_answer("Spitzer", &parent_keywords);
        assert!(!result.accepted);
    }

    #[test]
    fn validate_child_answer_variant_abbreviation() {
        let parent_keywords = vec![keyword("United States")];
        let result = KeywordHierarchyManager::validate_child_answer("USA", &parent_keywords);
        assert!(result.accepted);
        assert_eq!(result.rule, Some(2));
    }

    #[test]
    fn validate_child_answer_proper_noun_extension() {
        let parent_keywords = vec![keyword("James Webb")];
        let result = KeywordHierarchyManager::validate_child_answer("James Webb Telescope", &parent_keywords);
        assert!(result.accepted);
        assert_eq!(result.rule, Some(3));
    }

    #[test]
    fn validate_child_answer_technical_relation_diversity() {
        let parent_keywords = vec![keyword("Telescope")];
        let result = KeywordHierarchyManager::validate_child_answer("mirror", &parent_keywords);
        assert!(result.accepted);
        assert_eq!(result.rule, Some(5));
    }

    #[test]
    fn minimum_keyword_check_bounds_essential_count() {
        let keywords = vec![keyword("James Webb"), keyword("2021"), keyword("NASA")];
        let check = KeywordHierarchyManager::minimum_keyword_check(&keywords, "James Webb Space Telescope");
        assert!(check.essential.len() < keywords.len());
    }

    #[test]
    fn shortcut_check_rejects_sibling_leakage() {
        let result = KeywordHierarchyManager::check_shortcut(
            "Which company founded in 2015 released ChatGPT in 2022?",
            &["OpenAI".to_string()],
            &["2022".to_string()],
        );
        assert!(!result.passed);
    }

    #[test]
    fn shortcut_check_passes_well_formed_question() {
        let result = KeywordHierarchyManager::check_shortcut(
            "Which instrument does the observatory use to capture infrared light?",
            &["James Webb".to_string()],
            &["NASA".to_string()],
        );
        assert!(result.passed);
    }

    #[tokio::test]
    async fn extract_parses_llm_json_and_caps_at_max() {
        let response = r#"[{"text":"Hubble","type":"proper_noun"},{"text":"2021","type":"date"},{"text":"NASA","type":"proper_noun"},{"text":"telescope","type":"technical_term"},{"text":"space","type":"technical_term"},{"text":"orbit","type":"technical_term"}]"#;
        let llm = StubLlmGateway::new(response);
        let manager = KeywordHierarchyManager::new(&llm);
        let keywords = manager
            .extract("Which telescope succeeded Hubble in 2021?", "James Webb Space Telescope", None)
            .await;
        assert!(keywords.len() <= MAX_KEYWORDS);
    }

    #[test]
    fn extract_diverse_falls_back_to_technical_relations() {
        let llm = StubLlmGateway::new("[]");
        let manager = KeywordHierarchyManager::new(&llm);
        let base = vec![keyword("Telescope")];
        let used = HashSet::new();
        let diverse = manager.extract_diverse(base, &used);
        assert!(diverse.len() >= 2);
    }
}
