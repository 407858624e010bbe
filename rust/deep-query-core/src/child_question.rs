//! Child Question Generator.
//!
//! Produces a question whose unique answer *is* a given parent keyword,
//! stylistically consistent with the parent question's wh-word where
//! possible, rooted in the synthesized extension context.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QuestionWord;
use crate::model::{AnswerType, ExtensionContext, ExtensionType, Question, QuestionType};
use crate::gateway::llm::LlmGateway;
use crate::text;

const MAX_ATTEMPTS: usize = 3;

/// Allowed wh-words per answer type, in preference order.
fn candidate_words(answer_type: AnswerType) -> &'static [QuestionWord] {
    match answer_type {
        AnswerType::ProperNoun => &[QuestionWord::What, QuestionWord::Which, QuestionWord::Who],
        AnswerType::Number => &[QuestionWord::What, QuestionWord::When],
        AnswerType::Date => &[QuestionWord::When],
        AnswerType::Location => &[QuestionWord::Where],
        AnswerType::TechnicalTerm => &[QuestionWord::What, QuestionWord::Which],
    }
}

fn to_question_type(word: QuestionWord) -> QuestionType {
    match word {
        QuestionWord::What => QuestionType::What,
        QuestionWord::Which => QuestionType::Which,
        QuestionWord::Who => QuestionType::Who,
        QuestionWord::When => QuestionType::When,
        QuestionWord::Where => QuestionType::Where,
    }
}

pub struct ChildQuestionGenerator<'a> {
    llm: &'a dyn LlmGateway,
}

impl<'a> ChildQuestionGenerator<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmGateway) -> Self {
        Self { llm }
    }

    /// Returns `None` if no template attempt passes the surface checks.
    pub async fn generate(
        &self,
        parent_question: &Question,
        target_keyword: &str,
        target_answer_type: AnswerType,
        extension_context: &ExtensionContext,
        extension_type: ExtensionType,
    ) -> Option<Question> {
        let words = candidate_words(target_answer_type);
        let parent_word = QuestionWord::leading_word(&parent_question.text);
        let ordered_words = style_consistent_order(words, parent_word);

        for (attempt, word) in ordered_words.iter().enumerate().take(MAX_ATTEMPTS) {
            let prompt = build_prompt(*word, target_keyword, extension_context, extension_type);
            let raw = match self.llm.generate(&prompt, 0.0, 128).await {
                Ok(text) => text,
                Err(err) => {
                    warn!(attempt, error = %err, "child question generation LLM call failed");
                    continue;
                }
            };
            let candidate_text = raw.trim().to_string();

            if surface_checks_pass(&candidate_text, target_keyword) {
                info!(attempt, target_keyword, "child question accepted");
                return Some(Question {
                    question_id: Uuid::new_v4().to_string(),
                    text: candidate_text,
                    expected_answer: target_keyword.to_string(),
                    question_type: to_question_type(*word),
                    answer_type: target_answer_type,
                    level: parent_question.level + 1,
                    parent_id: Some(parent_question.question_id.clone()),
                    keywords: Vec::new(),
                    validation_score: 0.0,
                });
            }
            debug!(attempt, "child question candidate failed surface checks");
        }
        None
    }
}

fn style_consistent_order(words: &'static [QuestionWord], parent_word: Option<QuestionWord>) -> Vec<QuestionWord> {
    let mut ordered = Vec::with_capacity(words.len());
    if let Some(parent) = parent_word {
        if words.contains(&parent) {
            ordered.push(parent);
        }
    }
    for word in words {
        if !ordered.contains(word) {
            ordered.push(*word);
        }
    }
    ordered
}

fn build_prompt(
    word: QuestionWord,
    target_keyword: &str,
    extension_context: &ExtensionContext,
    extension_type: ExtensionType,
) -> String {
    let stance = match extension_type {
        ExtensionType::Series => "deepen the reader's understanding of",
        ExtensionType::Parallel => "explore an alternative angle on",
        ExtensionType::Root => "introduce",
    };
    format!(
        "Using only the passage below, write a single {word} question (never \"how\" or \
         \"why\") whose unique, objectively verifiable answer is \"{target_keyword}\". The \
         question should {stance} the passage's subject. Do not include the phrase \
         \"{target_keyword}\" inside the question. Root the question in the passage's content, \
         not common knowledge. Respond with only the question text, ending in \"?\".\n\nPassage:\n{}",
        extension_context.synthesized_text,
        word = word.as_str(),
    )
}

/// Surface checks reused from root question generation, plus the no-literal-keyword check.
fn surface_checks_pass(candidate: &str, target_keyword: &str) -> bool {
    let trimmed = candidate.trim();
    if !trimmed.ends_with('?') {
        return false;
    }
    if QuestionWord::leading_word(trimmed).is_none() {
        return false;
    }
    if contains_how_or_why(trimmed) {
        return false;
    }
    if text::leaks_answer(trimmed, target_keyword).is_some() {
        return false;
    }
    true
}

fn contains_how_or_why(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.split_whitespace().any(|w| w == "how" || w == "why")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::llm::StubLlmGateway;
    use crate::gateway::search::SearchResult;
    use crate::model::{AnswerType, QuestionType};

    fn parent() -> Question {
        Question {
            question_id: "root".into(),
            text: "Which telescope succeeded Hubble in 2021?".into(),
            expected_answer: "James Webb Space Telescope".into(),
            question_type: QuestionType::Which,
            answer_type: AnswerType::ProperNoun,
            level: 1,
            parent_id: None,
            keywords: vec!["Hubble".into(), "2021".into()],
            validation_score: 0.9,
        }
    }

    fn extension_context() -> ExtensionContext {
        ExtensionContext {
            target_keyword: "Hubble".into(),
            search_query: "Hubble history".into(),
            snippets: vec![SearchResult {
                url: "https://example.com".into(),
                title: "Hubble".into(),
                content: "Hubble launched in 1990.".into(),
                rank: 1,
            }],
            synthesized_text: "An earlier observatory launched in 1990 studied deep space for decades.".into(),
            confidence: 0.8,
        }
    }

    #[tokio::test]
    async fn accepts_well_formed_candidate_matching_parent_style() {
        let llm = StubLlmGateway::new("Which observatory launched in 1990 studied deep space for decades?");
        let generator = ChildQuestionGenerator::new(&llm);
        let question = generator
            .generate(&parent(), "Hubble", AnswerType::ProperNoun, &extension_context(), ExtensionType::Series)
            .await;
        assert!(question.is_some());
        let question = question.unwrap();
        assert_eq!(question.expected_answer, "Hubble");
        assert_eq!(question.level, 2);
        assert_eq!(question.parent_id, Some("root".to_string()));
    }

    #[tokio::test]
    async fn rejects_candidate_with_how() {
        let llm = StubLlmGateway::new("How did the earlier observatory study deep space?");
        let generator = ChildQuestionGenerator::new(&llm);
        let question = generator
            .generate(&parent(), "Hubble", AnswerType::ProperNoun, &extension_context(), ExtensionType::Series)
            .await;
        assert!(question.is_none());
    }

    #[test]
    fn style_consistent_order_prefers_parent_word() {
        let words = candidate_words(AnswerType::ProperNoun);
        let ordered = style_consistent_order(words, Some(QuestionWord::Which));
        assert_eq!(ordered[0], QuestionWord::Which);
    }
}
