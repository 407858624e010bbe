//! Circular-Question Detector.
//!
//! Maintains a per-document history of `(question, answer, question_type,
//! answer_type, keyword)` tuples and flags a new candidate that trivially
//! reproduces already-known content.

use crate::model::{AnswerType, QuestionType};
use crate::text;

/// One already-constructed node, as seen by the detector.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub question_text: String,
    pub answer: String,
    pub question_type: QuestionType,
    pub answer_type: AnswerType,
    pub keyword: String,
}

/// Outcome of a circularity check.
#[derive(Debug, Clone)]
pub struct CircularCheck {
    pub is_circular: bool,
    pub reason: Option<String>,
    pub suggestions: Vec<String>,
}

/// Per-document detector state. One instance per document being processed.
#[derive(Debug, Default)]
pub struct CircularQuestionDetector {
    history: Vec<HistoryEntry>,
}

impl CircularQuestionDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    /// Checks a candidate `(question_text, answer, question_type,
    /// answer_type, keyword)` against the recorded history.
    #[must_use]
    pub fn check(
        &self,
        question_text: &str,
        answer: &str,
        question_type: QuestionType,
        answer_type: AnswerType,
        keyword: &str,
    ) -> CircularCheck {
        if let Some(reason) = self.exact_reversal(answer) {
            return CircularCheck {
                is_circular: true,
                reason: Some(reason),
                suggestions: vec!["choose a different target keyword".to_string()],
            };
        }
        if let Some(reason) = self.substring_collision(question_text) {
            return CircularCheck {
                is_circular: true,
                reason: Some(reason),
                suggestions: vec!["rephrase to avoid restating a known answer".to_string()],
            };
        }
        if let Some(reason) = self.template_loop(question_type, answer_type, keyword) {
            return CircularCheck {
                is_circular: true,
                reason: Some(reason),
                suggestions: vec!["vary the question type or target a different keyword".to_string()],
            };
        }
        CircularCheck {
            is_circular: false,
            reason: None,
            suggestions: Vec::new(),
        }
    }

    fn exact_reversal(&self, answer: &str) -> Option<String> {
        let normalized_answer = text::normalize(answer);
        self.history
            .iter()
            .find(|entry| text::normalize(&entry.answer) == normalized_answer)
            .map(|entry| format!("answer \"{answer}\" already appears as the answer to \"{}\"", entry.question_text))
    }

    fn substring_collision(&self, question_text: &str) -> Option<String> {
        self.history.iter().find_map(|entry| {
            text::leaks_answer(question_text, &entry.answer)
                .map(|_| format!("question text contains already-known answer \"{}\"", entry.answer))
        })
    }

    fn template_loop(&self, question_type: QuestionType, answer_type: AnswerType, keyword: &str) -> Option<String> {
        let normalized_keyword = text::normalize(keyword);
        self.history
            .iter()
            .find(|entry| {
                entry.question_type == question_type
                    && entry.answer_type == answer_type
                    && text::normalize(&entry.keyword) == normalized_keyword
            })
            .map(|_| format!("(question_type, answer_type, keyword) triple already produced for \"{keyword}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question_text: &str, answer: &str) -> HistoryEntry {
        HistoryEntry {
            question_text: question_text.to_string(),
            answer: answer.to_string(),
            question_type: QuestionType::When,
            answer_type: AnswerType::Date,
            keyword: "2021".to_string(),
        }
    }

    #[test]
    fn flags_exact_reversal() {
        let mut detector = CircularQuestionDetector::new();
        detector.record(entry("When did James Webb launch?", "2021"));
        let result = detector.check(
            "In what year was the James Webb Space Telescope launched?",
            "2021",
            QuestionType::When,
            AnswerType::Date,
            "2021",
        );
        assert!(result.is_circular);
    }

    #[test]
    fn flags_template_loop_without_reversal() {
        let mut detector = CircularQuestionDetector::new();
        detector.record(HistoryEntry {
            question_text: "When did the mission launch?".into(),
            answer: "March".into(),
            question_type: QuestionType::When,
            answer_type: AnswerType::Date,
            keyword: "launch date".into(),
        });
        let result = detector.check(
            "When did the program begin operations?",
            "April",
            QuestionType::When,
            AnswerType::Date,
            "launch date",
        );
        assert!(result.is_circular);
    }

    #[test]
    fn passes_genuinely_novel_question() {
        let mut detector = CircularQuestionDetector::new();
        detector.record(entry("When did James Webb launch?", "2021"));
        let result = detector.check(
            "Which agency operates the observatory?",
            "NASA",
            QuestionType::Which,
            AnswerType::ProperNoun,
            "NASA",
        );
        assert!(!result.is_circular);
    }
}
