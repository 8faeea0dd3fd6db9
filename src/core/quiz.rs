use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::constants::QUIZ_PASSING_PERCENT;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizScore {
    pub correct: usize,
    pub total: usize,
}

impl QuizScore {
    pub fn record(&mut self, was_correct: bool) {
        self.total += 1;
        if was_correct {
            self.correct += 1;
        }
    }

    pub fn percent(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            self.correct * 100 / self.total
        }
    }

    /// An empty quiz never passes.
    pub fn passed(&self) -> bool {
        self.total > 0 && self.correct * 100 >= self.total * QUIZ_PASSING_PERCENT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct_answer: usize,
}

/// Score `answers` (question id → chosen option index). Unanswered
/// questions count as wrong.
pub fn score_answers(questions: &[QuizQuestion], answers: &HashMap<String, usize>) -> QuizScore {
    let mut score = QuizScore::default();
    for question in questions {
        score.record(answers.get(&question.id) == Some(&question.correct_answer));
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, correct: usize) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            question: format!("question {id}"),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_answer: correct,
        }
    }

    #[test]
    fn exactly_eighty_percent_passes() {
        let score = QuizScore {
            correct: 4,
            total: 5,
        };
        assert!(score.passed());
        assert_eq!(score.percent(), 80);

        let below = QuizScore {
            correct: 3,
            total: 4,
        };
        assert!(!below.passed());
    }

    #[test]
    fn empty_quiz_does_not_pass() {
        assert!(!QuizScore::default().passed());
        assert_eq!(QuizScore::default().percent(), 0);
    }

    #[test]
    fn unanswered_questions_count_against_the_score() {
        let questions = vec![question("q1", 0), question("q2", 2), question("q3", 1)];
        let answers = HashMap::from([("q1".to_string(), 0), ("q2".to_string(), 1)]);
        let score = score_answers(&questions, &answers);
        assert_eq!(score, QuizScore { correct: 1, total: 3 });
        assert!(!score.passed());
    }

    #[test]
    fn question_payload_uses_camel_case() {
        let json = r#"{"id":"q1","question":"?","options":["x","y"],"correctAnswer":1}"#;
        let parsed: QuizQuestion = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.correct_answer, 1);
    }
}
