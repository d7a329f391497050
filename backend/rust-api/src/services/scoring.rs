use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{AnswerSet, Question};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreReport {
    pub correct: usize,
    pub total: usize,
    /// Percentage rounded to two decimals
    pub score: f64,
}

/// Trim + lower-case every element and collapse into a set
pub fn normalize_answer_set<'a, I>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    values
        .into_iter()
        .map(|value| value.trim().to_lowercase())
        .collect()
}

/// Exact set equality after normalization. An empty submission never matches.
pub fn answer_matches(question: &Question, answer: &AnswerSet) -> bool {
    if answer.is_empty() {
        return false;
    }
    normalize_answer_set(answer.values()) == normalize_answer_set(&question.correct_answers)
}

/// Scores a quiz. Questions without a submitted answer count as incorrect.
pub fn score_answers(questions: &[Question], user_answers: &[AnswerSet]) -> ScoreReport {
    let total = questions.len();
    let correct = questions
        .iter()
        .zip(user_answers)
        .filter(|(question, answer)| answer_matches(question, answer))
        .count();

    let score = if total == 0 {
        0.0
    } else {
        round_to_hundredths(correct as f64 / total as f64 * 100.0)
    };

    ScoreReport {
        correct,
        total,
        score,
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: u32, correct: &[&str]) -> Question {
        Question {
            id,
            text: format!("Question {}", id),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answers: correct.iter().map(|s| s.to_string()).collect(),
            explanation: String::new(),
            sub_topic: None,
            is_placeholder: false,
        }
    }

    fn answer(values: &[&str]) -> AnswerSet {
        values.iter().copied().collect()
    }

    #[test]
    fn multi_select_is_case_whitespace_and_order_insensitive() {
        let q = question(1, &["A", "B"]);
        assert!(answer_matches(&q, &answer(&["b", " a "])));
        assert!(answer_matches(&q, &answer(&["A", "a", "B"])));
    }

    #[test]
    fn subset_or_superset_is_incorrect() {
        let q = question(1, &["A", "B"]);
        assert!(!answer_matches(&q, &answer(&["A"])));
        assert!(!answer_matches(&q, &answer(&["A", "B", "C"])));
    }

    #[test]
    fn empty_submission_is_incorrect() {
        let q = question(1, &["A"]);
        assert!(!answer_matches(&q, &AnswerSet::default()));
    }

    #[test]
    fn unanswered_trailing_questions_count_as_wrong() {
        let questions = vec![
            question(1, &["A"]),
            question(2, &["B", "C"]),
            question(3, &["D"]),
            question(4, &["A"]),
        ];
        let answers = vec![answer(&["a"]), answer(&["c", "b"]), answer(&["D "])];

        let report = score_answers(&questions, &answers);

        assert_eq!(report.correct, 3);
        assert_eq!(report.total, 4);
        assert_eq!(report.score, 75.0);
    }

    #[test]
    fn score_is_rounded_to_two_decimals() {
        let questions = vec![question(1, &["A"]), question(2, &["A"]), question(3, &["A"])];

        let one = score_answers(&questions, &[answer(&["A"])]);
        assert_eq!(one.score, 33.33);

        let two = score_answers(&questions, &[answer(&["A"]), answer(&["A"])]);
        assert_eq!(two.score, 66.67);
    }

    #[test]
    fn no_questions_scores_zero() {
        let report = score_answers(&[], &[answer(&["A"])]);
        assert_eq!(report.total, 0);
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn extra_answers_are_ignored() {
        let questions = vec![question(1, &["A"])];
        let report = score_answers(&questions, &[answer(&["A"]), answer(&["B"])]);
        assert_eq!(report.correct, 1);
        assert_eq!(report.score, 100.0);
    }
}
