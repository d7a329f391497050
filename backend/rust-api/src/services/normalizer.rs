use crate::models::{Question, RawQuestion};

pub const PLACEHOLDER_TEXT: &str = "[placeholder] Question unavailable";
pub const PLACEHOLDER_ANSWER: &str = "N/A";
pub const PLACEHOLDER_EXPLANATION: &str =
    "Auto-generated placeholder: the generator returned fewer questions than requested.";

/// Turns generator output into the stored question set.
///
/// Ids are always reassigned 1..N in input order. Short sets are padded with
/// placeholder questions up to `requested`; longer sets are kept as-is.
/// Options and correct answers are passed through without validation.
pub fn normalize_question_set(raw: Vec<RawQuestion>, requested: usize) -> Vec<Question> {
    let generated = raw.len();
    let mut questions: Vec<Question> = raw
        .into_iter()
        .zip(1u32..)
        .map(|(item, id)| from_raw(item, id))
        .collect();

    if generated < requested {
        tracing::warn!(
            generated,
            requested,
            "Generator under-delivered, padding with placeholder questions"
        );
    }

    while questions.len() < requested {
        let id = questions.len() as u32 + 1;
        questions.push(placeholder(id));
    }

    questions
}

fn from_raw(raw: RawQuestion, id: u32) -> Question {
    let correct_answers = if raw.correct_answers.is_empty() {
        raw.correct_answer.into_iter().collect()
    } else {
        raw.correct_answers
    };

    Question {
        id,
        text: raw.question,
        options: raw.options,
        correct_answers,
        explanation: raw.explanation,
        sub_topic: raw.sub_topic,
        is_placeholder: false,
    }
}

fn placeholder(id: u32) -> Question {
    Question {
        id,
        text: PLACEHOLDER_TEXT.to_string(),
        options: vec![PLACEHOLDER_ANSWER.to_string()],
        correct_answers: vec![PLACEHOLDER_ANSWER.to_string()],
        explanation: PLACEHOLDER_EXPLANATION.to_string(),
        sub_topic: None,
        is_placeholder: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str, id: Option<u32>) -> RawQuestion {
        RawQuestion {
            id: id.map(serde_json::Value::from),
            question: text.to_string(),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answers: vec!["A".into()],
            explanation: "because".into(),
            ..Default::default()
        }
    }

    #[test]
    fn pads_short_sets_with_placeholders() {
        let input = vec![raw("q1", None), raw("q2", None), raw("q3", None)];

        let questions = normalize_question_set(input, 5);

        assert_eq!(questions.len(), 5);
        let ids: Vec<u32> = questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(questions[..3].iter().all(|q| !q.is_placeholder));
        assert!(questions[3..].iter().all(|q| q.is_placeholder));
        assert_eq!(questions[4].text, PLACEHOLDER_TEXT);
        assert_eq!(questions[4].correct_answers, vec![PLACEHOLDER_ANSWER]);
    }

    #[test]
    fn reassigns_ids_sequentially() {
        let input = vec![raw("q1", Some(7)), raw("q2", Some(7)), raw("q3", None)];

        let questions = normalize_question_set(input, 3);

        let ids: Vec<u32> = questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(questions[0].text, "q1");
    }

    #[test]
    fn never_truncates_oversized_sets() {
        let input = (0..4).map(|i| raw(&format!("q{}", i), None)).collect();

        let questions = normalize_question_set(input, 2);

        assert_eq!(questions.len(), 4);
    }

    #[test]
    fn folds_legacy_single_correct_answer() {
        let mut item = raw("q1", None);
        item.correct_answers.clear();
        item.correct_answer = Some("B".into());

        let questions = normalize_question_set(vec![item], 1);

        assert_eq!(questions[0].correct_answers, vec!["B"]);
    }

    #[test]
    fn malformed_questions_pass_through() {
        let mut item = raw("q1", None);
        item.options.clear();

        let questions = normalize_question_set(vec![item], 1);

        assert!(questions[0].options.is_empty());
        assert!(!questions[0].is_placeholder);
    }

    #[test]
    fn empty_generator_output_is_all_placeholders() {
        let questions = normalize_question_set(Vec::new(), 2);
        assert_eq!(questions.len(), 2);
        assert!(questions.iter().all(|q| q.is_placeholder));
    }
}
