//! Client for the external question generator.
//!
//! The generator wraps a generative model and is only trusted at its interface:
//! it may return fewer questions than asked, wrap JSON in markdown fences, or
//! report a failure inside a 200 response.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{Level, RawQuestion};

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"```(?:json|JSON)?").unwrap();
    static ref JSON_ARRAY: Regex = Regex::new(r"(?s)\[.*\]").unwrap();
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub domain: String,
    pub sub_domain: String,
    pub number_of_questions: u32,
    pub level: Level,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator request failed: {0}")]
    Transport(String),

    #[error("generator timed out after {0:?}")]
    Timeout(Duration),

    #[error("generator returned error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("generator reported failure: {0}")]
    Reported(String),

    #[error("generator output could not be parsed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<RawQuestion>, GenerationError>;
}

/// Calls the generator service over HTTP
pub struct HttpQuestionGenerator {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpQuestionGenerator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/generate-quiz/", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl QuestionGenerator for HttpQuestionGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<RawQuestion>, GenerationError> {
        let url = self.endpoint();

        tracing::debug!(
            "Calling question generator: {} with domain={}, sub_domain={}, count={}, level={}",
            url,
            request.domain,
            request.sub_domain,
            request.number_of_questions,
            request.level.as_str()
        );

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout)
                } else {
                    GenerationError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout)
            } else {
                GenerationError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let questions = parse_generator_output(&body)?;

        tracing::info!(
            "Generator returned {} questions for {}/{} (requested {})",
            questions.len(),
            request.domain,
            request.sub_domain,
            request.number_of_questions
        );

        Ok(questions)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GeneratorPayload {
    Questions(Vec<RawQuestion>),
    Wrapped {
        #[serde(default)]
        questions: Vec<RawQuestion>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Parses a generator body: a JSON array, `{ "questions": [...] }`, an
/// `{ "error": ... }` report, or model text with the array embedded in it.
pub fn parse_generator_output(body: &str) -> Result<Vec<RawQuestion>, GenerationError> {
    let cleaned = CODE_FENCE.replace_all(body, "");
    let cleaned = cleaned.trim();

    match serde_json::from_str::<GeneratorPayload>(cleaned) {
        Ok(GeneratorPayload::Questions(questions)) => return Ok(questions),
        Ok(GeneratorPayload::Wrapped {
            error: Some(error), ..
        }) => return Err(GenerationError::Reported(error)),
        Ok(GeneratorPayload::Wrapped { questions, .. }) => return Ok(questions),
        Err(e) => tracing::debug!("Generator output is not plain JSON ({}), scanning for array", e),
    }

    let embedded = JSON_ARRAY
        .find(cleaned)
        .ok_or_else(|| GenerationError::Malformed(truncate(cleaned, 200)))?;

    serde_json::from_str::<Vec<RawQuestion>>(embedded.as_str())
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_array() {
        let body = r#"[{"id": 1, "question": "Q?", "options": ["a","b","c","d"], "correct_answers": ["a"], "explanation": "e"}]"#;
        let questions = parse_generator_output(body).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question, "Q?");
    }

    #[test]
    fn parses_wrapped_questions() {
        let body = r#"{"questions": [{"question": "Q1"}, {"question": "Q2"}]}"#;
        let questions = parse_generator_output(body).unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn reported_error_is_a_failure() {
        let body = r#"{"error": "Error generating quiz: quota exceeded", "questions": []}"#;
        let err = parse_generator_output(body).unwrap_err();
        assert!(matches!(err, GenerationError::Reported(msg) if msg.contains("quota")));
    }

    #[test]
    fn strips_markdown_fences() {
        let body = "```json\n[{\"question\": \"Fenced?\"}]\n```";
        let questions = parse_generator_output(body).unwrap();
        assert_eq!(questions[0].question, "Fenced?");
    }

    #[test]
    fn extracts_array_from_surrounding_text() {
        let body = "Here are your questions:\n[{\"question\": \"Embedded?\"}]\nGood luck!";
        let questions = parse_generator_output(body).unwrap();
        assert_eq!(questions[0].question, "Embedded?");
    }

    #[test]
    fn string_ids_do_not_reject_the_batch() {
        let body = r#"[{"id": "1", "question": "Q1", "options": ["a","b"], "correct_answers": ["a"], "explanation": "e"},
                       {"id": 2, "question": "Q2"}]"#;
        let questions = parse_generator_output(body).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question, "Q1");
    }

    #[test]
    fn null_fields_are_read_as_empty() {
        let body = r#"[{"question": "Q1", "options": null, "correct_answers": null, "explanation": null, "sub_topic": null},
                       {"question": null, "options": ["a","b"], "correct_answers": ["b"], "explanation": "e"}]"#;
        let questions = parse_generator_output(body).unwrap();
        assert_eq!(questions.len(), 2);
        assert!(questions[0].options.is_empty());
        assert!(questions[0].explanation.is_empty());
        assert!(questions[1].question.is_empty());
        assert_eq!(questions[1].correct_answers, vec!["b".to_string()]);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_generator_output("the model refused").unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let generator = HttpQuestionGenerator::new("http://gen:8000/", Duration::from_secs(1));
        assert_eq!(generator.endpoint(), "http://gen:8000/generate-quiz/");
    }
}
