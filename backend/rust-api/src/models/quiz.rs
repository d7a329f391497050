use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::utils::time::bson_datetime_as_chrono;

pub const MIN_QUESTIONS_PER_QUIZ: i64 = 1;
pub const MAX_QUESTIONS_PER_QUIZ: i64 = 20;
const DEFAULT_QUESTIONS_PER_QUIZ: i64 = 10;

/// Authenticated user reference. Every manager operation receives it explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Incomplete,
    Completed,
}

impl QuizStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Incomplete => "incomplete",
            QuizStatus::Completed => "completed",
        }
    }
}

/// Difficulty requested from the question generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Easy,
    Medium,
    Hard,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Easy => "easy",
            Level::Medium => "medium",
            Level::Hard => "hard",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Level::Easy),
            "medium" => Ok(Level::Medium),
            "hard" => Ok(Level::Hard),
            other => Err(format!(
                "level must be one of easy, medium, hard (got '{}')",
                other
            )),
        }
    }
}

/// A question as stored in a session. The set is fixed once the session exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// 1-based ordinal within the session
    pub id: u32,
    #[serde(rename = "question", alias = "text")]
    pub text: String,
    pub options: Vec<String>,
    pub correct_answers: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_topic: Option<String>,
    /// Filler inserted when the generator under-delivers
    #[serde(default)]
    pub is_placeholder: bool,
}

/// One generated item, before normalization. Missing or `null` fields fall back
/// to their defaults; the normalizer decides what the stored question looks like.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuestion {
    /// Whatever the generator sent; ids are reassigned during normalization
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, alias = "text", deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub correct_answers: Vec<String>,
    /// Older generator builds returned a single correct option
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub explanation: String,
    #[serde(default)]
    pub sub_topic: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The option strings a user submitted for one question.
///
/// Accepts a list, a single string, or `null` on the wire; an empty set is an
/// unanswered slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SubmittedAnswer")]
pub struct AnswerSet(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum SubmittedAnswer {
    Many(Option<Vec<String>>),
    One(String),
}

impl From<SubmittedAnswer> for AnswerSet {
    fn from(value: SubmittedAnswer) -> Self {
        match value {
            SubmittedAnswer::Many(values) => AnswerSet(values.unwrap_or_default()),
            SubmittedAnswer::One(value) => AnswerSet(vec![value]),
        }
    }
}

impl AnswerSet {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AnswerSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        AnswerSet(iter.into_iter().map(Into::into).collect())
    }
}

/// Quiz attempt stored in MongoDB "quiz_sessions" collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner: Owner,
    pub domain: String,
    pub sub_domain: String,
    pub level: Level,
    pub questions: Vec<Question>,
    /// Parallel to `questions` by index, may be shorter while in progress
    #[serde(default)]
    pub user_answers: Vec<AnswerSet>,
    #[serde(default)]
    pub current_index: u32,
    pub status: QuizStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Bumped on every write; used as the optimistic concurrency token
    #[serde(default)]
    pub version: i64,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl QuizSession {
    pub fn is_completed(&self) -> bool {
        self.status == QuizStatus::Completed
    }
}

fn default_question_count() -> i64 {
    DEFAULT_QUESTIONS_PER_QUIZ
}

/// Body of the create-or-resume call
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "domain must be between 1 and 100 characters"
    ))]
    pub domain: String,

    #[validate(length(
        min = 1,
        max = 100,
        message = "sub_domain must be between 1 and 100 characters"
    ))]
    pub sub_domain: String,

    #[serde(default = "default_question_count", alias = "number_of_questions")]
    #[validate(range(
        min = MIN_QUESTIONS_PER_QUIZ,
        max = MAX_QUESTIONS_PER_QUIZ,
        message = "count must be between 1 and 20"
    ))]
    pub count: i64,

    pub level: String,
}

/// Partial update: only the provided fields are written
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveProgressRequest {
    #[serde(default)]
    pub user_answers: Option<Vec<AnswerSet>>,
    #[serde(default, alias = "current_question_index")]
    pub current_index: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteQuizRequest {
    pub user_answers: Vec<AnswerSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub domain: Option<String>,
    pub sub_domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeQuery {
    pub domain: String,
    pub sub_domain: String,
}

/// Session as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct QuizSessionResponse {
    pub session_id: String,
    pub domain: String,
    pub sub_domain: String,
    pub level: Level,
    pub questions: Vec<Question>,
    pub user_answers: Vec<AnswerSet>,
    pub current_index: u32,
    pub status: QuizStatus,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<QuizSession> for QuizSessionResponse {
    fn from(session: QuizSession) -> Self {
        QuizSessionResponse {
            session_id: session.id,
            domain: session.domain,
            sub_domain: session.sub_domain,
            level: session.level,
            questions: session.questions,
            user_answers: session.user_answers,
            current_index: session.current_index,
            status: session.status,
            score: session.score,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateQuizResponse {
    #[serde(flatten)]
    pub session: QuizSessionResponse,
    /// true when an existing incomplete session was returned
    pub resumed: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressAck {
    pub session_id: String,
    pub current_index: u32,
    pub answered: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&QuizSession> for ProgressAck {
    fn from(session: &QuizSession) -> Self {
        ProgressAck {
            session_id: session.id.clone(),
            current_index: session.current_index,
            answered: session
                .user_answers
                .iter()
                .filter(|answer| !answer.is_empty())
                .count(),
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub sessions: Vec<QuizSessionResponse>,
    pub total: usize,
}
