//! Persistence boundary for quiz sessions.
//!
//! Implementations must make `create_if_absent_incomplete` atomic per
//! (owner, domain, sub_domain): two concurrent callers can never both observe
//! `created = true` for the same key.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

use crate::models::{AnswerSet, Level, Owner, Question, QuizSession, QuizStatus};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryQuizSessionStore;
pub use mongo::MongoQuizSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Quiz session not found")]
    NotFound,

    #[error("Quiz session changed since it was read (expected version {expected})")]
    Conflict { expected: i64 },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything needed to persist a fresh incomplete session
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub owner: Owner,
    pub domain: String,
    pub sub_domain: String,
    pub level: Level,
    pub questions: Vec<Question>,
}

impl SessionDraft {
    pub fn into_session(self, id: String, now: DateTime<Utc>) -> QuizSession {
        let now = stored_precision(now);
        QuizSession {
            id,
            owner: self.owner,
            domain: self.domain,
            sub_domain: self.sub_domain,
            level: self.level,
            questions: self.questions,
            user_answers: Vec::new(),
            current_index: 0,
            status: QuizStatus::Incomplete,
            score: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field-level changes applied by `update`. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMutation {
    pub user_answers: Option<Vec<AnswerSet>>,
    pub current_index: Option<u32>,
    pub status: Option<QuizStatus>,
    pub score: Option<f64>,
}

impl SessionMutation {
    pub fn progress(user_answers: Option<Vec<AnswerSet>>, current_index: Option<u32>) -> Self {
        Self {
            user_answers,
            current_index,
            ..Default::default()
        }
    }

    pub fn completion(user_answers: Vec<AnswerSet>, score: f64, current_index: u32) -> Self {
        Self {
            user_answers: Some(user_answers),
            current_index: Some(current_index),
            status: Some(QuizStatus::Completed),
            score: Some(score),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_answers.is_none()
            && self.current_index.is_none()
            && self.status.is_none()
            && self.score.is_none()
    }

    /// Applies the mutation and bumps `version` / `updated_at`
    pub fn apply_to(&self, session: &mut QuizSession, now: DateTime<Utc>) {
        if let Some(answers) = &self.user_answers {
            session.user_answers = answers.clone();
        }
        if let Some(index) = self.current_index {
            session.current_index = index;
        }
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(score) = self.score {
            session.score = Some(score);
        }
        session.version += 1;
        session.updated_at = stored_precision(now);
    }
}

/// BSON datetimes hold milliseconds; sessions handed out before a round trip
/// must carry the same value a later read returns.
fn stored_precision(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(3)
}

#[async_trait]
pub trait QuizSessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> StoreResult<Option<QuizSession>>;

    async fn find_incomplete(
        &self,
        owner: &Owner,
        domain: &str,
        sub_domain: &str,
    ) -> StoreResult<Option<QuizSession>>;

    /// Returns the stored session and whether this call created it. When an
    /// incomplete session already exists for the key it is returned instead and
    /// the draft is discarded.
    async fn create_if_absent_incomplete(
        &self,
        draft: SessionDraft,
    ) -> StoreResult<(QuizSession, bool)>;

    /// Applies `mutation`. With `expected_version` set, fails with `Conflict`
    /// when the stored version differs.
    async fn update(
        &self,
        session_id: &str,
        mutation: &SessionMutation,
        expected_version: Option<i64>,
    ) -> StoreResult<QuizSession>;

    /// All sessions of `owner`, newest first
    async fn list_by_owner(
        &self,
        owner: &Owner,
        domain: Option<&str>,
        sub_domain: Option<&str>,
    ) -> StoreResult<Vec<QuizSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> SessionDraft {
        SessionDraft {
            owner: Owner::new("user-1"),
            domain: "python".into(),
            sub_domain: "lists".into(),
            level: Level::Easy,
            questions: Vec::new(),
        }
    }

    #[test]
    fn quiz_session_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn QuizSessionStore) {}
    }

    #[test]
    fn mutation_only_touches_provided_fields() {
        let now = Utc::now();
        let mut session = draft().into_session("s1".into(), now);
        session.user_answers = vec![["a"].into_iter().collect()];

        SessionMutation::progress(None, Some(3)).apply_to(&mut session, now);

        assert_eq!(session.current_index, 3);
        assert_eq!(session.user_answers.len(), 1);
        assert_eq!(session.status, QuizStatus::Incomplete);
        assert_eq!(session.version, 1);
    }

    #[test]
    fn completion_mutation_sets_terminal_fields() {
        let now = Utc::now();
        let mut session = draft().into_session("s1".into(), now);

        SessionMutation::completion(Vec::new(), 50.0, 4).apply_to(&mut session, now);

        assert!(session.is_completed());
        assert_eq!(session.score, Some(50.0));
        assert_eq!(session.current_index, 4);
    }

    #[test]
    fn timestamps_are_kept_to_millisecond_precision() {
        let now = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let mut session = draft().into_session("s1".into(), now);

        assert_eq!(session.created_at.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(session.created_at, session.updated_at);

        SessionMutation::progress(None, Some(1)).apply_to(&mut session, now);
        assert_eq!(session.updated_at.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn empty_mutation_is_detected() {
        assert!(SessionMutation::default().is_empty());
        assert!(!SessionMutation::progress(Some(Vec::new()), None).is_empty());
    }
}
