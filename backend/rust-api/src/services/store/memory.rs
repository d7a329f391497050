use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{QuizSessionStore, SessionDraft, SessionMutation, StoreError, StoreResult};
use crate::models::{Owner, QuizSession, QuizStatus};

/// Process-local store. A single write lock covers the uniqueness check and
/// the insert, which makes create-if-absent atomic.
#[derive(Default)]
pub struct InMemoryQuizSessionStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, QuizSession>,
    // insertion order, used for newest-first listings
    order: Vec<String>,
}

impl Inner {
    fn incomplete_for(&self, owner: &Owner, domain: &str, sub_domain: &str) -> Option<&QuizSession> {
        self.sessions.values().find(|session| {
            session.status == QuizStatus::Incomplete
                && &session.owner == owner
                && session.domain == domain
                && session.sub_domain == sub_domain
        })
    }
}

impl InMemoryQuizSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl QuizSessionStore for InMemoryQuizSessionStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<QuizSession>> {
        Ok(self.inner.read().await.sessions.get(session_id).cloned())
    }

    async fn find_incomplete(
        &self,
        owner: &Owner,
        domain: &str,
        sub_domain: &str,
    ) -> StoreResult<Option<QuizSession>> {
        let inner = self.inner.read().await;
        Ok(inner.incomplete_for(owner, domain, sub_domain).cloned())
    }

    async fn create_if_absent_incomplete(
        &self,
        draft: SessionDraft,
    ) -> StoreResult<(QuizSession, bool)> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.incomplete_for(&draft.owner, &draft.domain, &draft.sub_domain)
        {
            return Ok((existing.clone(), false));
        }

        let session = draft.into_session(Uuid::new_v4().to_string(), Utc::now());
        inner.order.push(session.id.clone());
        inner.sessions.insert(session.id.clone(), session.clone());

        Ok((session, true))
    }

    async fn update(
        &self,
        session_id: &str,
        mutation: &SessionMutation,
        expected_version: Option<i64>,
    ) -> StoreResult<QuizSession> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or(StoreError::NotFound)?;

        if let Some(expected) = expected_version {
            if session.version != expected {
                return Err(StoreError::Conflict { expected });
            }
        }

        mutation.apply_to(session, Utc::now());
        Ok(session.clone())
    }

    async fn list_by_owner(
        &self,
        owner: &Owner,
        domain: Option<&str>,
        sub_domain: Option<&str>,
    ) -> StoreResult<Vec<QuizSession>> {
        let inner = self.inner.read().await;
        let sessions = inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.sessions.get(id))
            .filter(|session| &session.owner == owner)
            .filter(|session| domain.map_or(true, |d| session.domain == d))
            .filter(|session| sub_domain.map_or(true, |s| session.sub_domain == s))
            .cloned()
            .collect();

        Ok(sessions)
    }
}
