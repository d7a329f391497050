use std::sync::Arc;
use std::time::Instant;
use validator::Validate;

use crate::error::QuizError;
use crate::metrics::{
    QUIZ_GENERATIONS_TOTAL, QUIZ_GENERATION_DURATION_SECONDS, QUIZ_PLACEHOLDER_QUESTIONS_TOTAL,
    QUIZ_SCORES, QUIZ_SESSIONS_TOTAL, QUIZ_UPDATE_CONFLICTS_TOTAL,
};
use crate::models::{
    CompleteQuizRequest, CreateQuizRequest, HistoryQuery, Level, Owner, QuizSession,
    SaveProgressRequest,
};
use crate::services::generator::{GenerationRequest, QuestionGenerator};
use crate::services::normalizer::normalize_question_set;
use crate::services::scoring::score_answers;
use crate::services::store::{QuizSessionStore, SessionDraft, SessionMutation};
use crate::utils::retry::{retry_async_when, RetryConfig};

pub type QuizResult<T> = Result<T, QuizError>;

#[derive(Debug, Clone)]
pub struct CreateOrResumeOutcome {
    pub session: QuizSession,
    /// true when an existing incomplete session was handed back
    pub resumed: bool,
}

/// Orchestrates the quiz session lifecycle: create-or-resume, progress saves
/// and completion.
///
/// Writes after creation are optimistic: the session is read, the change is
/// computed against that snapshot and written only if the stored version is
/// unchanged. On conflict the whole read/check/write cycle is retried, so a
/// late progress save cannot reopen a session that was completed meanwhile.
pub struct QuizSessionManager {
    store: Arc<dyn QuizSessionStore>,
    generator: Arc<dyn QuestionGenerator>,
    retry: RetryConfig,
}

impl QuizSessionManager {
    pub fn new(store: Arc<dyn QuizSessionStore>, generator: Arc<dyn QuestionGenerator>) -> Self {
        Self {
            store,
            generator,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the owner's incomplete session for the key, or generates and
    /// persists a new one.
    pub async fn create_or_resume(
        &self,
        owner: &Owner,
        req: &CreateQuizRequest,
    ) -> QuizResult<CreateOrResumeOutcome> {
        let level = validate_create_request(req)?;

        if let Some(existing) = self
            .store
            .find_incomplete(owner, &req.domain, &req.sub_domain)
            .await?
        {
            QUIZ_SESSIONS_TOTAL.with_label_values(&["resumed"]).inc();
            tracing::info!(
                session_id = %existing.id,
                "Resuming incomplete quiz {}/{} for user {}",
                req.domain,
                req.sub_domain,
                owner
            );
            return Ok(CreateOrResumeOutcome {
                session: existing,
                resumed: true,
            });
        }

        // Nothing is persisted until the generated set has been normalized
        let count = req.count as usize;
        let questions = self.generate_questions(req, level, count).await?;

        let placeholders = questions.iter().filter(|q| q.is_placeholder).count();
        if placeholders > 0 {
            QUIZ_PLACEHOLDER_QUESTIONS_TOTAL
                .with_label_values(&[level.as_str()])
                .inc_by(placeholders as u64);
        }

        let draft = SessionDraft {
            owner: owner.clone(),
            domain: req.domain.clone(),
            sub_domain: req.sub_domain.clone(),
            level,
            questions,
        };

        let (session, created) = self.store.create_if_absent_incomplete(draft).await?;

        if created {
            QUIZ_SESSIONS_TOTAL.with_label_values(&["created"]).inc();
            tracing::info!(
                session_id = %session.id,
                "Quiz created: {}/{} ({} questions, level {}) for user {}",
                session.domain,
                session.sub_domain,
                session.questions.len(),
                level.as_str(),
                owner
            );
        } else {
            QUIZ_SESSIONS_TOTAL.with_label_values(&["race_lost"]).inc();
            tracing::info!(
                session_id = %session.id,
                "Concurrent request created the quiz first, discarding generated questions"
            );
        }

        Ok(CreateOrResumeOutcome {
            session,
            resumed: !created,
        })
    }

    async fn generate_questions(
        &self,
        req: &CreateQuizRequest,
        level: Level,
        count: usize,
    ) -> QuizResult<Vec<crate::models::Question>> {
        let request = GenerationRequest {
            domain: req.domain.clone(),
            sub_domain: req.sub_domain.clone(),
            number_of_questions: count as u32,
            level,
        };

        let started = Instant::now();
        let result = self.generator.generate(&request).await;
        QUIZ_GENERATION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        let raw = match result {
            Ok(raw) if raw.is_empty() => {
                QUIZ_GENERATIONS_TOTAL.with_label_values(&["empty"]).inc();
                return Err(QuizError::GenerationFailed(
                    "generator returned no questions".to_string(),
                ));
            }
            Ok(raw) => {
                QUIZ_GENERATIONS_TOTAL.with_label_values(&["success"]).inc();
                raw
            }
            Err(e) => {
                QUIZ_GENERATIONS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::warn!(
                    "Question generation failed for {}/{}: {}",
                    req.domain,
                    req.sub_domain,
                    e
                );
                return Err(e.into());
            }
        };

        Ok(normalize_question_set(raw, count))
    }

    /// Partial update of answers and/or cursor on an incomplete session
    pub async fn save_progress(
        &self,
        session_id: &str,
        owner: &Owner,
        req: &SaveProgressRequest,
    ) -> QuizResult<QuizSession> {
        let current_index = req
            .current_index
            .map(|index| {
                u32::try_from(index).map_err(|_| {
                    QuizError::InvalidRequest(format!(
                        "current_index must be between 0 and {}",
                        u32::MAX
                    ))
                })
            })
            .transpose()?;

        let mutation = SessionMutation::progress(req.user_answers.clone(), current_index);

        if mutation.is_empty() {
            let session = self.load_owned(session_id, owner).await?;
            ensure_incomplete(&session)?;
            return Ok(session);
        }

        let session = self
            .apply_with_retry("save_progress", session_id, owner, |current| {
                ensure_incomplete(current)?;
                Ok(mutation.clone())
            })
            .await?;

        tracing::debug!(
            session_id = %session.id,
            current_index = session.current_index,
            answers = session.user_answers.len(),
            "Quiz progress saved"
        );

        Ok(session)
    }

    /// Scores the submitted answers and marks the session completed.
    ///
    /// Completing an already completed session recomputes and overwrites the
    /// score from the new answers.
    pub async fn complete(
        &self,
        session_id: &str,
        owner: &Owner,
        req: &CompleteQuizRequest,
    ) -> QuizResult<QuizSession> {
        let session = self
            .apply_with_retry("complete", session_id, owner, |current| {
                if current.is_completed() {
                    tracing::info!(
                        session_id = %current.id,
                        previous_score = ?current.score,
                        "Re-completing quiz, score will be recomputed"
                    );
                }
                let report = score_answers(&current.questions, &req.user_answers);
                Ok(SessionMutation::completion(
                    req.user_answers.clone(),
                    report.score,
                    current.questions.len() as u32,
                ))
            })
            .await?;

        if let Some(score) = session.score {
            QUIZ_SCORES.observe(score);
        }
        QUIZ_SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
        tracing::info!(
            session_id = %session.id,
            score = ?session.score,
            "Quiz completed by user {}",
            owner
        );

        Ok(session)
    }

    /// All of the owner's sessions, newest first
    pub async fn history(&self, owner: &Owner, query: &HistoryQuery) -> QuizResult<Vec<QuizSession>> {
        let sessions = self
            .store
            .list_by_owner(owner, query.domain.as_deref(), query.sub_domain.as_deref())
            .await?;
        Ok(sessions)
    }

    pub async fn resume_lookup(
        &self,
        owner: &Owner,
        domain: &str,
        sub_domain: &str,
    ) -> QuizResult<QuizSession> {
        self.store
            .find_incomplete(owner, domain, sub_domain)
            .await?
            .ok_or(QuizError::NotFound)
    }

    pub async fn get_session(&self, session_id: &str, owner: &Owner) -> QuizResult<QuizSession> {
        self.load_owned(session_id, owner).await
    }

    /// Sessions owned by somebody else are reported as missing
    async fn load_owned(&self, session_id: &str, owner: &Owner) -> QuizResult<QuizSession> {
        match self.store.get(session_id).await? {
            Some(session) if &session.owner == owner => Ok(session),
            Some(_) => {
                tracing::warn!(
                    session_id,
                    "User {} attempted to access a quiz session they do not own",
                    owner
                );
                Err(QuizError::NotFound)
            }
            None => Err(QuizError::NotFound),
        }
    }

    async fn apply_with_retry<P>(
        &self,
        operation: &'static str,
        session_id: &str,
        owner: &Owner,
        plan: P,
    ) -> QuizResult<QuizSession>
    where
        P: Fn(&QuizSession) -> QuizResult<SessionMutation>,
    {
        let this = self;
        let plan = &plan;

        retry_async_when(self.retry.clone(), QuizError::is_conflict, move || async move {
            let current = this.load_owned(session_id, owner).await?;
            let mutation = plan(&current)?;

            match this
                .store
                .update(session_id, &mutation, Some(current.version))
                .await
            {
                Ok(updated) => Ok(updated),
                Err(e) => {
                    let err = QuizError::from(e);
                    if err.is_conflict() {
                        QUIZ_UPDATE_CONFLICTS_TOTAL
                            .with_label_values(&[operation])
                            .inc();
                        tracing::debug!(session_id, operation, "Version conflict, retrying");
                    }
                    Err(err)
                }
            }
        })
        .await
    }
}

fn validate_create_request(req: &CreateQuizRequest) -> QuizResult<Level> {
    req.validate()?;

    if req.domain.trim().is_empty() || req.sub_domain.trim().is_empty() {
        return Err(QuizError::InvalidRequest(
            "domain and sub_domain must not be blank".to_string(),
        ));
    }

    req.level.parse::<Level>().map_err(QuizError::InvalidRequest)
}

fn ensure_incomplete(session: &QuizSession) -> QuizResult<()> {
    if session.is_completed() {
        return Err(QuizError::InvalidState(
            "quiz session is already completed".to_string(),
        ));
    }
    Ok(())
}
