use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use uuid::Uuid;

use super::{QuizSessionStore, SessionDraft, SessionMutation, StoreError, StoreResult};
use crate::metrics::track_db_operation;
use crate::models::{Owner, QuizSession, QuizStatus};
use crate::utils::time::chrono_to_bson;

const COLLECTION: &str = "quiz_sessions";
const INCOMPLETE_KEY_INDEX: &str = "uniq_incomplete_owner_domain_sub_domain";
const DUPLICATE_KEY_CODE: i32 = 11000;
// insert attempts when the conflicting session completes between insert and re-read
const CREATE_ATTEMPTS: usize = 3;

/// MongoDB-backed store. Uniqueness of incomplete sessions per key is enforced
/// by a partial unique index, not by a read-then-write in application code.
pub struct MongoQuizSessionStore {
    collection: Collection<QuizSession>,
}

impl MongoQuizSessionStore {
    pub fn new(mongo: &Database) -> Self {
        Self {
            collection: mongo.collection::<QuizSession>(COLLECTION),
        }
    }

    /// Creates the unique partial index and the history index. Idempotent.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique_incomplete = IndexModel::builder()
            .keys(doc! { "owner": 1, "domain": 1, "sub_domain": 1 })
            .options(
                IndexOptions::builder()
                    .name(INCOMPLETE_KEY_INDEX.to_string())
                    .unique(true)
                    .partial_filter_expression(
                        doc! { "status": QuizStatus::Incomplete.as_str() },
                    )
                    .build(),
            )
            .build();

        let history = IndexModel::builder()
            .keys(doc! { "owner": 1, "createdAt": -1 })
            .build();

        track_db_operation("create_indexes", COLLECTION, async {
            self.collection
                .create_indexes([unique_incomplete, history])
                .await
                .map(|_| ())
                .map_err(unavailable)
        })
        .await?;

        tracing::info!("Quiz session indexes ensured on '{}'", COLLECTION);
        Ok(())
    }

    fn incomplete_filter(owner: &Owner, domain: &str, sub_domain: &str) -> Document {
        doc! {
            "owner": owner.as_str(),
            "domain": domain,
            "sub_domain": sub_domain,
            "status": QuizStatus::Incomplete.as_str(),
        }
    }
}

fn unavailable(err: mongodb::error::Error) -> StoreError {
    tracing::error!("MongoDB operation failed: {}", err);
    StoreError::Unavailable(err.to_string())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY_CODE
    )
}

fn mutation_to_set(mutation: &SessionMutation) -> StoreResult<Document> {
    let mut set = doc! { "updatedAt": chrono_to_bson(Utc::now()) };

    if let Some(answers) = &mutation.user_answers {
        let answers = bson::to_bson(answers)
            .map_err(|e| StoreError::Unavailable(format!("Failed to encode answers: {}", e)))?;
        set.insert("user_answers", answers);
    }
    if let Some(index) = mutation.current_index {
        set.insert("current_index", i64::from(index));
    }
    if let Some(status) = mutation.status {
        set.insert("status", status.as_str());
    }
    if let Some(score) = mutation.score {
        set.insert("score", score);
    }

    Ok(set)
}

#[async_trait]
impl QuizSessionStore for MongoQuizSessionStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<QuizSession>> {
        track_db_operation("find_one", COLLECTION, async {
            self.collection
                .find_one(doc! { "_id": session_id })
                .await
                .map_err(unavailable)
        })
        .await
    }

    async fn find_incomplete(
        &self,
        owner: &Owner,
        domain: &str,
        sub_domain: &str,
    ) -> StoreResult<Option<QuizSession>> {
        track_db_operation("find_one", COLLECTION, async {
            self.collection
                .find_one(Self::incomplete_filter(owner, domain, sub_domain))
                .await
                .map_err(unavailable)
        })
        .await
    }

    async fn create_if_absent_incomplete(
        &self,
        draft: SessionDraft,
    ) -> StoreResult<(QuizSession, bool)> {
        for attempt in 1..=CREATE_ATTEMPTS {
            let session = draft
                .clone()
                .into_session(Uuid::new_v4().to_string(), Utc::now());

            let inserted = track_db_operation("insert_one", COLLECTION, async {
                match self.collection.insert_one(&session).await {
                    Ok(_) => Ok(true),
                    Err(e) if is_duplicate_key(&e) => Ok(false),
                    Err(e) => Err(unavailable(e)),
                }
            })
            .await?;

            if inserted {
                return Ok((session, true));
            }

            // Another request holds the key; hand back its session
            if let Some(existing) = self
                .find_incomplete(&draft.owner, &draft.domain, &draft.sub_domain)
                .await?
            {
                tracing::debug!(
                    session_id = %existing.id,
                    "Incomplete session already exists for owner {}",
                    draft.owner
                );
                return Ok((existing, false));
            }

            tracing::debug!(
                attempt,
                "Conflicting quiz session disappeared before re-read, retrying insert"
            );
        }

        Err(StoreError::Conflict { expected: 0 })
    }

    async fn update(
        &self,
        session_id: &str,
        mutation: &SessionMutation,
        expected_version: Option<i64>,
    ) -> StoreResult<QuizSession> {
        let mut filter = doc! { "_id": session_id };
        if let Some(expected) = expected_version {
            filter.insert("version", expected);
        }
        let update = doc! {
            "$set": mutation_to_set(mutation)?,
            "$inc": { "version": 1_i64 },
        };

        let updated = track_db_operation("find_one_and_update", COLLECTION, async {
            self.collection
                .find_one_and_update(filter, update)
                .return_document(ReturnDocument::After)
                .await
                .map_err(unavailable)
        })
        .await?;

        match updated {
            Some(session) => Ok(session),
            None => match (self.get(session_id).await?, expected_version) {
                (Some(_), Some(expected)) => Err(StoreError::Conflict { expected }),
                _ => Err(StoreError::NotFound),
            },
        }
    }

    async fn list_by_owner(
        &self,
        owner: &Owner,
        domain: Option<&str>,
        sub_domain: Option<&str>,
    ) -> StoreResult<Vec<QuizSession>> {
        let mut filter = doc! { "owner": owner.as_str() };
        if let Some(domain) = domain {
            filter.insert("domain", domain);
        }
        if let Some(sub_domain) = sub_domain {
            filter.insert("sub_domain", sub_domain);
        }

        track_db_operation("find", COLLECTION, async {
            let cursor = self
                .collection
                .find(filter)
                .sort(doc! { "createdAt": -1, "_id": -1 })
                .await
                .map_err(unavailable)?;

            cursor.try_collect().await.map_err(unavailable)
        })
        .await
    }
}
