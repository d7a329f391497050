//! Runs against a live MongoDB. Set `MONGO_URI` (directly or in `.env.test`);
//! without it every test here returns early.

use futures::future::join_all;
use mongodb::{Client, Database};
use std::sync::Arc;
use std::time::Duration;

use quizforge_api::{
    models::{Level, Owner, QuizStatus},
    services::store::{
        MongoQuizSessionStore, QuizSessionStore, SessionDraft, SessionMutation, StoreError,
    },
};

struct MongoFixture {
    database: Database,
    store: Arc<MongoQuizSessionStore>,
}

impl MongoFixture {
    async fn teardown(self) {
        self.database.drop().await.expect("drop test database");
    }
}

/// Fresh database per test with indexes in place, or `None` when no server is configured
async fn mongo_fixture() -> Option<MongoFixture> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    dotenvy::from_filename(".env.test").ok();
    let Ok(uri) = std::env::var("MONGO_URI") else {
        eprintln!("MONGO_URI not set, skipping MongoDB store test");
        return None;
    };

    let client = Client::with_uri_str(&uri)
        .await
        .expect("Failed to connect to test MongoDB");
    let database = client.database(&format!("quizforge_test_{}", uuid::Uuid::new_v4().simple()));

    let store = MongoQuizSessionStore::new(&database);
    store.ensure_indexes().await.expect("ensure indexes");

    Some(MongoFixture {
        database,
        store: Arc::new(store),
    })
}

fn draft(owner: &str, sub_domain: &str) -> SessionDraft {
    SessionDraft {
        owner: Owner::new(owner),
        domain: "python".into(),
        sub_domain: sub_domain.into(),
        level: Level::Medium,
        questions: Vec::new(),
    }
}

#[tokio::test]
async fn test_concurrent_creates_yield_one_session() {
    let Some(fixture) = mongo_fixture().await else {
        return;
    };

    let attempts = (0..8).map(|_| {
        let store = fixture.store.clone();
        tokio::spawn(async move { store.create_if_absent_incomplete(draft("alice", "lists")).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("create"))
        .collect();

    let created = results.iter().filter(|(_, created)| *created).count();
    assert_eq!(created, 1);

    let winner = &results[0].0.id;
    assert!(results.iter().all(|(session, _)| &session.id == winner));

    let listed = fixture
        .store
        .list_by_owner(&Owner::new("alice"), None, None)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    fixture.teardown().await;
}

#[tokio::test]
async fn test_stale_version_is_a_conflict() {
    let Some(fixture) = mongo_fixture().await else {
        return;
    };

    let (session, created) = fixture
        .store
        .create_if_absent_incomplete(draft("alice", "lists"))
        .await
        .unwrap();
    assert!(created);
    assert_eq!(session.version, 0);

    let saved = fixture
        .store
        .update(&session.id, &SessionMutation::progress(None, Some(2)), Some(0))
        .await
        .unwrap();
    assert_eq!(saved.version, 1);
    assert_eq!(saved.current_index, 2);

    let err = fixture
        .store
        .update(&session.id, &SessionMutation::progress(None, Some(3)), Some(0))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { expected: 0 }), "{:?}", err);

    let stored = fixture.store.get(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.current_index, 2);
    assert_eq!(stored.created_at, session.created_at);

    fixture.teardown().await;
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let Some(fixture) = mongo_fixture().await else {
        return;
    };

    assert!(fixture.store.get("no-such-session").await.unwrap().is_none());

    for expected_version in [Some(0), None] {
        let err = fixture
            .store
            .update(
                "no-such-session",
                &SessionMutation::progress(None, Some(1)),
                expected_version,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound), "{:?}", err);
    }

    fixture.teardown().await;
}

#[tokio::test]
async fn test_completion_frees_the_key() {
    let Some(fixture) = mongo_fixture().await else {
        return;
    };

    let (first, _) = fixture
        .store
        .create_if_absent_incomplete(draft("alice", "lists"))
        .await
        .unwrap();
    fixture
        .store
        .update(
            &first.id,
            &SessionMutation::completion(Vec::new(), 100.0, 0),
            Some(first.version),
        )
        .await
        .unwrap();

    let owner = Owner::new("alice");
    assert!(fixture
        .store
        .find_incomplete(&owner, "python", "lists")
        .await
        .unwrap()
        .is_none());

    // history sorts by createdAt, which only has millisecond resolution
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (second, created) = fixture
        .store
        .create_if_absent_incomplete(draft("alice", "lists"))
        .await
        .unwrap();
    assert!(created);
    assert_ne!(second.id, first.id);

    let history = fixture.store.list_by_owner(&owner, None, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].status, QuizStatus::Completed);

    fixture.teardown().await;
}

#[tokio::test]
async fn test_keys_are_scoped_per_owner_and_sub_domain() {
    let Some(fixture) = mongo_fixture().await else {
        return;
    };

    for (owner, sub_domain) in [("alice", "lists"), ("alice", "dicts"), ("bob", "lists")] {
        let (_, created) = fixture
            .store
            .create_if_absent_incomplete(draft(owner, sub_domain))
            .await
            .unwrap();
        assert!(created, "{} / {}", owner, sub_domain);
    }

    let filtered = fixture
        .store
        .list_by_owner(&Owner::new("alice"), Some("python"), Some("dicts"))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);

    fixture.teardown().await;
}
