#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use quizforge_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::RawQuestion,
    services::{
        generator::{GenerationError, GenerationRequest, QuestionGenerator},
        store::InMemoryQuizSessionStore,
        AppState,
    },
};

pub const TEST_JWT_SECRET: &str = "test-secret";

/// Generator double that can under-deliver, stall or fail
pub struct StubGenerator {
    /// Questions returned per call, `None` means honour the requested count
    pub deliver: Option<usize>,
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl Default for StubGenerator {
    fn default() -> Self {
        Self {
            deliver: None,
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }
}

impl StubGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionGenerator for StubGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<RawQuestion>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(GenerationError::Upstream {
                status: 500,
                body: "model overloaded".to_string(),
            });
        }

        let count = self
            .deliver
            .unwrap_or(request.number_of_questions as usize);

        Ok((0..count)
            .map(|i| RawQuestion {
                // generator ids are ignored and reassigned
                id: Some(Value::from(100 + i)),
                question: format!("{} / {} question {}", request.domain, request.sub_domain, i + 1),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_answers: vec!["A".into(), "B".into()],
                explanation: "A and B are correct".into(),
                ..Default::default()
            })
            .collect())
    }
}

pub struct TestApp {
    pub router: Router,
    pub generator: Arc<StubGenerator>,
    pub store: Arc<InMemoryQuizSessionStore>,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(StubGenerator::default())
}

pub fn create_test_app_with(generator: StubGenerator) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let generator = Arc::new(generator);
    let store = Arc::new(InMemoryQuizSessionStore::new());

    let app_state = Arc::new(AppState::from_parts(
        Config::for_memory_backend(TEST_JWT_SECRET),
        store.clone(),
        generator.clone(),
    ));

    TestApp {
        router: create_router(app_state),
        generator,
        store,
    }
}

pub fn token_for(user_id: &str) -> String {
    JwtService::new(TEST_JWT_SECRET)
        .generate_token(&JwtClaims::for_user(user_id, 3600))
        .expect("token")
}

/// Sends a request as `user_id` (anonymous when `None`) and decodes the JSON body
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user_id: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("authorization", format!("Bearer {}", token_for(user_id)));
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    (status, json)
}
