use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::middlewares::auth::JwtService;
use generator::{HttpQuestionGenerator, QuestionGenerator};
use quiz_service::QuizSessionManager;
use store::{InMemoryQuizSessionStore, MongoQuizSessionStore, QuizSessionStore};

pub mod generator;
pub mod normalizer;
pub mod quiz_service;
pub mod scoring;
pub mod store;

pub struct AppState {
    pub config: Config,
    pub quizzes: QuizSessionManager,
    pub jwt: JwtService,
    /// Present only with the Mongo backend
    pub mongo: Option<Database>,
    /// Present only when REDIS_URI is configured
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: Option<MongoClient>,
        redis_client: Option<redis::Client>,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.map(|client| client.database(&config.mongo_database));

        let store: Arc<dyn QuizSessionStore> = match (config.storage_backend, &mongo) {
            (StorageBackend::Mongo, Some(db)) => {
                let store = MongoQuizSessionStore::new(db);
                store.ensure_indexes().await?;
                Arc::new(store)
            }
            (StorageBackend::Mongo, None) => {
                anyhow::bail!("Mongo storage backend selected but no MongoDB client was provided")
            }
            (StorageBackend::Memory, _) => {
                tracing::warn!("Using in-memory quiz session store, sessions are lost on restart");
                Arc::new(InMemoryQuizSessionStore::new())
            }
        };

        let redis = match redis_client {
            Some(client) => Some(connect_redis(client).await?),
            None => {
                tracing::info!("Redis not configured, generation rate limiting disabled");
                None
            }
        };

        let generator: Arc<dyn QuestionGenerator> = Arc::new(HttpQuestionGenerator::new(
            config.generator_url.clone(),
            config.generator_timeout(),
        ));

        let mut state = Self::from_parts(config, store, generator);
        state.mongo = mongo;
        state.redis = redis;
        Ok(state)
    }

    /// Wires a state without external connections
    pub fn from_parts(
        config: Config,
        store: Arc<dyn QuizSessionStore>,
        generator: Arc<dyn QuestionGenerator>,
    ) -> Self {
        let jwt = JwtService::new(&config.jwt_secret);
        Self {
            config,
            quizzes: QuizSessionManager::new(store, generator),
            jwt,
            mongo: None,
            redis: None,
        }
    }
}

async fn connect_redis(client: redis::Client) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
