use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GENERATOR_TIMEOUT_SECONDS: u64 = 60;

/// Where quiz sessions are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = config::ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "STORAGE_BACKEND must be 'mongo' or 'memory' (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Generation rate limiting is disabled when unset
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub generator_url: String,
    pub generator_timeout_seconds: u64,
    pub storage_backend: StorageBackend,
    pub server_addr: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/<env>.toml, overridden by APP_* variables
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let lookup = |key: &str, var: &str| settings.get_string(key).or_else(|_| env::var(var));

        let mongo_uri = lookup("database.mongo_uri", "MONGO_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = lookup("database.mongo_database", "MONGO_DATABASE")
            .unwrap_or_else(|_| "quizforge".to_string());

        let redis_uri = lookup("redis.uri", "REDIS_URI")
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let jwt_secret = match lookup("auth.jwt_secret", "JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let generator_url = lookup("generator.url", "GENERATOR_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());

        let generator_timeout_seconds = match lookup("generator.timeout_seconds", "GENERATOR_TIMEOUT_SECONDS") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| {
                config::ConfigError::Message(format!(
                    "GENERATOR_TIMEOUT_SECONDS must be a positive integer: {}",
                    e
                ))
            })?,
            Err(_) => DEFAULT_GENERATOR_TIMEOUT_SECONDS,
        };

        let storage_backend = match lookup("storage.backend", "STORAGE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => StorageBackend::Mongo,
        };

        let server_addr = lookup("server.addr", "SERVER_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            generator_url,
            generator_timeout_seconds,
            storage_backend,
            server_addr,
        })
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_seconds)
    }

    /// Settings for tests and local runs without external services
    pub fn for_memory_backend(jwt_secret: impl Into<String>) -> Self {
        Config {
            mongo_uri: String::new(),
            mongo_database: "quizforge".to_string(),
            redis_uri: None,
            jwt_secret: jwt_secret.into(),
            generator_url: "http://localhost:8000".to_string(),
            generator_timeout_seconds: DEFAULT_GENERATOR_TIMEOUT_SECONDS,
            storage_backend: StorageBackend::Memory,
            server_addr: "127.0.0.1:0".to_string(),
        }
    }
}
