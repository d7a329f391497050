use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::services::AppState;

pub mod quizzes;

type DependencyReport = Map<String, Value>;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = Map::new();

    let mongo_health = check_mongodb(&state).await;
    let redis_health = check_redis(&state).await;

    let all_healthy = [&mongo_health, &redis_health].iter().all(|report| {
        matches!(
            report.get("status").and_then(Value::as_str),
            Some("healthy") | Some("disabled")
        )
    });

    dependencies.insert("mongodb".to_string(), Value::Object(mongo_health));
    dependencies.insert("redis".to_string(), Value::Object(redis_health));

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "quizforge-api",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": format!("{:?}", state.config.storage_backend).to_lowercase(),
            "dependencies": dependencies
        })),
    )
}

fn report(status: &str, key: &str, detail: impl Into<Value>) -> DependencyReport {
    let mut result = Map::new();
    result.insert("status".to_string(), json!(status));
    result.insert(key.to_string(), detail.into());
    result
}

async fn check_mongodb(state: &AppState) -> DependencyReport {
    let Some(mongo) = &state.mongo else {
        return report("disabled", "message", "In-memory storage in use");
    };

    match tokio::time::timeout(
        Duration::from_secs(1),
        mongo.run_command(mongodb::bson::doc! { "ping": 1 }),
    )
    .await
    {
        Ok(Ok(_)) => report("healthy", "message", "MongoDB connection successful"),
        Ok(Err(e)) => report("unhealthy", "error", format!("MongoDB error: {}", e)),
        Err(_) => report("unhealthy", "error", "MongoDB timeout after 1s"),
    }
}

async fn check_redis(state: &AppState) -> DependencyReport {
    let Some(redis) = &state.redis else {
        return report("disabled", "message", "Rate limiting not configured");
    };

    let mut conn = redis.clone();
    match tokio::time::timeout(
        Duration::from_millis(500),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    {
        Ok(Ok(_)) => report("healthy", "message", "Redis connection successful"),
        Ok(Err(e)) => report("unhealthy", "error", format!("Redis error: {}", e)),
        Err(_) => report("unhealthy", "error", "Redis timeout after 500ms"),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Protects /metrics with HTTP Basic auth against `METRICS_AUTH` (user:password)
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());

    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
