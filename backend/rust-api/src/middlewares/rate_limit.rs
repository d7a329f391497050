use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::aio::ConnectionManager;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::metrics::RATE_LIMIT_REJECTIONS_TOTAL;
use crate::services::AppState;

// Each create call may trigger a model request
const GENERATION_LIMIT_PER_USER: u32 = 10; // per window
const GENERATION_LIMIT_PER_IP: u32 = 30; // per window
const GENERATION_WINDOW_SECONDS: u64 = 60;

const FIXED_WINDOW_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // comma separated list, first hop is the client
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            for part in s.split(';') {
                let p = part.trim();
                if let Some(val) = p.strip_prefix("for=") {
                    return val.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

fn env_limit(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

fn rate_limit_disabled() -> bool {
    std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1"
}

fn too_many_requests(scope: &'static str) -> Response {
    RATE_LIMIT_REJECTIONS_TOTAL.with_label_values(&[scope]).inc();
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "rate_limited",
            "message": "Too many quiz generation requests, try again later"
        })),
    )
        .into_response()
}

/// Throttles quiz creation per user and per client IP.
///
/// Runs after authentication. Skipped when Redis is not configured or
/// `RATE_LIMIT_DISABLED=1`. Redis failures let the request through.
pub async fn generation_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let redis = match &state.redis {
        Some(redis) if !rate_limit_disabled() => redis,
        _ => {
            tracing::debug!("Generation rate limiting disabled");
            return next.run(request).await;
        }
    };

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    let user_id = request
        .extensions()
        .get::<super::auth::JwtClaims>()
        .map(|claims| claims.sub.clone());

    if let Some(uid) = &user_id {
        let limit = env_limit("RATE_LIMIT_GENERATION_PER_USER", GENERATION_LIMIT_PER_USER);
        match check_rate_limit(redis, &format!("ratelimit:generate:user:{}", uid), limit).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Generation rate limit exceeded for user: {}", uid);
                return too_many_requests("user");
            }
            Err(e) => tracing::error!("Rate limit check failed: {}", e),
        }
    }

    let limit = env_limit("RATE_LIMIT_GENERATION_PER_IP", GENERATION_LIMIT_PER_IP);
    match check_rate_limit(redis, &format!("ratelimit:generate:ip:{}", client_ip), limit).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("Generation rate limit exceeded for IP: {}", client_ip);
            return too_many_requests("ip");
        }
        Err(e) => tracing::error!("Rate limit check failed: {}", e),
    }

    next.run(request).await
}

/// Fixed window counter, atomic through a Lua script
async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let allowed: u32 = redis::Script::new(FIXED_WINDOW_SCRIPT)
        .key(key)
        .arg(limit)
        .arg(GENERATION_WINDOW_SECONDS)
        .invoke_async(&mut conn)
        .await?;

    Ok(allowed == 1)
}
