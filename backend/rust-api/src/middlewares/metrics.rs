use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per route
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = route_label(&req);

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}

/// Matched route template, or the normalized raw path when only a nest
/// wildcard matched at this layer
fn route_label(req: &Request) -> String {
    match req.extensions().get::<MatchedPath>() {
        Some(matched) if !matched.as_str().contains('*') => matched.as_str().to_string(),
        _ => normalize_path(req.uri().path()),
    }
}

/// Replaces id-like segments with `{id}` to bound label cardinality
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_uuid_like(segment) || is_numeric_id(segment) || is_object_id(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

// 8-4-4-4-12 hex
fn is_uuid_like(s: &str) -> bool {
    s.len() == 36 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

fn is_object_id(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/api/v1/quizzes/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/quizzes/{id}"
        );
        assert_eq!(
            normalize_path("/api/v1/quizzes/550e8400-e29b-41d4-a716-446655440000/progress"),
            "/api/v1/quizzes/{id}/progress"
        );
        assert_eq!(
            normalize_path("/api/v1/quizzes/65f1c2a9e4b0a1b2c3d4e5f6/complete"),
            "/api/v1/quizzes/{id}/complete"
        );
        assert_eq!(normalize_path("/api/v1/quizzes/resume"), "/api/v1/quizzes/resume");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_id_detection() {
        assert!(is_uuid_like("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_uuid_like("not-a-uuid"));
        assert!(is_numeric_id("123"));
        assert!(!is_numeric_id(""));
        assert!(is_object_id("65f1c2a9e4b0a1b2c3d4e5f6"));
        assert!(!is_object_id("resume"));
    }
}
