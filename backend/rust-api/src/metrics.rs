use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Quiz lifecycle
    pub static ref QUIZ_SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_sessions_total",
        "Quiz session lifecycle events",
        &["event"]
    )
    .unwrap();

    pub static ref QUIZ_GENERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_generations_total",
        "Calls to the question generator",
        &["status"]
    )
    .unwrap();

    pub static ref QUIZ_GENERATION_DURATION_SECONDS: Histogram = register_histogram!(
        "quiz_generation_duration_seconds",
        "Question generator latency in seconds",
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]
    )
    .unwrap();

    pub static ref QUIZ_PLACEHOLDER_QUESTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_placeholder_questions_total",
        "Placeholder questions inserted because the generator under-delivered",
        &["level"]
    )
    .unwrap();

    pub static ref QUIZ_UPDATE_CONFLICTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_update_conflicts_total",
        "Optimistic concurrency conflicts on quiz session writes",
        &["operation"]
    )
    .unwrap();

    pub static ref QUIZ_SCORES: Histogram = register_histogram!(
        "quiz_scores",
        "Distribution of completed quiz scores (percent)",
        vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]
    )
    .unwrap();

    pub static ref RATE_LIMIT_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_limit_rejections_total",
        "Requests rejected by rate limiting",
        &["scope"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T, E>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Just verify that all metrics are properly registered
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = QUIZ_SESSIONS_TOTAL.with_label_values(&["created"]).get();
    }

    #[test]
    fn test_render_metrics() {
        QUIZ_GENERATIONS_TOTAL.with_label_values(&["success"]).inc();

        let output = render_metrics().unwrap();
        assert!(output.contains("quiz_generations_total"));
    }

    #[tokio::test]
    async fn track_db_operation_passes_result_through() {
        let ok: Result<u8, String> = track_db_operation("find_one", "test", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, String> =
            track_db_operation("find_one", "test", async { Err("boom".to_string()) }).await;
        assert!(err.is_err());
    }
}
