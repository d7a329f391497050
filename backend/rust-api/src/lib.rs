use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::QuizError;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest(
            "/api/v1/quizzes",
            quiz_routes(app_state.clone())
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                ))
                // outermost so preflights are answered before auth runs
                .layer(cors),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
        .layer(middleware::from_fn(middlewares::trace::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

fn quiz_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Only creation can reach the generator, so only creation is throttled
    let create = post(handlers::quizzes::create_or_resume_quiz).layer(
        middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::generation_rate_limit_middleware,
        ),
    );

    Router::new()
        .route("/", get(handlers::quizzes::quiz_history).merge(create))
        .route("/resume", get(handlers::quizzes::resume_lookup))
        .route("/{id}", get(handlers::quizzes::get_quiz))
        .route("/{id}/progress", patch(handlers::quizzes::save_progress))
        .route("/{id}/complete", post(handlers::quizzes::complete_quiz))
}
