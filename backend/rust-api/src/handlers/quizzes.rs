use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::QuizError,
    extractors::{AppJson, AppQuery},
    middlewares::auth::JwtClaims,
    models::{
        CompleteQuizRequest, CreateQuizRequest, CreateQuizResponse, HistoryQuery, HistoryResponse,
        ProgressAck, QuizSessionResponse, ResumeQuery, SaveProgressRequest,
    },
    services::AppState,
};

/// 201 for a new session, 200 when an incomplete one is resumed
pub async fn create_or_resume_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateQuizRequest>,
) -> Result<impl IntoResponse, QuizError> {
    tracing::info!(
        "Create-or-resume quiz for user_id={}, domain={}, sub_domain={}, count={}",
        claims.sub,
        req.domain,
        req.sub_domain,
        req.count
    );

    let outcome = state.quizzes.create_or_resume(&claims.owner(), &req).await?;

    let status = if outcome.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(CreateQuizResponse {
            session: outcome.session.into(),
            resumed: outcome.resumed,
        }),
    ))
}

pub async fn save_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SaveProgressRequest>,
) -> Result<impl IntoResponse, QuizError> {
    let session = state
        .quizzes
        .save_progress(&session_id, &claims.owner(), &req)
        .await?;

    Ok(Json(ProgressAck::from(&session)))
}

pub async fn complete_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<CompleteQuizRequest>,
) -> Result<impl IntoResponse, QuizError> {
    tracing::info!("Completing quiz session: {}", session_id);

    let session = state
        .quizzes
        .complete(&session_id, &claims.owner(), &req)
        .await?;

    Ok(Json(QuizSessionResponse::from(session)))
}

pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let session = state
        .quizzes
        .get_session(&session_id, &claims.owner())
        .await?;

    Ok(Json(QuizSessionResponse::from(session)))
}

pub async fn quiz_history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<impl IntoResponse, QuizError> {
    let sessions: Vec<QuizSessionResponse> = state
        .quizzes
        .history(&claims.owner(), &query)
        .await?
        .into_iter()
        .map(QuizSessionResponse::from)
        .collect();

    Ok(Json(HistoryResponse {
        total: sessions.len(),
        sessions,
    }))
}

pub async fn resume_lookup(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppQuery(query): AppQuery<ResumeQuery>,
) -> Result<impl IntoResponse, QuizError> {
    let session = state
        .quizzes
        .resume_lookup(&claims.owner(), &query.domain, &query.sub_domain)
        .await?;

    Ok(Json(QuizSessionResponse::from(session)))
}
