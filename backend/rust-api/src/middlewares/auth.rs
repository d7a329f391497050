use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::models::Owner;
use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String, // user_id, becomes the session owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

impl JwtClaims {
    /// Claims valid for `ttl_seconds` from now
    pub fn for_user(user_id: impl Into<String>, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.into(),
            username: None,
            exp: (now + ttl_seconds).max(0) as usize,
            iat: now.max(0) as usize,
        }
    }

    pub fn owner(&self) -> Owner {
        Owner::new(self.sub.clone())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("Missing authorization token")]
    MissingToken,
    #[error("Invalid token signature")]
    InvalidSignature,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized", "message": self.to_string() })),
        )
            .into_response()
    }
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)
}

/// Rejects requests without a valid bearer token and exposes the claims to
/// handlers through request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(&headers)?;

    let claims = state.jwt.validate_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        e
    })?;

    tracing::debug!("Authenticated user: {}", claims.sub);

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_generation_and_validation() {
        let service = JwtService::new("test-secret");
        let claims = JwtClaims::for_user("user123", 3600);

        let token = service.generate_token(&claims).unwrap();
        let validated = service.validate_token(&token).unwrap();

        assert_eq!(validated.sub, "user123");
        assert_eq!(validated.owner(), Owner::new("user123"));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = JwtService::new("test-secret");
        let token = service
            .generate_token(&JwtClaims::for_user("user123", -3600))
            .unwrap();

        assert!(matches!(
            service.validate_token(&token),
            Err(AuthError::ExpiredToken)
        ));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let token = JwtService::new("other-secret")
            .generate_token(&JwtClaims::for_user("user123", 3600))
            .unwrap();

        assert!(matches!(
            JwtService::new("test-secret").validate_token(&token),
            Err(AuthError::InvalidSignature)
        ));
    }
}
