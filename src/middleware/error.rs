use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::Error;

/// Authentication errors for the middleware layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing, tampered, unknown or expired session. The response never says which.
    #[error("Not authenticated")]
    Unauthenticated,

    /// OAuth2 flow error (provider refusal, state mismatch, token exchange failure, etc.)
    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "session expired or invalid" })),
            )
                .into_response(),
            Self::OAuth(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "authentication failed", "details": detail })),
            )
                .into_response(),
            Self::NotFound(what) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": what }))).into_response()
            }
            Self::Store(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<Error> for AuthError {
    fn from(e: Error) -> Self {
        match e {
            Error::SessionNotFound | Error::SessionExpired => Self::Unauthenticated,
            Error::UserNotFound => Self::NotFound("user not found".into()),
            Error::UnknownProvider(name) => Self::NotFound(format!("unknown provider: {name}")),
            Error::Config(msg) => Self::Config(msg),
            Error::Store(_) | Error::Random(_) => Self::Store(e.to_string()),
            _ => Self::OAuth(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn session_errors_collapse_to_401() {
        for e in [Error::SessionNotFound, Error::SessionExpired] {
            let response = AuthError::from(e).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn provider_failure_is_500() {
        let e = Error::OAuth {
            operation: "token exchange",
            status: Some(400),
            detail: "bad_verification_code".into(),
        };
        let auth = AuthError::from(e);
        assert!(matches!(&auth, AuthError::OAuth(detail) if detail.contains("bad_verification_code")));
        assert_eq!(auth.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn storage_failure_is_500() {
        let e = Error::Store(StoreError::Backend("disk full".into()));
        assert_eq!(
            AuthError::from(e).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_rows_are_404() {
        assert_eq!(
            AuthError::from(Error::UserNotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuthError::from(Error::UnknownProvider("gitlab".into()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }
}
