//! Error types for the sign-in flows and their HTTP mapping.
//!
//! `AuthError` is what strategies and the resolver return; login routes turn
//! it into a redirect carrying [`AuthError::user_message`]. `AppError` is for
//! JSON endpoints and maps each variant to a status + `{"error": ...}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::identity::Provider;
use crate::kv::StoreError;

/// Failures while signing a user in.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0} did not return an email address")]
    MissingEmail(Provider),

    #[error("invalid email address")]
    InvalidEmail,

    #[error("user is not active")]
    InactiveUser,

    #[error("login failed")]
    LoginFailed,

    #[error("invalid or expired code")]
    InvalidOrExpiredCode,

    #[error("invalid or expired OAuth state")]
    InvalidOAuthState,

    #[error("{provider} sign-in failed: {detail}")]
    ProviderFailed { provider: Provider, detail: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Text that is safe to show the person signing in.
    ///
    /// Account state and internal failures are never distinguished here.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::MissingEmail(provider) => format!(
                "Your {} account did not share an email address. Try another sign-in method.",
                provider_label(*provider)
            ),
            AuthError::InvalidEmail => "Please enter a valid email address.".into(),
            AuthError::InvalidOrExpiredCode => "The code is invalid or has expired.".into(),
            AuthError::InvalidOAuthState => "Your sign-in attempt expired. Please try again.".into(),
            AuthError::UnknownProvider(_) => "That sign-in method is not supported.".into(),
            AuthError::Store(_) => "Sign-in is temporarily unavailable. Please try again.".into(),
            AuthError::InactiveUser | AuthError::LoginFailed | AuthError::ProviderFailed { .. } => {
                "Login failed. Please try again.".into()
            }
        }
    }
}

fn provider_label(provider: Provider) -> &'static str {
    match provider {
        Provider::Code => "email",
        Provider::Google => "Google",
        Provider::GitHub => "GitHub",
    }
}

/// Errors returned by JSON endpoints.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl AppError {
    fn status_and_body(&self) -> (StatusCode, serde_json::Value) {
        match self {
            AppError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "Not authenticated"}),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({"error": msg})),
            AppError::NotFound => (StatusCode::NOT_FOUND, json!({"error": "Not found"})),
            AppError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "Session store unavailable"}),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Internal server error"}),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, axum::Json(body)).into_response()
    }
}
