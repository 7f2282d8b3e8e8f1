//! GET/POST /auth/verify

use axum::Form;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use std::sync::Arc;

use super::{cookie_header, login_error, redirect_with_cookies, sign_in_failed};
use crate::AppState;
use crate::auth::code::CodeSubmission;
use crate::error::{AppError, AuthError};
use crate::guard::policy::{HOME_PATH, LOGIN_PATH};
use crate::guard::redirect::safe_redirect_path;
use crate::session::SessionMetadata;
use crate::types::{PendingVerification, VerifyForm};

/// The address a code was sent to, for the "check your inbox" screen.
pub async fn pending_verification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    match state.codec.decode_pending_email(cookie_header(&headers)) {
        Some(pending) => Json(PendingVerification {
            email: pending.email,
        })
        .into_response(),
        None => Redirect::to(LOGIN_PATH).into_response(),
    }
}

/// Check a submitted code and open a session.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<VerifyForm>,
) -> Result<Response, AppError> {
    let clear_pending = state.codec.destroy_pending_email();

    let Some(pending) = state.codec.decode_pending_email(cookie_header(&headers)) else {
        return Ok(login_error(&AuthError::InvalidOrExpiredCode, &[clear_pending]));
    };

    let submission = CodeSubmission {
        email: pending.email,
        code: form.code,
    };
    let metadata = SessionMetadata::from_headers(&headers);

    match state
        .authenticator
        .authenticate(&state.code, submission, metadata)
        .await
    {
        Ok(claim) => {
            let target = safe_redirect_path(
                form.redirect_to.as_deref().or(pending.redirect_to.as_deref()),
                HOME_PATH,
            );
            Ok(redirect_with_cookies(
                &target,
                &[state.codec.encode(&claim), clear_pending],
            ))
        }
        Err(e) => sign_in_failed(e, &[clear_pending]),
    }
}
