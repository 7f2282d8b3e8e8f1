//! GET/POST /auth/login
//!
//! POST starts a sign-in. `intent=code` mails a one-time code and parks the
//! address in a short-lived signed cookie for `/auth/verify`; `intent=google`
//! or `intent=github` sends the browser to the provider with the OAuth state
//! pinned in a signed cookie for the callback.

use axum::Form;
use axum::Json;
use axum::extract::{Query, State};
use axum::response::Response;
use std::sync::Arc;

use super::{redirect_with_cookies, sign_in_failed};
use crate::AppState;
use crate::error::{AppError, AuthError};
use crate::guard::policy::HOME_PATH;
use crate::guard::redirect::safe_redirect_path;
use crate::identity::Provider;
use crate::types::{LoginForm, LoginOptions, LoginQuery};

const VERIFY_PATH: &str = "/auth/verify";

/// What the login screen needs to render.
pub async fn login_options(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Json<LoginOptions> {
    Json(LoginOptions {
        providers: state.providers(),
        error: query.error,
        redirect_to: safe_redirect_path(query.redirect_to.as_deref(), HOME_PATH),
    })
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let redirect_to = safe_redirect_path(form.redirect_to.as_deref(), HOME_PATH);

    let result = match form.intent.parse::<Provider>() {
        Ok(Provider::Code) => start_code(&state, form.email.as_deref(), redirect_to).await,
        Ok(provider) => start_oauth(&state, provider, redirect_to).await,
        Err(e) => Err(e),
    };

    result.or_else(|e| {
        tracing::info!(intent = %form.intent, error = %e, "sign-in could not start");
        sign_in_failed(e, &[])
    })
}

async fn start_code(
    state: &AppState,
    email: Option<&str>,
    redirect_to: String,
) -> Result<Response, AuthError> {
    let email = state.code.send_code(email.unwrap_or_default()).await?;
    let pending = state.codec.encode_pending_email(&email, Some(redirect_to));
    Ok(redirect_with_cookies(VERIFY_PATH, &[pending]))
}

async fn start_oauth(
    state: &AppState,
    provider: Provider,
    redirect_to: String,
) -> Result<Response, AuthError> {
    let strategy = state
        .oauth(provider)
        .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))?;
    let started = strategy.authorization_url(Some(redirect_to)).await?;
    Ok(redirect_with_cookies(
        &started.url,
        &[state.codec.encode_oauth_state(&started.state)],
    ))
}
