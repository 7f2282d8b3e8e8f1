//! GET /auth/{provider}/callback

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::Arc;

use super::{cookie_header, redirect_with_cookies, sign_in_failed};
use crate::AppState;
use crate::auth::oauth::OAuthCallback;
use crate::error::{AppError, AuthError};
use crate::guard::policy::HOME_PATH;
use crate::guard::redirect::safe_redirect_path;
use crate::identity::Provider;
use crate::session::SessionMetadata;
use crate::types::CallbackQuery;

/// Finish an OAuth sign-in: check the state against the browser's state
/// cookie, redeem it, exchange the code and open a session.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    // Every outcome retires the state cookie.
    let cookies = [state.codec.destroy_oauth_state()];

    let strategy = match provider.parse::<Provider>() {
        Ok(p) => state.oauth(p),
        Err(_) => None,
    };
    let Some(strategy) = strategy else {
        return sign_in_failed(AuthError::UnknownProvider(provider), &cookies);
    };

    // Only the browser that started this sign-in may finish it.
    let returned_state = query.state.as_deref().unwrap_or_default();
    if !state
        .codec
        .oauth_state_matches(cookie_header(&headers), returned_state)
    {
        tracing::info!(%provider, "OAuth callback without a matching state cookie");
        return sign_in_failed(AuthError::InvalidOAuthState, &cookies);
    }

    // Redeem the state first so it cannot be replayed, even on failure.
    let pending = match strategy.take_state(returned_state).await {
        Ok(pending) => pending,
        Err(e) => return sign_in_failed(e, &cookies),
    };

    if let Some(error) = query.error {
        tracing::info!(%provider, %error, "provider declined the sign-in");
        return sign_in_failed(
            AuthError::ProviderFailed {
                provider: pending.provider,
                detail: error,
            },
            &cookies,
        );
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return sign_in_failed(AuthError::InvalidOAuthState, &cookies);
    };

    let callback = OAuthCallback {
        code,
        verifier: pending.verifier,
    };
    match state
        .authenticator
        .authenticate(strategy, callback, SessionMetadata::from_headers(&headers))
        .await
    {
        Ok(claim) => {
            let target = safe_redirect_path(pending.redirect_to.as_deref(), HOME_PATH);
            let [clear_state] = cookies;
            Ok(redirect_with_cookies(
                &target,
                &[state.codec.encode(&claim), clear_state],
            ))
        }
        Err(e) => sign_in_failed(e, &cookies),
    }
}
