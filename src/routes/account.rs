//! /account: the signed-in user's profile, sign-in methods and sessions.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::AppState;
use crate::error::AppError;
use crate::guard::middleware::CurrentSession;
use crate::ocsf;
use crate::session::cookie::SessionClaim;
use crate::types::{AccountResponse, RefreshResponse, SessionView, SuccessResponse};

pub async fn account(
    State(state): State<Arc<AppState>>,
    CurrentSession(auth): CurrentSession,
) -> Result<Json<AccountResponse>, AppError> {
    let (user, accounts, sessions) = tokio::join!(
        state.identities.find_user(auth.user_id()),
        state.identities.list_accounts(auth.user_id()),
        state.sessions.list_sessions(auth.user_id()),
    );
    let user = user?.ok_or(AppError::NotAuthenticated)?;

    let sessions = sessions?
        .into_iter()
        .map(|session| SessionView {
            is_current: session.session_id == auth.session_id(),
            session,
        })
        .collect();

    Ok(Json(AccountResponse {
        user,
        accounts: accounts?,
        sessions,
    }))
}

/// Sign out one of the user's other devices.
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    CurrentSession(auth): CurrentSession,
    Path(session_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if session_id == auth.session_id() {
        return Err(AppError::BadRequest(
            "Use logout to end the current session".into(),
        ));
    }

    state
        .sessions
        .delete_session(auth.user_id(), &session_id)
        .await?;
    ocsf::revocation_event(auth.user_id(), Some(&session_id), "Session revoked by user");

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn revoke_other_sessions(
    State(state): State<Arc<AppState>>,
    CurrentSession(auth): CurrentSession,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .sessions
        .delete_other_sessions(auth.user_id(), auth.session_id())
        .await?;
    ocsf::revocation_event(
        auth.user_id(),
        Some(auth.session_id()),
        "All other sessions revoked by user",
    );

    Ok(Json(SuccessResponse { success: true }))
}

/// Extend the current session to a full TTL from now and re-issue the cookie.
pub async fn refresh_session(
    State(state): State<Arc<AppState>>,
    CurrentSession(auth): CurrentSession,
) -> Result<Response, AppError> {
    let refreshed = state
        .sessions
        .refresh_session(auth.user_id(), auth.session_id())
        .await?;
    if !refreshed {
        return Err(AppError::NotAuthenticated);
    }

    let record = state
        .sessions
        .get_session(auth.user_id(), auth.session_id())
        .await?
        .ok_or(AppError::NotAuthenticated)?;

    let claim = SessionClaim {
        user_id: auth.user.id.clone(),
        session_id: record.session_id.clone(),
    };
    let mut response = Json(RefreshResponse {
        success: true,
        expires_at: record.expires_at,
    })
    .into_response();
    if let Ok(value) = HeaderValue::from_str(&state.codec.encode(&claim)) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}

/// Delete the user, every session and every linked sign-in method.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    CurrentSession(auth): CurrentSession,
) -> Result<Response, AppError> {
    // Sessions go first so no live cookie outlives the user row.
    state.sessions.delete_all_sessions(auth.user_id()).await?;
    state.identities.delete_user(auth.user_id()).await?;

    tracing::info!(user_id = %auth.user_id(), "account deleted");
    ocsf::authentication_event(
        ocsf::ACTIVITY_LOGOFF,
        "Logoff",
        ocsf::STATUS_SUCCESS,
        ocsf::SEVERITY_LOW,
        ocsf::Actor {
            user_id: Some(auth.user_id()),
            email: Some(&auth.user.email),
            session_id: Some(auth.session_id()),
        },
        None,
        "Account deleted",
    );

    let mut response = Json(SuccessResponse { success: true }).into_response();
    if let Ok(value) = HeaderValue::from_str(&state.codec.destroy()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}
