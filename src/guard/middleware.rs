//! Axum wiring for the session guard.
//!
//! [`auth_guard`] validates the cookie once per request, applies the route
//! policy and hands the result to handlers through request extensions:
//! - [`MaybeSession`]: always present after the guard ran
//! - [`CurrentSession`]: rejects with 401 when nobody is signed in

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use std::sync::Arc;

use super::policy::{GuardDecision, RouteClass, decide};
use super::{AuthSession, Validation};
use crate::AppState;
use crate::error::AppError;
use crate::session::cookie::AUTH_COOKIE_NAME;

/// The validated session, if any.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<AuthSession>);

/// The validated session of a signed-in user.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub AuthSession);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<MaybeSession>()
            .cloned()
            .unwrap_or(MaybeSession(None)))
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<MaybeSession>()
            .and_then(|s| s.0.clone())
            .map(CurrentSession)
            .ok_or(AppError::NotAuthenticated)
    }
}

pub async fn auth_guard(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let validation = state.validator.validate(cookie_header.as_deref()).await;
    let revoked = matches!(validation, Validation::Revoked);

    let path = req.uri().path().to_string();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let class = RouteClass::classify(&path);
    let mut response = match decide(class, validation.session().is_some(), &path_and_query) {
        GuardDecision::Redirect(location) => {
            tracing::debug!(%path, %location, ?class, "guard redirect");
            Redirect::to(&location).into_response()
        }
        GuardDecision::Continue => {
            req.extensions_mut()
                .insert(MaybeSession(validation.into_session()));
            next.run(req).await
        }
    };

    // A handler that just issued a fresh session cookie must keep it.
    if revoked
        && !sets_auth_cookie(&response)
        && let Ok(value) = HeaderValue::from_str(&state.codec.destroy())
    {
        response.headers_mut().append(header::SET_COOKIE, value);
    }

    response
}

fn sets_auth_cookie(response: &Response) -> bool {
    let prefix = format!("{}=", AUTH_COOKIE_NAME);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}
