//! HTTP route handlers.

pub mod account;
pub mod callback;
pub mod health;
pub mod home;
pub mod login;
pub mod logout;
pub mod verify;

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Redirect, Response};

use crate::error::{AppError, AuthError};
use crate::guard::policy::LOGIN_PATH;

/// 303 to `location`, setting each of `cookies`.
pub(crate) fn redirect_with_cookies(location: &str, cookies: &[String]) -> Response {
    let mut response = Redirect::to(location).into_response();
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Back to the login screen with a message that is safe to display.
pub(crate) fn login_error(error: &AuthError, cookies: &[String]) -> Response {
    let location = format!(
        "{}?error={}",
        LOGIN_PATH,
        urlencoding::encode(&error.user_message())
    );
    redirect_with_cookies(&location, cookies)
}

/// Store outages surface as 503; every other sign-in failure goes back to
/// the login screen.
pub(crate) fn sign_in_failed(error: AuthError, cookies: &[String]) -> Result<Response, AppError> {
    match error {
        AuthError::Store(e) => Err(AppError::StoreUnavailable(e)),
        other => Ok(login_error(&other, cookies)),
    }
}

pub(crate) fn cookie_header(headers: &HeaderMap) -> &str {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
