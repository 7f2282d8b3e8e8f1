//! Shared request/response DTOs.

use serde::{Deserialize, Serialize};

use crate::identity::{Account, Provider, SessionUser, User};
use crate::session::SessionRecord;

/// POST /auth/login form.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub intent: String,
    pub email: Option<String>,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// POST /auth/verify form.
#[derive(Debug, Deserialize)]
pub struct VerifyForm {
    pub code: String,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// GET /auth/login query.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// GET /auth/{provider}/callback query.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /auth/login response: what the login screen offers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOptions {
    pub providers: Vec<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub redirect_to: String,
}

/// GET /auth/verify response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVerification {
    pub email: String,
}

/// GET / response.
#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub kv: String,
    pub providers: Vec<Provider>,
}

/// A session as shown on the account screen.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub session: SessionRecord,
    pub is_current: bool,
}

/// GET /account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user: User,
    pub accounts: Vec<Account>,
    pub sessions: Vec<SessionView>,
}

/// POST /account/sessions/refresh response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub expires_at: u64,
}

/// Generic success response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}
