//! POST /auth/logout

use axum::extract::State;
use axum::response::Response;
use std::sync::Arc;

use super::redirect_with_cookies;
use crate::AppState;
use crate::guard::middleware::MaybeSession;
use crate::guard::policy::LOGIN_PATH;
use crate::ocsf;

/// End the current session and clear the cookie.
///
/// The cookie is cleared even if the store delete fails; the record then
/// lapses with its TTL.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
) -> Response {
    if let Some(auth) = session {
        if let Err(e) = state
            .sessions
            .delete_session(auth.user_id(), auth.session_id())
            .await
        {
            tracing::error!(user_id = %auth.user_id(), error = %e, "failed to delete session on logout");
        }

        ocsf::authentication_event(
            ocsf::ACTIVITY_LOGOFF,
            "Logoff",
            ocsf::STATUS_SUCCESS,
            ocsf::SEVERITY_INFORMATIONAL,
            ocsf::Actor {
                user_id: Some(auth.user_id()),
                email: Some(&auth.user.email),
                session_id: Some(auth.session_id()),
            },
            None,
            "User logged out",
        );
    }

    redirect_with_cookies(LOGIN_PATH, &[state.codec.destroy()])
}
