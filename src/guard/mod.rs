//! Per-request session validation and route guards.
//!
//! A cookie is only a claim. [`SessionValidator::validate`] checks it against
//! the session store and the user record on every request, and anything short
//! of a live session for an active user counts as signed out.

pub mod middleware;
pub mod policy;
pub mod redirect;

use std::sync::Arc;

use crate::identity::{IdentityResolver, SessionUser};
use crate::kv::{KvStore, now_millis};
use crate::session::cookie::CookieCodec;
use crate::session::{SessionManager, SessionRecord};

/// A validated session and the user it belongs to.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub session: SessionRecord,
    pub user: SessionUser,
}

impl AuthSession {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }
}

/// Outcome of checking a request's cookie.
#[derive(Debug, Clone)]
pub enum Validation {
    /// No session cookie, or the stores could not be reached.
    Anonymous,
    Authenticated(AuthSession),
    /// A cookie was sent but no live session backs it; clear it.
    Revoked,
}

impl Validation {
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            Validation::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn into_session(self) -> Option<AuthSession> {
        match self {
            Validation::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

pub struct SessionValidator<K: KvStore> {
    codec: Arc<CookieCodec>,
    sessions: Arc<SessionManager<K>>,
    identities: IdentityResolver,
}

impl<K: KvStore> SessionValidator<K> {
    pub fn new(
        codec: Arc<CookieCodec>,
        sessions: Arc<SessionManager<K>>,
        identities: IdentityResolver,
    ) -> Self {
        Self {
            codec,
            sessions,
            identities,
        }
    }

    pub async fn validate(&self, cookie_header: Option<&str>) -> Validation {
        let Some(header) = cookie_header else {
            return Validation::Anonymous;
        };
        let Some(claim) = self.codec.decode(header) else {
            return if self.codec.is_present(header) {
                tracing::debug!("session cookie failed verification");
                Validation::Revoked
            } else {
                Validation::Anonymous
            };
        };

        let (user, session) = tokio::join!(
            self.identities.find_session_user(&claim.user_id),
            self.sessions.get_session(&claim.user_id, &claim.session_id),
        );

        // Unreachable stores say nothing about the cookie itself; keep it.
        let user = match user {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(error = %e, "user lookup failed during session validation");
                return Validation::Anonymous;
            }
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "session lookup failed during session validation");
                return Validation::Anonymous;
            }
        };

        match (user, session) {
            (Some(user), Some(session))
                if user.is_active()
                    && session.user_id == user.id
                    && !session.is_expired_at(now_millis()) =>
            {
                Validation::Authenticated(AuthSession { session, user })
            }
            (user, session) => {
                tracing::info!(
                    user_id = %claim.user_id,
                    session_id = %claim.session_id,
                    user_found = user.is_some(),
                    session_found = session.is_some(),
                    "session cookie no longer valid"
                );
                Validation::Revoked
            }
        }
    }
}
