//! Sign-in strategies and the path from a verified identity to a session.
//!
//! Each strategy only proves who someone is and yields an [`AuthProfile`].
//! [`Authenticator::authenticate`] does the rest for all of them: resolve
//! the profile to a local user, create a session and return the claim that
//! goes into the cookie.

pub mod code;
pub mod mailer;
pub mod oauth;

use std::future::Future;
use std::sync::Arc;

pub use crate::identity::{AuthProfile, Provider};

use crate::error::AuthError;
use crate::identity::IdentityResolver;
use crate::kv::KvStore;
use crate::ocsf;
use crate::session::cookie::SessionClaim;
use crate::session::{SessionManager, SessionMetadata};

/// Verifies an external claim of identity.
pub trait Strategy: Send + Sync {
    /// What the person submits to prove it.
    type Input: Send;

    fn provider(&self) -> Provider;

    fn verify(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<AuthProfile, AuthError>> + Send;
}

pub struct Authenticator<K: KvStore> {
    resolver: IdentityResolver,
    sessions: Arc<SessionManager<K>>,
}

impl<K: KvStore> Authenticator<K> {
    pub fn new(resolver: IdentityResolver, sessions: Arc<SessionManager<K>>) -> Self {
        Self { resolver, sessions }
    }

    /// Verify with `strategy`, link the identity to a user and open a session.
    pub async fn authenticate<S: Strategy>(
        &self,
        strategy: &S,
        input: S::Input,
        metadata: SessionMetadata,
    ) -> Result<SessionClaim, AuthError> {
        let provider = strategy.provider();
        let result = self.sign_in(strategy, input, metadata).await;

        match &result {
            Ok((claim, email)) => ocsf::authentication_event(
                ocsf::ACTIVITY_LOGON,
                "Logon",
                ocsf::STATUS_SUCCESS,
                ocsf::SEVERITY_INFORMATIONAL,
                ocsf::Actor {
                    user_id: Some(&claim.user_id),
                    email: email.as_deref(),
                    session_id: Some(&claim.session_id),
                },
                Some(provider),
                &format!("Signed in with {}", provider),
            ),
            Err(e) => {
                tracing::warn!(%provider, error = %e, "sign-in failed");
                ocsf::authentication_event(
                    ocsf::ACTIVITY_LOGON,
                    "Logon",
                    ocsf::STATUS_FAILURE,
                    ocsf::SEVERITY_MEDIUM,
                    ocsf::Actor::default(),
                    Some(provider),
                    &format!("Sign-in with {} failed: {}", provider, e),
                );
            }
        }

        result.map(|(claim, _)| claim)
    }

    async fn sign_in<S: Strategy>(
        &self,
        strategy: &S,
        input: S::Input,
        metadata: SessionMetadata,
    ) -> Result<(SessionClaim, Option<String>), AuthError> {
        let profile = strategy.verify(input).await?;
        let user_id = self.resolver.resolve(&profile).await?;
        let session_id = self.sessions.create_session(&user_id, metadata).await?;
        Ok((
            SessionClaim {
                user_id,
                session_id,
            },
            profile.email,
        ))
    }
}
