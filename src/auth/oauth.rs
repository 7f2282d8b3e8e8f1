//! # OAuth 2.0 sign-in (Google, GitHub)
//!
//! One strategy type serves both providers; only the endpoints, scopes and
//! profile shapes differ.
//!
//! ## Flow
//!
//! 1. [`authorization_url`](OAuthStrategy::authorization_url) builds the
//!    provider URL with a PKCE S256 challenge and a random CSRF state. The
//!    verifier and the post-login return path are kept in the KV store under
//!    `oauth:{state}` for ten minutes.
//!    The state is also returned to the caller, which binds it to the
//!    browser with a signed cookie.
//! 2. The callback route checks the query state against that cookie, then
//!    calls [`take_state`](OAuthStrategy::take_state), which removes the
//!    record in one store operation, so a state can be redeemed once.
//! 3. [`verify`](Strategy::verify) exchanges the code plus verifier for an
//!    access token, fetches the provider profile and normalizes it into an
//!    [`AuthProfile`]. GitHub accounts with a private address fall back to
//!    the primary verified entry of `/user/emails`.

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::Strategy;
use crate::error::AuthError;
use crate::identity::{AuthProfile, Provider};
use crate::kv::{KvStore, bounded};

/// How long a started sign-in may take before its state expires.
pub const STATE_TTL_SECS: u64 = 10 * 60;

const STATE_KEY_PREFIX: &str = "oauth";
const USER_AGENT: &str = "session-keeper";

type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// A started sign-in: where to send the browser, and the state it will
/// come back with.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Client registration and endpoints for one provider.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    /// Base URL of the profile API.
    pub api_url: String,
    pub redirect_url: String,
}

impl OAuthSettings {
    pub fn google(client_id: String, client_secret: String, app_url: &str) -> Self {
        Self {
            provider: Provider::Google,
            client_id,
            client_secret,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            api_url: "https://www.googleapis.com".into(),
            redirect_url: callback_url(app_url, Provider::Google),
        }
    }

    pub fn github(client_id: String, client_secret: String, app_url: &str) -> Self {
        Self {
            provider: Provider::GitHub,
            client_id,
            client_secret,
            auth_url: "https://github.com/login/oauth/authorize".into(),
            token_url: "https://github.com/login/oauth/access_token".into(),
            api_url: "https://api.github.com".into(),
            redirect_url: callback_url(app_url, Provider::GitHub),
        }
    }

    fn scopes(&self) -> &'static [&'static str] {
        match self.provider {
            Provider::GitHub => &["read:user", "user:email"],
            _ => &["openid", "email", "profile"],
        }
    }
}

fn callback_url(app_url: &str, provider: Provider) -> String {
    format!("{}/auth/{}/callback", app_url.trim_end_matches('/'), provider)
}

/// State stored between redirecting to the provider and its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOAuth {
    pub provider: Provider,
    pub verifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

/// What the callback hands to [`Strategy::verify`].
#[derive(Debug, Clone)]
pub struct OAuthCallback {
    pub code: String,
    pub verifier: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    verified_email: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

fn google_profile(user: GoogleUser) -> AuthProfile {
    // Google can report addresses it has not verified; those must not link.
    let email = user.email.filter(|_| user.verified_email != Some(false));
    AuthProfile {
        email,
        display_name: user.name,
        avatar_url: user.picture,
        provider: Provider::Google,
        provider_account_id: Some(user.id),
    }
}

fn github_profile(user: GitHubUser, fallback_email: Option<String>) -> AuthProfile {
    AuthProfile {
        email: user.email.filter(|e| !e.is_empty()).or(fallback_email),
        display_name: user.name.filter(|n| !n.is_empty()).or(Some(user.login)),
        avatar_url: user.avatar_url,
        provider: Provider::GitHub,
        provider_account_id: Some(user.id.to_string()),
    }
}

fn primary_verified(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

pub struct OAuthStrategy<K: KvStore> {
    settings: OAuthSettings,
    kv: Arc<K>,
    http: reqwest::Client,
    timeout: Duration,
}

impl<K: KvStore> OAuthStrategy<K> {
    /// `http` should not follow redirects; it is used for the token exchange.
    pub fn new(settings: OAuthSettings, kv: Arc<K>, http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            settings,
            kv,
            http,
            timeout,
        }
    }

    fn failed(&self, detail: impl std::fmt::Display) -> AuthError {
        AuthError::ProviderFailed {
            provider: self.settings.provider,
            detail: detail.to_string(),
        }
    }

    fn client(&self) -> Result<ConfiguredClient, AuthError> {
        let s = &self.settings;
        Ok(BasicClient::new(ClientId::new(s.client_id.clone()))
            .set_client_secret(ClientSecret::new(s.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(s.auth_url.clone()).map_err(|e| self.failed(e))?)
            .set_token_uri(TokenUrl::new(s.token_url.clone()).map_err(|e| self.failed(e))?)
            .set_redirect_uri(RedirectUrl::new(s.redirect_url.clone()).map_err(|e| self.failed(e))?))
    }

    fn state_key(state: &str) -> String {
        format!("{}:{}", STATE_KEY_PREFIX, state)
    }

    /// Start a sign-in: remember the PKCE verifier and return the URL to
    /// send the browser to.
    pub async fn authorization_url(
        &self,
        redirect_to: Option<String>,
    ) -> Result<AuthorizationRequest, AuthError> {
        let client = self.client()?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client.authorize_url(CsrfToken::new_random);
        for scope in self.settings.scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (auth_url, csrf_state) = request.set_pkce_challenge(pkce_challenge).url();

        let pending = PendingOAuth {
            provider: self.settings.provider,
            verifier: pkce_verifier.secret().clone(),
            redirect_to,
        };
        let value = serde_json::to_string(&pending).map_err(|e| self.failed(e))?;
        bounded(
            self.timeout,
            self.kv
                .put(&Self::state_key(csrf_state.secret()), value, STATE_TTL_SECS),
        )
        .await?;

        Ok(AuthorizationRequest {
            url: auth_url.to_string(),
            state: csrf_state.secret().clone(),
        })
    }

    /// Redeem the state returned by the provider. Unknown, expired, reused
    /// or cross-provider states are all rejected the same way.
    pub async fn take_state(&self, state: &str) -> Result<PendingOAuth, AuthError> {
        if state.is_empty() {
            return Err(AuthError::InvalidOAuthState);
        }
        let key = Self::state_key(state);
        let stored = bounded(self.timeout, self.kv.take(&key))
            .await?
            .ok_or(AuthError::InvalidOAuthState)?;

        let pending: PendingOAuth =
            serde_json::from_str(&stored).map_err(|_| AuthError::InvalidOAuthState)?;
        if pending.provider != self.settings.provider {
            return Err(AuthError::InvalidOAuthState);
        }
        Ok(pending)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AuthError> {
        self.http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.failed(e))?
            .json()
            .await
            .map_err(|e| self.failed(e))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<AuthProfile, AuthError> {
        let api = self.settings.api_url.trim_end_matches('/');
        match self.settings.provider {
            Provider::Google => {
                let user: GoogleUser = self
                    .get_json(&format!("{}/oauth2/v2/userinfo", api), access_token)
                    .await?;
                Ok(google_profile(user))
            }
            Provider::GitHub => {
                let user: GitHubUser = self.get_json(&format!("{}/user", api), access_token).await?;
                let fallback = if user.email.as_deref().is_some_and(|e| !e.is_empty()) {
                    None
                } else {
                    let emails: Vec<GitHubEmail> = self
                        .get_json(&format!("{}/user/emails", api), access_token)
                        .await?;
                    primary_verified(emails)
                };
                Ok(github_profile(user, fallback))
            }
            Provider::Code => Err(self.failed("not an OAuth provider")),
        }
    }
}

impl<K: KvStore> Strategy for OAuthStrategy<K> {
    type Input = OAuthCallback;

    fn provider(&self) -> Provider {
        self.settings.provider
    }

    async fn verify(&self, input: OAuthCallback) -> Result<AuthProfile, AuthError> {
        let client = self.client()?;
        let token = client
            .exchange_code(AuthorizationCode::new(input.code))
            .set_pkce_verifier(PkceCodeVerifier::new(input.verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| self.failed(format!("token exchange failed: {}", e)))?;

        self.fetch_profile(token.access_token().secret()).await
    }
}
