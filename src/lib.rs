//! Session and sign-in lifecycle service.
//!
//! Same Axum router runs in both Lambda and local dev contexts.
//! Detection via `AWS_LAMBDA_RUNTIME_API` env var.

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod kv;
pub mod ocsf;
pub mod routes;
pub mod session;
pub mod types;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::Authenticator;
use crate::auth::code::CodeStrategy;
use crate::auth::mailer::Mailer;
use crate::auth::oauth::OAuthStrategy;
use crate::config::{Config, ConfigError};
use crate::guard::SessionValidator;
use crate::guard::middleware::auth_guard;
use crate::identity::{IdentityResolver, Provider};
use crate::kv::AnyKv;
use crate::session::SessionManager;
use crate::session::cookie::{CookieCodec, SecretRing};

/// Shared application state available to all route handlers.
pub struct AppState {
    pub config: Config,
    pub kv: Arc<AnyKv>,
    pub codec: Arc<CookieCodec>,
    pub sessions: Arc<SessionManager<AnyKv>>,
    pub identities: IdentityResolver,
    pub validator: SessionValidator<AnyKv>,
    pub authenticator: Authenticator<AnyKv>,
    pub code: CodeStrategy<AnyKv>,
    pub google: Option<OAuthStrategy<AnyKv>>,
    pub github: Option<OAuthStrategy<AnyKv>>,
    pub mailer: Arc<Mailer>,
}

impl AppState {
    /// Wire every component from its backing stores.
    ///
    /// `http` is used for OAuth token exchange and profile calls and should
    /// not follow redirects.
    pub fn new(
        config: Config,
        kv: AnyKv,
        pool: SqlitePool,
        mailer: Mailer,
        http: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let secrets = SecretRing::new(&config.session_secrets).ok_or_else(|| ConfigError::Invalid {
            key: "SESSION_SECRET".into(),
            reason: "no non-empty secret".into(),
        })?;

        let kv = Arc::new(kv);
        let mailer = Arc::new(mailer);
        let codec = Arc::new(CookieCodec::new(
            secrets,
            config.secure_cookies(),
            config.session_ttl.as_secs(),
        ));
        let sessions = Arc::new(SessionManager::new(
            kv.clone(),
            config.session_ttl,
            config.store_timeout,
        ));
        let identities = IdentityResolver::new(pool);

        let oauth = |provider| {
            config.oauth_settings(provider).map(|settings| {
                OAuthStrategy::new(settings, kv.clone(), http.clone(), config.store_timeout)
            })
        };
        let google = oauth(Provider::Google);
        let github = oauth(Provider::GitHub);

        Ok(Self {
            validator: SessionValidator::new(codec.clone(), sessions.clone(), identities.clone()),
            authenticator: Authenticator::new(identities.clone(), sessions.clone()),
            code: CodeStrategy::new(kv.clone(), mailer.clone(), config.store_timeout),
            google,
            github,
            codec,
            sessions,
            identities,
            mailer,
            kv,
            config,
        })
    }

    /// The configured OAuth strategy for `provider`, if enabled.
    pub fn oauth(&self, provider: Provider) -> Option<&OAuthStrategy<AnyKv>> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::GitHub => self.github.as_ref(),
            Provider::Code => None,
        }
    }

    /// Sign-in methods currently offered.
    pub fn providers(&self) -> Vec<Provider> {
        [Provider::Code, Provider::Google, Provider::GitHub]
            .into_iter()
            .filter(|p| *p == Provider::Code || self.oauth(*p).is_some())
            .collect()
    }
}

/// Build the Axum router with all middleware and routes.
pub fn create_app(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route(
            "/login",
            get(routes::login::login_options).post(routes::login::login),
        )
        .route(
            "/verify",
            get(routes::verify::pending_verification).post(routes::verify::verify),
        )
        .route("/{provider}/callback", get(routes::callback::oauth_callback))
        .route("/logout", post(routes::logout::logout));

    Router::new()
        .route("/", get(routes::home::home))
        .route("/health", get(routes::health::health))
        .nest("/auth", auth_routes)
        .route("/account", get(routes::account::account))
        .route(
            "/account/sessions/{id}/revoke",
            post(routes::account::revoke_session),
        )
        .route(
            "/account/sessions/revoke-others",
            post(routes::account::revoke_other_sessions),
        )
        .route(
            "/account/sessions/refresh",
            post(routes::account::refresh_session),
        )
        .route("/account/delete", post(routes::account::delete_account))
        .layer(from_fn_with_state(state.clone(), auth_guard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
