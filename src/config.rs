//! Application configuration via environment variables.

use std::env;
use std::time::Duration;

use crate::auth::oauth::OAuthSettings;
use crate::identity::Provider;

const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 15;

/// OAuth client registration, with optional endpoint overrides.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub api_url: Option<String>,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_url: String,
    pub environment: String,
    pub port: u16,
    /// Newest first. The first secret signs, all of them verify.
    pub session_secrets: Vec<String>,
    pub session_ttl: Duration,
    pub store_timeout: Duration,
    pub database_url: String,
    pub kv_backend: String,
    pub dynamodb_table: String,
    pub dynamodb_endpoint: String,
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required: `SESSION_SECRET` (comma-separated to rotate secrets).
    /// A provider is enabled when its client id and secret are both set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let session_secrets = parse_secrets(&required_env("SESSION_SECRET")?);
        if session_secrets.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SESSION_SECRET".into(),
                reason: "no non-empty secret".into(),
            });
        }

        Ok(Self {
            app_url: env::var("APP_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            port: parse_env("PORT", 3000)?,
            session_secrets,
            session_ttl: Duration::from_secs(parse_env("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?),
            store_timeout: Duration::from_millis(parse_env("STORE_TIMEOUT_MS", 5000)?),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://app.db?mode=rwc".into()),
            kv_backend: env::var("KV_BACKEND").unwrap_or_else(|_| "memory".into()),
            dynamodb_table: env::var("DYNAMODB_TABLE").unwrap_or_else(|_| "app_kv".into()),
            dynamodb_endpoint: env::var("DYNAMODB_ENDPOINT").unwrap_or_default(),
            google: oauth_client_from_env("GOOGLE"),
            github: oauth_client_from_env("GITHUB"),
            resend_api_key: optional_env("RESEND_API_KEY"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Todos <login@example.com>".into()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Cookies are `Secure` everywhere except development.
    pub fn secure_cookies(&self) -> bool {
        self.is_production()
    }

    /// Settings for an enabled OAuth provider.
    pub fn oauth_settings(&self, provider: Provider) -> Option<OAuthSettings> {
        let (client, defaults): (&OAuthClientConfig, fn(String, String, &str) -> OAuthSettings) =
            match provider {
                Provider::Google => (self.google.as_ref()?, OAuthSettings::google),
                Provider::GitHub => (self.github.as_ref()?, OAuthSettings::github),
                Provider::Code => return None,
            };

        let mut settings = defaults(
            client.client_id.clone(),
            client.client_secret.clone(),
            &self.app_url,
        );
        if let Some(url) = &client.auth_url {
            settings.auth_url = url.clone();
        }
        if let Some(url) = &client.token_url {
            settings.token_url = url.clone();
        }
        if let Some(url) = &client.api_url {
            settings.api_url = url.clone();
        }
        Some(settings)
    }
}

/// Configuration for testing: all fields settable directly.
impl Config {
    pub fn test_default() -> Self {
        Self {
            app_url: "http://localhost:3000".into(),
            environment: "test".into(),
            port: 3000,
            session_secrets: vec!["test-secret-key".into()],
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            store_timeout: Duration::from_secs(2),
            database_url: "sqlite::memory:".into(),
            kv_backend: "memory".into(),
            dynamodb_table: "app_kv".into(),
            dynamodb_endpoint: String::new(),
            google: None,
            github: None,
            resend_api_key: None,
            email_from: "Todos <login@example.com>".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv(key.into()))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.into(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_secrets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn oauth_client_from_env(prefix: &str) -> Option<OAuthClientConfig> {
    Some(OAuthClientConfig {
        client_id: optional_env(&format!("{}_CLIENT_ID", prefix))?,
        client_secret: optional_env(&format!("{}_CLIENT_SECRET", prefix))?,
        auth_url: optional_env(&format!("{}_AUTH_URL", prefix)),
        token_url: optional_env(&format!("{}_TOKEN_URL", prefix)),
        api_url: optional_env(&format!("{}_API_URL", prefix)),
    })
}
