//! Users, their sign-in methods, and the linking of verified identities
//! onto local users.
//!
//! Every provider funnels into [`IdentityResolver::resolve`], which enforces
//! one user per email address and at most one account per provider.

pub mod db;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;
use crate::kv::now_millis;

/// Supported ways of signing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// One-time code sent by email.
    Code,
    Google,
    GitHub,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Code => "code",
            Provider::Google => "google",
            Provider::GitHub => "github",
        }
    }

    pub fn is_oauth(self) -> bool {
        !matches!(self, Provider::Code)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Provider::Code),
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::GitHub),
            other => Err(AuthError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    /// Anything other than `active` is treated as inactive.
    fn from_column(value: &str) -> Self {
        if value == "active" {
            UserStatus::Active
        } else {
            UserStatus::Inactive
        }
    }
}

/// A local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
    status: String,
    created_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            status: UserStatus::from_column(&row.status),
            created_at: row.created_at,
        }
    }
}

/// The columns the session guard needs on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl SessionUser {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[derive(FromRow)]
struct SessionUserRow {
    id: String,
    email: String,
    display_name: String,
    avatar_url: Option<String>,
    status: String,
    created_at: i64,
}

impl From<SessionUserRow> for SessionUser {
    fn from(row: SessionUserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            status: UserStatus::from_column(&row.status),
            created_at: row.created_at,
        }
    }
}

/// A sign-in method linked to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub user_id: String,
    pub provider: Provider,
    pub provider_account_id: String,
    pub created_at: i64,
}

#[derive(FromRow)]
struct AccountRow {
    user_id: String,
    provider: String,
    provider_account_id: String,
    created_at: i64,
}

/// A verified external identity, as produced by a sign-in strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProfile {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: Provider,
    pub provider_account_id: Option<String>,
}

impl AuthProfile {
    /// Profile for a verified email address with no other details.
    pub fn email_only(email: impl Into<String>, provider: Provider) -> Self {
        Self {
            email: Some(email.into()),
            display_name: None,
            avatar_url: None,
            provider,
            provider_account_id: None,
        }
    }
}

/// Existing user matched by email or username, with this provider's
/// account if one is linked.
#[derive(FromRow)]
struct MatchedUser {
    id: String,
    email: String,
    username: String,
    status: String,
    linked_provider: Option<String>,
}

/// Maps verified identities onto local users.
#[derive(Clone)]
pub struct IdentityResolver {
    pool: SqlitePool,
}

impl IdentityResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Find or create the user for `profile` and make sure the profile's
    /// provider is linked to it. Returns the user id.
    pub async fn resolve(&self, profile: &AuthProfile) -> Result<String, AuthError> {
        let provider = profile.provider;
        let email = profile
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::MissingEmail(provider))?
            .to_lowercase();

        let local_part = email.split('@').next().unwrap_or_default().to_string();
        let display_name = profile
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| local_part.clone());

        let existing = self
            .find_match(&email, &local_part, provider)
            .await
            .map_err(|e| login_failed("auth_user_lookup_error", e))?;

        let mut username = local_part.clone();

        if let Some(found) = existing {
            if found.email.to_lowercase() == email {
                if UserStatus::from_column(&found.status) != UserStatus::Active {
                    return Err(AuthError::InactiveUser);
                }
                self.link_existing(&found, profile, &display_name)
                    .await
                    .map_err(|e| login_failed("auth_user_link_error", e))?;
                return Ok(found.id);
            }

            // Only the derived username collided with someone else's.
            if found.username == username {
                username = self
                    .free_username(&local_part)
                    .await
                    .map_err(|e| login_failed("auth_user_lookup_error", e))?;
                tracing::debug!(%username, "derived username taken, using suffixed name");
            }
        }

        match self
            .create_user(&email, &username, &display_name, profile)
            .await
        {
            Ok(user_id) => Ok(user_id),
            // A concurrent first sign-in with the same email won the race;
            // the user exists now, so link onto it instead.
            Err(e) if is_unique_violation(&e) => {
                let found = self
                    .find_match(&email, &local_part, provider)
                    .await
                    .ok()
                    .flatten()
                    .filter(|f| f.email.to_lowercase() == email);
                match found {
                    Some(found) if UserStatus::from_column(&found.status) == UserStatus::Active => {
                        self.link_existing(&found, profile, &display_name)
                            .await
                            .map_err(|e| login_failed("auth_user_link_error", e))?;
                        Ok(found.id)
                    }
                    Some(_) => Err(AuthError::InactiveUser),
                    None => Err(login_failed("auth_user_create_error", e)),
                }
            }
            Err(e) => Err(login_failed("auth_user_create_error", e)),
        }
    }

    async fn find_match(
        &self,
        email: &str,
        username: &str,
        provider: Provider,
    ) -> Result<Option<MatchedUser>, sqlx::Error> {
        // An email match outranks a username match.
        sqlx::query_as::<_, MatchedUser>(
            r#"
            SELECT u.id, u.email, u.username, u.status, a.provider AS linked_provider
            FROM users u
            LEFT JOIN accounts a ON a.user_id = u.id AND a.provider = ?1
            WHERE lower(u.email) = ?2 OR u.username = ?3
            ORDER BY lower(u.email) = ?2 DESC
            LIMIT 1
            "#,
        )
        .bind(provider.as_str())
        .bind(email)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    async fn link_existing(
        &self,
        found: &MatchedUser,
        profile: &AuthProfile,
        display_name: &str,
    ) -> Result<(), sqlx::Error> {
        // Code sign-ins carry no presentation details; OAuth profiles do.
        if profile.provider.is_oauth() {
            sqlx::query(
                "UPDATE users SET display_name = ?1, avatar_url = COALESCE(?2, avatar_url) WHERE id = ?3",
            )
                .bind(display_name)
                .bind(profile.avatar_url.as_deref())
                .bind(&found.id)
                .execute(&self.pool)
                .await?;
        }

        if found.linked_provider.is_none() {
            let provider_account_id = profile
                .provider_account_id
                .clone()
                .unwrap_or_else(|| found.id.clone());
            sqlx::query(
                r#"
                INSERT INTO accounts (user_id, provider, provider_account_id, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (user_id, provider) DO NOTHING
                "#,
            )
            .bind(&found.id)
            .bind(profile.provider.as_str())
            .bind(provider_account_id)
            .bind(now_millis() as i64)
            .execute(&self.pool)
            .await?;
            tracing::info!(user_id = %found.id, provider = %profile.provider, "linked new sign-in method");
        }

        Ok(())
    }

    /// `{base}_xxxx` with a random base-36 suffix that nobody holds yet.
    async fn free_username(&self, base: &str) -> Result<String, sqlx::Error> {
        loop {
            let candidate = format!("{}_{}", base, random_suffix());
            let taken: Option<(String,)> =
                sqlx::query_as("SELECT id FROM users WHERE username = ?1")
                    .bind(&candidate)
                    .fetch_optional(&self.pool)
                    .await?;
            if taken.is_none() {
                return Ok(candidate);
            }
        }
    }

    /// Insert the user and its first account in one transaction.
    async fn create_user(
        &self,
        email: &str,
        username: &str,
        display_name: &str,
        profile: &AuthProfile,
    ) -> Result<String, sqlx::Error> {
        let user_id = uuid::Uuid::new_v4().to_string();
        let now = now_millis() as i64;
        let provider_account_id = profile
            .provider_account_id
            .clone()
            .unwrap_or_else(|| user_id.clone());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, display_name, avatar_url, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6)
            "#,
        )
        .bind(&user_id)
        .bind(email)
        .bind(username)
        .bind(display_name)
        .bind(profile.avatar_url.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, provider, provider_account_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&user_id)
        .bind(profile.provider.as_str())
        .bind(provider_account_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, provider = %profile.provider, "user created");
        Ok(user_id)
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, username, display_name, avatar_url, status, created_at
            FROM users WHERE id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Per-request lookup for session validation.
    pub async fn find_session_user(&self, user_id: &str) -> Result<Option<SessionUser>, sqlx::Error> {
        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT id, email, display_name, avatar_url, status, created_at
            FROM users WHERE id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionUser::from))
    }

    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>, sqlx::Error> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT user_id, provider, provider_account_id, created_at
            FROM accounts WHERE user_id = ?1
            ORDER BY created_at, provider
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let provider = row.provider.parse().ok()?;
                Some(Account {
                    user_id: row.user_id,
                    provider,
                    provider_account_id: row.provider_account_id,
                    created_at: row.created_at,
                })
            })
            .collect())
    }

    /// Delete a user; linked accounts go with it. Returns whether a user was removed.
    pub async fn delete_user(&self, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_status(&self, user_id: &str, status: UserStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn random_suffix() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..4)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn login_failed(event: &str, e: sqlx::Error) -> AuthError {
    tracing::error!(event, error = %e, "sign-in storage failure");
    AuthError::LoginFailed
}
