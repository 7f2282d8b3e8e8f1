//! HMAC-SHA256 signed cookies.
//!
//! Cookie value format: `base64url(json payload).base64url(hmac_signature)`
//!
//! The payload is a small claim (which user, which session); it is never
//! trusted on its own and is always re-checked against the session store.
//! Secrets form a ring: values are signed with the first secret and accepted
//! under any of them, so a secret can be rotated without signing everyone out.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::kv::now_millis;

type HmacSha256 = Hmac<Sha256>;

/// Name of the cookie carrying the session claim.
pub const AUTH_COOKIE_NAME: &str = "__auth-session";

/// Name of the cookie remembering which address a one-time code was sent to.
pub const PENDING_EMAIL_COOKIE_NAME: &str = "__auth-email";

/// Lifetime of the pending-email cookie, matching the code expiry.
pub const PENDING_EMAIL_MAX_AGE_SECS: u64 = 10 * 60;

/// Name of the cookie binding an OAuth sign-in to the browser that started it.
pub const OAUTH_STATE_COOKIE_NAME: &str = "__auth-oauth";

/// Lifetime of the OAuth state cookie, matching the stored state.
pub const OAUTH_STATE_MAX_AGE_SECS: u64 = 10 * 60;

/// The (user, session) pair a browser claims to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaim {
    pub user_id: String,
    pub session_id: String,
}

/// Email address awaiting a one-time code, plus where to go afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEmail {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    pub expires_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OAuthStateCookie {
    state: String,
    expires_at: u64,
}

/// Sign `payload` with a single secret.
pub fn sign_value(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key length is always valid");
    mac.update(payload);
    let signature = mac.finalize().into_bytes();

    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Verify a signed value against a single secret and return the payload.
///
/// Returns `None` if the signature is invalid or the format is wrong.
pub fn verify_value(secret: &[u8], cookie_value: &str) -> Option<Vec<u8>> {
    let (payload_part, sig_part) = cookie_value.split_once('.')?;

    let payload = URL_SAFE_NO_PAD.decode(payload_part).ok()?;
    let expected_sig = URL_SAFE_NO_PAD.decode(sig_part).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key length is always valid");
    mac.update(&payload);
    mac.verify_slice(&expected_sig).ok()?;

    Some(payload)
}

/// Ordered list of signing secrets. Never empty.
#[derive(Clone)]
pub struct SecretRing {
    secrets: Vec<Vec<u8>>,
}

impl SecretRing {
    /// Build a ring from secrets, newest first. Blank entries are dropped.
    pub fn new<I, S>(secrets: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let secrets: Vec<Vec<u8>> = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().as_bytes().to_vec())
            .filter(|s| !s.is_empty())
            .collect();
        if secrets.is_empty() {
            None
        } else {
            Some(Self { secrets })
        }
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        sign_value(&self.secrets[0], payload)
    }

    pub fn verify(&self, cookie_value: &str) -> Option<Vec<u8>> {
        self.secrets
            .iter()
            .find_map(|secret| verify_value(secret, cookie_value))
    }

    pub fn sign_json<T: Serialize>(&self, value: &T) -> String {
        // Serializing plain structs of strings and integers cannot fail.
        let payload = serde_json::to_vec(value).unwrap_or_default();
        self.sign(&payload)
    }

    pub fn verify_json<T: DeserializeOwned>(&self, cookie_value: &str) -> Option<T> {
        let payload = self.verify(cookie_value)?;
        serde_json::from_slice(&payload).ok()
    }
}

/// Encodes and decodes the session, pending-email and OAuth state cookies.
#[derive(Clone)]
pub struct CookieCodec {
    secrets: SecretRing,
    secure: bool,
    max_age_secs: u64,
}

impl CookieCodec {
    pub fn new(secrets: SecretRing, secure: bool, max_age_secs: u64) -> Self {
        Self {
            secrets,
            secure,
            max_age_secs,
        }
    }

    /// `Set-Cookie` value carrying a signed session claim.
    pub fn encode(&self, claim: &SessionClaim) -> String {
        let signed = self.secrets.sign_json(claim);
        make_set_cookie(AUTH_COOKIE_NAME, &signed, self.max_age_secs, self.secure)
    }

    /// Claim from a `Cookie` request header. Absence, tampering or a
    /// malformed payload all yield `None`.
    pub fn decode(&self, cookie_header: &str) -> Option<SessionClaim> {
        let value = parse_cookie(cookie_header, AUTH_COOKIE_NAME)?;
        let claim: SessionClaim = self.secrets.verify_json(value)?;
        if claim.user_id.is_empty() || claim.session_id.is_empty() {
            return None;
        }
        Some(claim)
    }

    /// Whether the request carries a session cookie at all, valid or not.
    pub fn is_present(&self, cookie_header: &str) -> bool {
        parse_cookie(cookie_header, AUTH_COOKIE_NAME).is_some_and(|v| !v.is_empty())
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn destroy(&self) -> String {
        make_delete_cookie(AUTH_COOKIE_NAME, self.secure)
    }

    pub fn encode_pending_email(&self, email: &str, redirect_to: Option<String>) -> String {
        let pending = PendingEmail {
            email: email.to_string(),
            redirect_to,
            expires_at: now_millis() + PENDING_EMAIL_MAX_AGE_SECS * 1000,
        };
        let signed = self.secrets.sign_json(&pending);
        make_set_cookie(
            PENDING_EMAIL_COOKIE_NAME,
            &signed,
            PENDING_EMAIL_MAX_AGE_SECS,
            self.secure,
        )
    }

    pub fn decode_pending_email(&self, cookie_header: &str) -> Option<PendingEmail> {
        let value = parse_cookie(cookie_header, PENDING_EMAIL_COOKIE_NAME)?;
        let pending: PendingEmail = self.secrets.verify_json(value)?;
        (pending.expires_at > now_millis()).then_some(pending)
    }

    pub fn destroy_pending_email(&self) -> String {
        make_delete_cookie(PENDING_EMAIL_COOKIE_NAME, self.secure)
    }

    /// `Set-Cookie` value remembering the state of an OAuth sign-in this
    /// browser started.
    pub fn encode_oauth_state(&self, state: &str) -> String {
        let payload = OAuthStateCookie {
            state: state.to_string(),
            expires_at: now_millis() + OAUTH_STATE_MAX_AGE_SECS * 1000,
        };
        let signed = self.secrets.sign_json(&payload);
        make_set_cookie(
            OAUTH_STATE_COOKIE_NAME,
            &signed,
            OAUTH_STATE_MAX_AGE_SECS,
            self.secure,
        )
    }

    /// Whether the request carries an unexpired state cookie for exactly
    /// `state`.
    pub fn oauth_state_matches(&self, cookie_header: &str, state: &str) -> bool {
        let Some(value) = parse_cookie(cookie_header, OAUTH_STATE_COOKIE_NAME) else {
            return false;
        };
        let Some(cookie) = self.secrets.verify_json::<OAuthStateCookie>(value) else {
            return false;
        };
        !state.is_empty()
            && cookie.expires_at > now_millis()
            && bool::from(cookie.state.as_bytes().ct_eq(state.as_bytes()))
    }

    pub fn destroy_oauth_state(&self) -> String {
        make_delete_cookie(OAUTH_STATE_COOKIE_NAME, self.secure)
    }
}

fn make_set_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut parts = vec![
        format!("{}={}", name, value),
        format!("Max-Age={}", max_age_secs),
        "Path=/".into(),
        "HttpOnly".into(),
        "SameSite=Lax".into(),
    ];
    if secure {
        parts.push("Secure".into());
    }
    parts.join("; ")
}

fn make_delete_cookie(name: &str, secure: bool) -> String {
    let mut parts = vec![
        format!("{}=", name),
        "Max-Age=0".into(),
        "Path=/".into(),
        "HttpOnly".into(),
        "SameSite=Lax".into(),
    ];
    if secure {
        parts.push("Secure".into());
    }
    parts.join("; ")
}

/// Parse a specific cookie from a Cookie header value.
fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let trimmed = part.trim();
        if let Some(value) = trimmed.strip_prefix(name)
            && let Some(value) = value.strip_prefix('=')
        {
            return Some(value);
        }
    }
    None
}
