//! OCSF (Open Cybersecurity Schema Framework) structured event logging.
//!
//! Sign-ins, sign-outs and session revocations are emitted as Authentication
//! (3001) events on the `ocsf` tracing target, one JSON document per line.
//! Emitting never fails the request.

use serde_json::json;

use crate::identity::Provider;
use crate::kv::now_millis;

// OCSF event class UIDs
pub const CLASS_AUTHENTICATION: u32 = 3001;

// Activity IDs
pub const ACTIVITY_LOGON: u32 = 1;
pub const ACTIVITY_LOGOFF: u32 = 2;
pub const ACTIVITY_OTHER: u32 = 99; // Session revocation

// Status IDs
pub const STATUS_SUCCESS: u32 = 1;
pub const STATUS_FAILURE: u32 = 2;

// Severity IDs
pub const SEVERITY_INFORMATIONAL: u32 = 1;
pub const SEVERITY_LOW: u32 = 2;
pub const SEVERITY_MEDIUM: u32 = 3;
pub const SEVERITY_HIGH: u32 = 4;

// Auth protocol IDs
pub const AUTH_PROTOCOL_UNKNOWN: u32 = 0;
pub const AUTH_PROTOCOL_OAUTH2: u32 = 6;
pub const AUTH_PROTOCOL_OTHER: u32 = 99;

fn severity_name(id: u32) -> &'static str {
    match id {
        SEVERITY_INFORMATIONAL => "Informational",
        SEVERITY_LOW => "Low",
        SEVERITY_MEDIUM => "Medium",
        SEVERITY_HIGH => "High",
        5 => "Critical",
        _ => "Unknown",
    }
}

fn status_name(id: u32) -> &'static str {
    match id {
        STATUS_SUCCESS => "Success",
        _ => "Failure",
    }
}

/// Protocol id and name for a sign-in method.
pub fn auth_protocol(provider: Option<Provider>) -> (u32, &'static str) {
    match provider {
        Some(Provider::Code) => (AUTH_PROTOCOL_OTHER, "Email one-time code"),
        Some(Provider::Google) | Some(Provider::GitHub) => (AUTH_PROTOCOL_OAUTH2, "OAuth 2.0"),
        None => (AUTH_PROTOCOL_UNKNOWN, "Unknown"),
    }
}

/// Who an event is about. Any part may be unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct Actor<'a> {
    pub user_id: Option<&'a str>,
    pub email: Option<&'a str>,
    pub session_id: Option<&'a str>,
}

fn emit(event: &serde_json::Value) {
    if let Ok(json) = serde_json::to_string(event) {
        tracing::info!(target: "ocsf", "{}", json);
    }
}

fn build_event(
    activity_id: u32,
    activity_name: &str,
    status_id: u32,
    severity_id: u32,
    actor: Actor<'_>,
    provider: Option<Provider>,
    message: &str,
) -> serde_json::Value {
    let (auth_protocol_id, auth_protocol) = auth_protocol(provider);
    let mut event = json!({
        "class_uid": CLASS_AUTHENTICATION,
        "class_name": "Authentication",
        "activity_id": activity_id,
        "activity_name": activity_name,
        "severity_id": severity_id,
        "severity": severity_name(severity_id),
        "status_id": status_id,
        "status": status_name(status_id),
        "time": now_millis(),
        "metadata": {
            "product": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }
        },
        "auth_protocol_id": auth_protocol_id,
        "auth_protocol": auth_protocol,
        "message": message,
    });

    if actor.user_id.is_some() || actor.email.is_some() {
        let mut user = json!({"type_id": 1, "type": "User"});
        if let Some(uid) = actor.user_id {
            user["uid"] = json!(uid);
        }
        if let Some(email) = actor.email {
            user["email_addr"] = json!(email);
        }
        event["actor"] = json!({"user": user});
    }
    if let Some(session_id) = actor.session_id {
        event["session"] = json!({"uid": session_id});
    }

    event
}

/// Emit an OCSF Authentication (3001) event.
pub fn authentication_event(
    activity_id: u32,
    activity_name: &str,
    status_id: u32,
    severity_id: u32,
    actor: Actor<'_>,
    provider: Option<Provider>,
    message: &str,
) {
    emit(&build_event(
        activity_id,
        activity_name,
        status_id,
        severity_id,
        actor,
        provider,
        message,
    ));
}

/// A session ended by someone other than its own browser.
pub fn revocation_event(user_id: &str, session_id: Option<&str>, message: &str) {
    authentication_event(
        ACTIVITY_OTHER,
        "Other",
        STATUS_SUCCESS,
        SEVERITY_LOW,
        Actor {
            user_id: Some(user_id),
            email: None,
            session_id,
        },
        None,
        message,
    );
}
