//! Which routes need a session, and what to do about it.

use super::redirect::safe_redirect_path;

pub const LOGIN_PATH: &str = "/auth/login";
pub const HOME_PATH: &str = "/";

const PROTECTED_PREFIXES: &[&str] = &["/account", "/todos", "/admin"];
const GUEST_ONLY_PREFIXES: &[&str] = &["/auth/login", "/auth/verify"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Requires a signed-in user.
    Protected,
    /// Only for people who are not signed in.
    GuestOnly,
    Public,
}

/// `path` is `prefix` itself or lies below it.
fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        if GUEST_ONLY_PREFIXES.iter().any(|p| under(path, p)) {
            RouteClass::GuestOnly
        } else if PROTECTED_PREFIXES.iter().any(|p| under(path, p)) {
            RouteClass::Protected
        } else {
            RouteClass::Public
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Continue,
    Redirect(String),
}

/// Login URL that returns to `path_and_query` afterwards.
pub fn login_redirect(path_and_query: &str) -> String {
    let back = safe_redirect_path(Some(path_and_query), HOME_PATH);
    format!("{}?redirectTo={}", LOGIN_PATH, urlencoding::encode(&back))
}

pub fn decide(class: RouteClass, authenticated: bool, path_and_query: &str) -> GuardDecision {
    match (class, authenticated) {
        (RouteClass::Protected, false) => GuardDecision::Redirect(login_redirect(path_and_query)),
        (RouteClass::GuestOnly, true) => GuardDecision::Redirect(HOME_PATH.to_string()),
        _ => GuardDecision::Continue,
    }
}
