//! Test utilities: app builder, form requests, cookie plumbing, code sign-in.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::Value;
use session_keeper::auth::mailer::{Mailer, Outbox};
use session_keeper::config::Config;
use session_keeper::identity::db;
use session_keeper::kv::AnyKv;
use session_keeper::kv::memory::MemoryKv;
use session_keeper::{AppState, create_app};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Build a test app with in-memory KV, in-memory SQLite and an outbox mailer.
pub async fn build_test_app() -> (axum::Router, Arc<AppState>) {
    build_test_app_with_config(Config::test_default()).await
}

/// Build a test app with a custom Config.
pub async fn build_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    build_test_app_with_kv(config, AnyKv::Memory(MemoryKv::new())).await
}

/// Build a test app over a specific KV backend.
pub async fn build_test_app_with_kv(config: Config, kv: AnyKv) -> (axum::Router, Arc<AppState>) {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let http_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let state = AppState::new(
        config,
        kv,
        pool,
        Mailer::Outbox(Outbox::new()),
        http_client,
    )
    .unwrap();

    let state = Arc::new(state);
    let app = create_app(state.clone());
    (app, state)
}

/// Helper to read response body as JSON.
pub async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// POST an urlencoded form.
pub fn post_form(uri: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

/// The `name=value` pair a browser would send back for cookie `name`,
/// if the response sets it to a non-empty value.
pub fn cookie_pair(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    set_cookies(response)
        .into_iter()
        .filter_map(|c| c.split(';').next().map(str::to_string))
        .find(|pair| pair.starts_with(&prefix) && pair.len() > prefix.len())
}

/// Whether the response deletes cookie `name`.
pub fn clears_cookie(response: &Response, name: &str) -> bool {
    let prefix = format!("{}=;", name);
    set_cookies(response)
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

pub fn sent_count(state: &AppState) -> usize {
    state.mailer.outbox().map(|o| o.len()).unwrap_or_default()
}

/// Wait until the background mailer has sent more than `already_sent`
/// messages, then return the newest code for `email`.
pub async fn delivered_code(state: &AppState, email: &str, already_sent: usize) -> String {
    let outbox = state.mailer.outbox().expect("test app uses the outbox mailer");
    for _ in 0..100 {
        if outbox.len() > already_sent
            && let Some(code) = outbox.last_code_for(email)
        {
            return code;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no code delivered to {}", email);
}

/// Run the whole emailed-code flow and return the final verify response.
pub async fn code_sign_in_response(
    app: &axum::Router,
    state: &AppState,
    email: &str,
    redirect_to: Option<&str>,
) -> Response {
    let mut fields = vec![("intent", "code"), ("email", email)];
    if let Some(redirect_to) = redirect_to {
        fields.push(("redirectTo", redirect_to));
    }
    let already_sent = sent_count(state);
    let resp = app
        .clone()
        .oneshot(post_form("/auth/login", &fields, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/verify");
    let pending = cookie_pair(&resp, "__auth-email").expect("pending email cookie");

    let code = delivered_code(state, &email.trim().to_lowercase(), already_sent).await;
    app.clone()
        .oneshot(post_form("/auth/verify", &[("code", code.as_str())], Some(&pending)))
        .await
        .unwrap()
}

/// Sign in with an emailed code and return the session `Cookie` header.
pub async fn sign_in(app: &axum::Router, state: &AppState, email: &str) -> String {
    let resp = code_sign_in_response(app, state, email, None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    cookie_pair(&resp, "__auth-session").expect("session cookie")
}
