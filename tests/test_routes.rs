//! Integration tests for all HTTP route handlers.
//!
//! Uses Tower's `oneshot()` to test the full Axum app including the guard.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, build_test_app, build_test_app_with_config, build_test_app_with_kv, clears_cookie,
    code_sign_in_response, cookie_pair, delivered_code, get, location, post, post_form, sent_count,
    sign_in,
};
use serde_json::json;
use session_keeper::config::{Config, OAuthClientConfig};
use session_keeper::identity::UserStatus;
use session_keeper::kv::AnyKv;
use session_keeper::kv::dynamodb::DynamoDbKv;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION_COOKIE: &str = "__auth-session";
const OAUTH_STATE_COOKIE: &str = "__auth-oauth";

// ───── GET /health ─────

#[tokio::test]
async fn test_health() {
    let (app, _state) = build_test_app().await;

    let resp = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["kv"], "memory");
    assert_eq!(body["providers"], json!(["code"]));
}

// ───── emailed code sign-in ─────

#[tokio::test]
async fn test_code_sign_in_flow() {
    let (app, state) = build_test_app().await;

    let resp = code_sign_in_response(&app, &state, "Alice@Example.com", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    assert!(clears_cookie(&resp, "__auth-email"));
    let cookie = cookie_pair(&resp, SESSION_COOKIE).unwrap();

    let resp = app.clone().oneshot(get("/account", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["accounts"].as_array().unwrap().len(), 1);
    assert_eq!(body["accounts"][0]["provider"], "code");
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["isCurrent"], true);
    assert_eq!(sessions[0]["userAgent"], "Unknown");
    assert_eq!(sessions[0]["ipAddress"], "127.0.0.1");
}

#[tokio::test]
async fn test_session_cookie_attributes() {
    let (app, state) = build_test_app().await;
    let resp = code_sign_in_response(&app, &state, "alice@example.com", None).await;

    let set_cookie = common::set_cookies(&resp)
        .into_iter()
        .find(|c| c.starts_with("__auth-session="))
        .unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains(&format!("Max-Age={}", 15 * 24 * 3600)));
}

#[tokio::test]
async fn test_sign_in_returns_to_requested_path() {
    let (app, state) = build_test_app().await;
    let resp = code_sign_in_response(&app, &state, "alice@example.com", Some("/todos?filter=open")).await;
    assert_eq!(location(&resp), "/todos?filter=open");
}

#[tokio::test]
async fn test_external_redirect_ignored() {
    let (app, state) = build_test_app().await;
    let resp = code_sign_in_response(&app, &state, "alice@example.com", Some("http://evil.com")).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_some());
}

#[tokio::test]
async fn test_wrong_code_is_rejected_and_burned() {
    let (app, state) = build_test_app().await;

    let already_sent = sent_count(&state);
    let resp = app
        .clone()
        .oneshot(post_form(
            "/auth/login",
            &[("intent", "code"), ("email", "alice@example.com")],
            None,
        ))
        .await
        .unwrap();
    let pending = cookie_pair(&resp, "__auth-email").unwrap();
    let code = delivered_code(&state, "alice@example.com", already_sent).await;

    let resp = app
        .clone()
        .oneshot(post_form("/auth/verify", &[("code", "NOPE00")], Some(&pending)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/auth/login?error="));
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_none());

    // The real code was consumed by the failed attempt.
    let resp = app
        .clone()
        .oneshot(post_form("/auth/verify", &[("code", code.as_str())], Some(&pending)))
        .await
        .unwrap();
    assert!(location(&resp).starts_with("/auth/login?error="));
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_none());
}

#[tokio::test]
async fn test_verify_without_pending_email() {
    let (app, _state) = build_test_app().await;
    let resp = app
        .oneshot(post_form("/auth/verify", &[("code", "ABC123")], None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/auth/login?error="));
}

#[tokio::test]
async fn test_invalid_email_rejected() {
    let (app, state) = build_test_app().await;
    let resp = app
        .oneshot(post_form(
            "/auth/login",
            &[("intent", "code"), ("email", "not-an-email")],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/auth/login?error="));
    assert_eq!(sent_count(&state), 0);
}

#[tokio::test]
async fn test_unconfigured_provider_rejected() {
    let (app, _state) = build_test_app().await;
    let resp = app
        .oneshot(post_form("/auth/login", &[("intent", "google")], None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/auth/login?error="));
}

#[tokio::test]
async fn test_login_options() {
    let (app, _state) = build_test_app().await;
    let resp = app
        .oneshot(get("/auth/login?error=Oops&redirectTo=%2F%2Fevil.com", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Oops");
    assert_eq!(body["redirectTo"], "/");
}

// ───── guard ─────

#[tokio::test]
async fn test_protected_route_redirects_to_login() {
    let (app, _state) = build_test_app().await;
    let resp = app.oneshot(get("/account", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/login?redirectTo=%2Faccount");
}

#[tokio::test]
async fn test_guest_route_redirects_home_when_signed_in() {
    let (app, state) = build_test_app().await;
    let cookie = sign_in(&app, &state, "alice@example.com").await;

    let resp = app.oneshot(get("/auth/login", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn test_tampered_cookie_is_cleared() {
    let (app, state) = build_test_app().await;
    let cookie = sign_in(&app, &state, "alice@example.com").await;
    let tampered = format!("{}AA", cookie);

    let resp = app.clone().oneshot(get("/", Some(&tampered))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(clears_cookie(&resp, SESSION_COOKIE));
    assert_eq!(body_json(resp).await["authenticated"], false);
}

#[tokio::test]
async fn test_home_reports_signed_in_user() {
    let (app, state) = build_test_app().await;
    let cookie = sign_in(&app, &state, "alice@example.com").await;

    let resp = app.oneshot(get("/", Some(&cookie))).await.unwrap();
    assert!(!clears_cookie(&resp, SESSION_COOKIE));
    let body = body_json(resp).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_inactive_user_is_signed_out() {
    let (app, state) = build_test_app().await;
    let cookie = sign_in(&app, &state, "alice@example.com").await;

    let resp = app.clone().oneshot(get("/", Some(&cookie))).await.unwrap();
    let user_id = body_json(resp).await["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    state
        .identities
        .set_status(&user_id, UserStatus::Inactive)
        .await
        .unwrap();

    let resp = app.clone().oneshot(get("/account", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/login?redirectTo=%2Faccount");
    assert!(clears_cookie(&resp, SESSION_COOKIE));

    // And cannot sign back in.
    let resp = code_sign_in_response(&app, &state, "alice@example.com", None).await;
    assert!(location(&resp).starts_with("/auth/login?error=Login%20failed"));
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_none());
}

// ───── POST /auth/logout ─────

#[tokio::test]
async fn test_logout_revokes_session() {
    let (app, state) = build_test_app().await;
    let cookie = sign_in(&app, &state, "alice@example.com").await;

    let resp = app
        .clone()
        .oneshot(post("/auth/logout", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/login");
    assert!(clears_cookie(&resp, SESSION_COOKIE));

    // Replaying the old cookie does not work.
    let resp = app.oneshot(get("/account", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(clears_cookie(&resp, SESSION_COOKIE));
}

#[tokio::test]
async fn test_logout_without_session() {
    let (app, _state) = build_test_app().await;
    let resp = app.oneshot(post("/auth/logout", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/login");
}

// ───── /account/sessions ─────

async fn session_ids(app: &axum::Router, cookie: &str) -> Vec<(String, bool)> {
    let resp = app.clone().oneshot(get("/account", Some(cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| {
            (
                s["sessionId"].as_str().unwrap().to_string(),
                s["isCurrent"].as_bool().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_revoke_other_sessions() {
    let (app, state) = build_test_app().await;
    let laptop = sign_in(&app, &state, "alice@example.com").await;
    let phone = sign_in(&app, &state, "alice@example.com").await;
    let tablet = sign_in(&app, &state, "alice@example.com").await;
    assert_eq!(session_ids(&app, &laptop).await.len(), 3);

    let resp = app
        .clone()
        .oneshot(post("/account/sessions/revoke-others", Some(&laptop)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let remaining = session_ids(&app, &laptop).await;
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].1);

    for cookie in [phone, tablet] {
        let resp = app.clone().oneshot(get("/account", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }
}

#[tokio::test]
async fn test_revoke_single_session() {
    let (app, state) = build_test_app().await;
    let laptop = sign_in(&app, &state, "alice@example.com").await;
    let phone = sign_in(&app, &state, "alice@example.com").await;

    let sessions = session_ids(&app, &laptop).await;
    let (current, _) = sessions.iter().find(|(_, current)| *current).unwrap();
    let (other, _) = sessions.iter().find(|(_, current)| !*current).unwrap();

    let resp = app
        .clone()
        .oneshot(post(
            &format!("/account/sessions/{}/revoke", current),
            Some(&laptop),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(post(
            &format!("/account/sessions/{}/revoke", other),
            Some(&laptop),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["success"], true);

    let resp = app.clone().oneshot(get("/account", Some(&phone))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(session_ids(&app, &laptop).await.len(), 1);
}

#[tokio::test]
async fn test_refresh_session_extends_expiry() {
    let (app, state) = build_test_app().await;
    let cookie = sign_in(&app, &state, "alice@example.com").await;

    let resp = app.clone().oneshot(get("/account", Some(&cookie))).await.unwrap();
    let before = body_json(resp).await["sessions"][0]["expiresAt"]
        .as_u64()
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let resp = app
        .clone()
        .oneshot(post("/account/sessions/refresh", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_some());
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert!(body["expiresAt"].as_u64().unwrap() > before);
}

#[tokio::test]
async fn test_account_json_endpoints_require_session() {
    let (app, _state) = build_test_app().await;
    let resp = app
        .oneshot(post("/account/sessions/revoke-others", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&resp),
        "/auth/login?redirectTo=%2Faccount%2Fsessions%2Frevoke-others"
    );
}

// ───── POST /account/delete ─────

#[tokio::test]
async fn test_delete_account() {
    let (app, state) = build_test_app().await;
    let laptop = sign_in(&app, &state, "alice@example.com").await;
    let phone = sign_in(&app, &state, "alice@example.com").await;

    let resp = app.clone().oneshot(get("/", Some(&laptop))).await.unwrap();
    let user_id = body_json(resp).await["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .clone()
        .oneshot(post("/account/delete", Some(&laptop)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(clears_cookie(&resp, SESSION_COOKIE));

    assert!(state.identities.find_user(&user_id).await.unwrap().is_none());
    assert!(state.identities.list_accounts(&user_id).await.unwrap().is_empty());
    assert_eq!(state.sessions.count_sessions(&user_id).await.unwrap(), 0);

    let resp = app.clone().oneshot(get("/account", Some(&phone))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    // Signing in again creates a fresh user.
    let cookie = sign_in(&app, &state, "alice@example.com").await;
    let resp = app.oneshot(get("/", Some(&cookie))).await.unwrap();
    assert_ne!(body_json(resp).await["user"]["id"], user_id.as_str());
}

// ───── OAuth ─────

async fn github_app(server: &MockServer) -> (axum::Router, std::sync::Arc<session_keeper::AppState>) {
    let mut config = Config::test_default();
    config.github = Some(OAuthClientConfig {
        client_id: "gh-client".into(),
        client_secret: "gh-secret".into(),
        auth_url: None,
        token_url: Some(format!("{}/login/oauth/access_token", server.uri())),
        api_url: Some(server.uri()),
    });
    build_test_app_with_config(config).await
}

async fn mount_github(server: &MockServer, email: &str) {
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_test",
            "token_type": "bearer",
            "scope": "read:user,user:email"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 583231,
            "login": "octocat",
            "name": "The Octocat",
            "email": email,
            "avatar_url": "https://avatars.example.com/u/583231"
        })))
        .mount(server)
        .await;
}

fn state_param(location: &str) -> String {
    reqwest::Url::parse(location)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

#[tokio::test]
async fn test_github_sign_in_links_existing_code_user() {
    let server = MockServer::start().await;
    mount_github(&server, "alice@example.com").await;
    let (app, state) = github_app(&server).await;

    let code_cookie = sign_in(&app, &state, "alice@example.com").await;

    let resp = app
        .clone()
        .oneshot(post_form(
            "/auth/login",
            &[("intent", "github"), ("redirectTo", "/todos")],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let to_provider = location(&resp);
    assert!(to_provider.starts_with("https://github.com/login/oauth/authorize?"));
    let oauth_state = state_param(&to_provider);
    let state_cookie = cookie_pair(&resp, OAUTH_STATE_COOKIE).unwrap();

    let resp = app
        .clone()
        .oneshot(get(
            &format!("/auth/github/callback?code=gh-code&state={}", oauth_state),
            Some(&state_cookie),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/todos");
    assert!(clears_cookie(&resp, OAUTH_STATE_COOKIE));
    let github_cookie = cookie_pair(&resp, SESSION_COOKIE).unwrap();

    let resp = app.clone().oneshot(get("/account", Some(&github_cookie))).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["displayName"], "The Octocat");
    let providers: Vec<&str> = body["accounts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["provider"].as_str().unwrap())
        .collect();
    assert_eq!(providers.len(), 2);
    assert!(providers.contains(&"code"));
    assert!(providers.contains(&"github"));
    // Both browsers are sessions of the same user.
    assert_eq!(body["sessions"].as_array().unwrap().len(), 2);

    // The state cannot be replayed, even by the browser that started it.
    let resp = app
        .clone()
        .oneshot(get(
            &format!("/auth/github/callback?code=gh-code&state={}", oauth_state),
            Some(&state_cookie),
        ))
        .await
        .unwrap();
    assert!(location(&resp).starts_with("/auth/login?error="));

    let resp = app.oneshot(get("/account", Some(&code_cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

/// Start a GitHub sign-in and return `(state, state cookie)`.
async fn start_github(app: &axum::Router) -> (String, String) {
    let resp = app
        .clone()
        .oneshot(post_form("/auth/login", &[("intent", "github")], None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let state_cookie = cookie_pair(&resp, OAUTH_STATE_COOKIE).expect("state cookie");
    (state_param(&location(&resp)), state_cookie)
}

#[tokio::test]
async fn test_callback_without_state_cookie_is_rejected() {
    let server = MockServer::start().await;
    mount_github(&server, "mallory@example.com").await;
    let (app, _state) = github_app(&server).await;

    // Someone else started this sign-in and passes the callback link on.
    let (foreign_state, _their_cookie) = start_github(&app).await;

    let resp = app
        .clone()
        .oneshot(get(
            &format!("/auth/github/callback?code=gh-code&state={}", foreign_state),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/auth/login?error="));
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_none());
}

#[tokio::test]
async fn test_callback_with_another_flows_state_is_rejected() {
    let server = MockServer::start().await;
    mount_github(&server, "mallory@example.com").await;
    let (app, _state) = github_app(&server).await;

    let (foreign_state, _their_cookie) = start_github(&app).await;
    let (_own_state, own_cookie) = start_github(&app).await;

    let resp = app
        .clone()
        .oneshot(get(
            &format!("/auth/github/callback?code=gh-code&state={}", foreign_state),
            Some(&own_cookie),
        ))
        .await
        .unwrap();
    assert!(location(&resp).starts_with("/auth/login?error="));
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_none());
    assert!(clears_cookie(&resp, OAUTH_STATE_COOKIE));
}

#[tokio::test]
async fn test_callback_with_forged_state() {
    let server = MockServer::start().await;
    mount_github(&server, "alice@example.com").await;
    let (app, _state) = github_app(&server).await;

    let resp = app
        .oneshot(get("/auth/github/callback?code=gh-code&state=forged", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/auth/login?error="));
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_none());
}

#[tokio::test]
async fn test_callback_for_unknown_provider() {
    let (app, _state) = build_test_app().await;
    let resp = app
        .oneshot(get("/auth/myspace/callback?code=x&state=y", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/auth/login?error="));
}

// ───── store outages ─────

/// App whose KV store is a DynamoDB endpoint that fails every call.
async fn app_with_failing_store(server: &MockServer) -> (axum::Router, std::sync::Arc<session_keeper::AppState>) {
    use aws_sdk_dynamodb::config::retry::RetryConfig;
    use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "__type": "com.amazonaws.dynamodb.v20120810#InternalServerError",
            "message": "store down"
        })))
        .mount(server)
        .await;

    let dynamo_config = aws_sdk_dynamodb::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("test", "test", None, None, "test"))
        .endpoint_url(server.uri())
        .retry_config(RetryConfig::disabled())
        .build();
    let kv = AnyKv::DynamoDb(DynamoDbKv::new(
        aws_sdk_dynamodb::Client::from_conf(dynamo_config),
        "app_kv".into(),
    ));

    let mut config = Config::test_default();
    config.store_timeout = Duration::from_secs(2);
    build_test_app_with_kv(config, kv).await
}

#[tokio::test]
async fn test_store_outage_when_sending_code_is_503() {
    let server = MockServer::start().await;
    let (app, state) = app_with_failing_store(&server).await;

    let resp = app
        .oneshot(post_form(
            "/auth/login",
            &[("intent", "code"), ("email", "alice@example.com")],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "Session store unavailable");
    assert_eq!(sent_count(&state), 0);
}

#[tokio::test]
async fn test_store_outage_when_verifying_code_is_503() {
    let server = MockServer::start().await;
    let (app, state) = app_with_failing_store(&server).await;

    let pending = state
        .codec
        .encode_pending_email("alice@example.com", None)
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let resp = app
        .oneshot(post_form("/auth/verify", &[("code", "ABC123")], Some(&pending)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(cookie_pair(&resp, SESSION_COOKIE).is_none());
}
