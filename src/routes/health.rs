//! GET /health

use axum::Json;
use axum::extract::State;
use std::sync::Arc;

use crate::kv::AnyKv;
use crate::types::HealthResponse;

/// Health check: reports the KV backend and enabled sign-in methods.
pub async fn health(State(state): State<Arc<crate::AppState>>) -> Json<HealthResponse> {
    let kv = match state.kv.as_ref() {
        AnyKv::Memory(_) => "memory",
        AnyKv::DynamoDb(_) => "dynamodb",
    };
    Json(HealthResponse {
        status: "ok".into(),
        kv: kv.into(),
        providers: state.providers(),
    })
}
