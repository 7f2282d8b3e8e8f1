//! GET /

use axum::Json;

use crate::guard::middleware::MaybeSession;
use crate::types::HomeResponse;

pub async fn home(MaybeSession(session): MaybeSession) -> Json<HomeResponse> {
    Json(HomeResponse {
        authenticated: session.is_some(),
        user: session.map(|s| s.user),
    })
}
