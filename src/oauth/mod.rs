use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub mod handlers;

/// OAuth2 authorization-code + PKCE surface. The authorization endpoint
/// serves browser navigation and answers by redirect; the three POST
/// endpoints serve programmatic clients and answer JSON, unconditionally.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/authorize", get(handlers::authorize))
        .route("/token", post(handlers::token))
        .route("/revoke", post(handlers::revoke))
        .route("/introspect", post(handlers::introspect))
}
