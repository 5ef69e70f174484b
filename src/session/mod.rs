use std::sync::Arc;

use axum::routing::post;
use axum::Router;

use crate::AppState;

pub mod handlers;
pub mod idp;

/// Legacy session routes. Every route here serves programmatic clients and
/// declares `application/json` unconditionally; there is no content-type
/// branching on inferred client identity anywhere in this tree.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .route("/logout", post(handlers::logout))
}
