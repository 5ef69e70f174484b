//! Authgate — identity and authorization gateway.
//!
//! Three credential populations, one service: a legacy session-token scheme
//! for CLI and machine clients, OAuth2 authorization-code + PKCE for
//! interactive clients, and long-lived vendor API keys scoped to tenant
//! organizations. The entry paths never call each other; they share the
//! credential hasher, token issuer, and audit writer, and dispatch happens
//! on route and credential shape before any validation runs.

use std::sync::Arc;

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod oauth;
pub mod session;
pub mod store;

use cache::TieredCache;
use config::Config;
use crypto::csrf::CsrfGuard;
use crypto::tokens::TokenIssuer;
use middleware::audit::AuditWriter;
use middleware::rate_limit::RateLimiter;
use notification::webhook::AlertNotifier;
use session::idp::IdpClient;
use store::postgres::PgStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub db: PgStore,
    pub cache: TieredCache,
    pub issuer: TokenIssuer,
    pub csrf: CsrfGuard,
    pub idp: IdpClient,
    pub limiter: Arc<dyn RateLimiter>,
    pub audit: AuditWriter,
    pub alerts: AlertNotifier,
    pub config: Config,
}
