use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Extension;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authgate::cache::TieredCache;
use authgate::crypto::csrf::CsrfGuard;
use authgate::crypto::hashing;
use authgate::crypto::tokens::TokenIssuer;
use authgate::middleware::audit::AuditWriter;
use authgate::middleware::rate_limit::RedisRateLimiter;
use authgate::middleware::vendor_auth;
use authgate::models::vendor::TenantContext;
use authgate::notification::webhook::AlertNotifier;
use authgate::session::idp::IdpClient;
use authgate::store::postgres::{NewOAuthClient, NewVendorOrganization, PgStore};
use authgate::{api, cli, config, jobs, oauth, session, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OTLP export is optional: enabled only when an endpoint is configured,
    // stdout logging otherwise.
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "authgate"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .expect("failed to install OpenTelemetry tracer");
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "authgate=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::Client { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_client_command(&db, command).await
        }
        Some(cli::Commands::Vendor { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_vendor_command(&db, &cfg, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    tracing::info!("Connecting to Redis...");
    let redis_client = redis::Client::open(cfg.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let cache = TieredCache::new(redis_conn);

    let alerts = AlertNotifier::new(cfg.alert_webhook_urls.clone());
    let state = Arc::new(AppState {
        issuer: TokenIssuer::new(cfg.session_signing_key.as_bytes()),
        csrf: CsrfGuard::new(cache.clone()),
        idp: IdpClient::new(&cfg.idp_base_url, cfg.idp_timeout_secs),
        limiter: Arc::new(RedisRateLimiter::new(cache.clone())),
        audit: AuditWriter::new(db.pool().clone(), alerts.clone()),
        alerts,
        cache,
        config: cfg,
        db: db.clone(),
    });

    // Tenant-scoped vendor surface: every route in this subtree passes
    // through the vendor authorizer and carries a TenantContext extension.
    let tenant_routes = axum::Router::new()
        .route("/tenant/whoami", axum::routing::get(tenant_whoami))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            vendor_auth::vendor_auth,
        ));

    let app = axum::Router::new()
        // Health endpoints (no auth)
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .route("/readyz", axum::routing::get(readiness_check))
        // OAuth2 authorization-code + PKCE surface
        .nest("/oauth", oauth::router())
        // Legacy session surface
        .nest("/v1/auth", session::router())
        // Vendor-key surface
        .nest("/v1", tenant_routes)
        // Management API
        .nest("/admin/v1", api::router(state.clone()))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        // Restrict CORS to the dashboard origin (localhost in dev).
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            let dashboard_origin = std::env::var("AUTHGATE_DASHBOARD_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string());
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-admin-key"),
                    HeaderName::from_static("x-client-platform"),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true)
        })
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    jobs::cleanup::spawn(db);
    tracing::info!("Background cleanup job started (hourly credential purge)");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Authgate listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /v1/tenant/whoami — echo the resolved tenant scope. Exists so keys
/// can be smoke-tested without touching a billable service.
async fn tenant_whoami(Extension(tenant): Extension<TenantContext>) -> axum::Json<TenantContext> {
    axum::Json(tenant)
}

async fn readiness_check() -> &'static str {
    "ok"
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with gateway logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    // Token responses must never land in a shared cache.
    headers.insert("Cache-Control", "no-store".parse().unwrap());
    headers.insert("Referrer-Policy", "no-referrer".parse().unwrap());
    headers.remove("Server");

    resp
}

async fn handle_client_command(db: &PgStore, cmd: cli::ClientCommands) -> anyhow::Result<()> {
    match cmd {
        cli::ClientCommands::Register {
            client_id,
            client_type,
            redirect_uris,
            scopes,
        } => {
            if !matches!(client_type.as_str(), "public" | "confidential") {
                anyhow::bail!("invalid client_type: {} (public|confidential)", client_type);
            }
            if redirect_uris.is_empty() {
                anyhow::bail!("at least one --redirect-uris entry is required");
            }

            // Public clients always require PKCE.
            let requires_pkce = true;
            let id = db
                .insert_client(&NewOAuthClient {
                    client_id: client_id.clone(),
                    client_type,
                    redirect_uris,
                    allowed_scopes: scopes,
                    requires_pkce,
                })
                .await?;
            println!("Client registered:\n  ID:        {}\n  client_id: {}", id, client_id);
        }
        cli::ClientCommands::List => {
            let clients = db.list_clients().await?;
            if clients.is_empty() {
                println!("No clients registered.");
            } else {
                println!("{:<30} {:<14} {:<8} ENABLED", "CLIENT_ID", "TYPE", "PKCE");
                for c in clients {
                    println!(
                        "{:<30} {:<14} {:<8} {}",
                        c.client_id,
                        c.client_type,
                        c.requires_pkce,
                        c.disabled_at.is_none()
                    );
                }
            }
        }
        cli::ClientCommands::Disable { client_id } => {
            if db.disable_client(&client_id).await? {
                println!("Client disabled.");
            } else {
                println!("Client not found or already disabled.");
            }
        }
    }
    Ok(())
}

async fn handle_vendor_command(
    db: &PgStore,
    cfg: &config::Config,
    cmd: cli::VendorCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::VendorCommands::CreateOrg {
            vendor_code,
            rate_limit,
            platforms,
        } => {
            let id = db
                .insert_org(&NewVendorOrganization {
                    vendor_code: vendor_code.clone(),
                    allowed_platforms: platforms.unwrap_or_default(),
                    allowed_services: serde_json::json!({}),
                    rate_limit_per_minute: rate_limit
                        .unwrap_or(cfg.default_rate_limit_per_minute as i32),
                })
                .await?;
            println!("Organization created:\n  ID:   {}\n  Code: {}", id, vendor_code);
        }
        cli::VendorCommands::ListOrgs => {
            let orgs = db.list_orgs().await?;
            if orgs.is_empty() {
                println!("No organizations found.");
            } else {
                println!("{:<38} {:<20} RPM", "ID", "CODE");
                for o in orgs {
                    println!("{:<38} {:<20} {}", o.id, o.vendor_code, o.rate_limit_per_minute);
                }
            }
        }
        cli::VendorCommands::IssueKey {
            vendor_code,
            key_type,
            environment,
        } => {
            if !matches!(key_type.as_str(), "live" | "test") {
                anyhow::bail!("invalid key_type: {} (live|test)", key_type);
            }
            let org = db
                .get_org_by_code(&vendor_code)
                .await?
                .ok_or_else(|| anyhow::anyhow!("organization not found: {}", vendor_code))?;

            let issuer = TokenIssuer::new(cfg.session_signing_key.as_bytes());
            let material = issuer.new_vendor_key(&key_type);
            let secret_hash = hashing::hash_vendor_secret(&material.key_secret)?;

            db.insert_vendor_key(&authgate::store::postgres::NewVendorApiKey {
                key_id: material.key_id.clone(),
                key_secret_hash: secret_hash,
                org_id: org.id,
                key_type,
                environment,
            })
            .await?;

            println!("API key issued. The secret is shown once and not stored:");
            println!("  key_id:  {}", material.key_id);
            println!("  secret:  {}", material.key_secret);
            println!("  Use:     Authorization: Bearer {}", material.bearer_value());
        }
        cli::VendorCommands::RevokeKey { key_id } => {
            if db.revoke_vendor_key(&key_id).await? {
                println!("Key revoked.");
            } else {
                println!("Key not found or already revoked.");
            }
        }
    }
    Ok(())
}
