//!
//! huddle server binary
//! --------------------
//! Serves the OAuth login routes and `/api/me` over an in-memory store.
//! Configuration comes from environment variables; see `--help`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use huddle_auth::middleware::{AuthConfig, auth_routes};
use huddle_auth::{MemoryStore, OAuthClient};

const DEFAULT_PORT: u16 = 8080;

const HELP: &str = "huddle server

USAGE:
  huddle-server

ENVIRONMENT:
  PORT                   HTTP port (default 8080)
  APP_ENV                'production' enables Secure cookies and requires SESSION_SECRET
  SESSION_SECRET         cookie key material, at least 32 bytes
  FRONTEND_URL           redirect target after login (JSON response when unset)
  TRUST_PROXY_HEADERS    'true' records session IPs from X-Forwarded-For / X-Real-IP
  GITHUB_CLIENT_ID       enables GitHub login, with GITHUB_CLIENT_SECRET and GITHUB_CALLBACK_URL
  GOOGLE_CLIENT_ID       enables Google login, with GOOGLE_CLIENT_SECRET and GOOGLE_CALLBACK_URL
  RUST_LOG               log filter, e.g. 'info,huddle_auth=debug'
";

fn parse_port_env(name: &str) -> Result<Option<u16>> {
    match std::env::var(name) {
        Ok(val) => val
            .parse::<u16>()
            .map(Some)
            .with_context(|| format!("{name} must be a port number, got '{val}'")),
        Err(_) => Ok(None),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber with env filter if provided
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
    {
        eprintln!("huddle-server: logging disabled, subscriber init failed: {e}");
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print!("{HELP}");
        return Ok(());
    }

    let port = parse_port_env("PORT")?.unwrap_or(DEFAULT_PORT);
    let config = AuthConfig::from_env().context("invalid session configuration")?;
    let providers = OAuthClient::from_env().context("invalid provider configuration")?;

    let enabled: Vec<String> = providers.providers().map(|p| p.to_string()).collect();
    if enabled.is_empty() {
        tracing::warn!("No OAuth providers configured; logins will fail");
    }

    let store = MemoryStore::new();
    let app = auth_routes(config, providers, store.clone(), store);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!(port, providers = ?enabled, "huddle server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
