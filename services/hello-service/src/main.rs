use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use common_oidc_auth::{AuthConfig, TokenVerifier, VerificationMetrics};
use hello_service::{build_router, DEFAULT_ISSUER};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = AuthConfig::from_env()?;
    if config.issuers.public.is_empty() {
        config.issuers.public = vec![DEFAULT_ISSUER.to_string()];
    }

    let issuers = Arc::new(config.issuers.trust_store()?);
    info!(issuers = ?issuers.issuers().collect::<Vec<_>>(), "trusted issuers loaded");

    let verifier = Arc::new(TokenVerifier::from_config(&config)?);
    let metrics = Arc::new(VerificationMetrics::new()?);
    let app = build_router(verifier, issuers, Some(metrics));

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let ip: std::net::IpAddr = host.parse().with_context(|| format!("invalid HOST '{host}'"))?;
    let addr = SocketAddr::from((ip, port));

    info!(%addr, "starting hello-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
