use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use authentik_demo::config::AppConfig;
use authentik_demo::flow::AuthFlow;
use authentik_demo::provider::ProviderClient;
use authentik_demo::routes::{build_router, RouterConfig};
use authentik_demo::session::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let port = config.port;

    let provider = Arc::new(ProviderClient::new(config.provider.clone()));
    let store = Arc::new(MemoryStore::new());
    let flow = AuthFlow::new(provider, store);

    let router = build_router(
        RouterConfig {
            cookie_key: config.cookie_key.clone(),
            scopes: config.scopes.clone(),
            secure_cookies: config.secure_cookies,
        },
        flow,
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    tracing::info!(
        port,
        authorization_endpoint = %config.provider.authorization_endpoint,
        client_id = %config.provider.client_id,
        "Server started"
    );

    axum::serve(listener, router).await?;
    Ok(())
}
