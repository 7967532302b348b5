mod compose;
mod config;
mod directory;
mod intent;
mod outbound;
mod platform;
mod router;
mod send;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::compose::ResponseComposer;
use crate::config::Config;
use crate::directory::AgentDirectoryClient;
use crate::intent::IntentResolver;
use crate::router::EventRouter;
use crate::send::SendGateway;
use crate::webhook::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pagebot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Server URL: {}", config.messenger.server_url);
    info!("  Send API: {}", config.messenger.send_api_url);
    info!("  Directory: {}", config.directory.agents_url);
    if config.messenger.allow_unsigned {
        info!("  Unsigned webhook deliveries are accepted");
    }

    let config = Arc::new(config);
    let addr = config.listen_addr()?;

    let directory = Arc::new(AgentDirectoryClient::new(config.directory.clone()));
    let sender = Arc::new(SendGateway::new(&config.messenger));
    let router = Arc::new(EventRouter::new(
        IntentResolver::from_config(&config),
        ResponseComposer::new(config.clone(), directory),
        sender,
    ));

    let app = webhook::routes(Arc::new(AppState {
        config: config.clone(),
        router,
    }));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
