use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ride_core::notify::{LogNotifier, PushNotifier};
use ride_core::service::RideService;
use ride_server::config::ServerConfig;
use ride_server::logging::init_tracing;
use ride_server::push::WebhookNotifier;
use ride_server::{app, spawn_offer_expiry, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_tracing(config.log_format, &config.log_filter);
    config.validate()?;

    let notifier: Arc<dyn PushNotifier> = match &config.push_webhook_url {
        Some(url) => {
            info!(%url, "push notifications via webhook");
            Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_millis(config.push_timeout_ms),
            )?)
        }
        None => Arc::new(LogNotifier),
    };
    let service = Arc::new(
        RideService::builder(config.service_config())
            .with_notifier(notifier)
            .build(),
    );

    let sweeper = spawn_offer_expiry(
        service.clone(),
        Duration::from_secs(config.expiry_sweep_secs),
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %config.bind, "ride server listening");

    axum::serve(listener, app(AppState::new(service)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    info!("ride server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
