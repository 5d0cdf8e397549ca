//! MPD Remote Bridge
//!
//! Wires the remote, MQTT and MPD together and runs until SIGINT/SIGTERM.

use mpd_remote_bridge::adapters::{self, mpd::MpdConnector, Startable};
use mpd_remote_bridge::{bus, cli::Cli, config, dispatcher, player, status};

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mpd_remote_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting MPD Remote Bridge v{} ({})",
        env!("MRB_VERSION"),
        env!("MRB_GIT_SHA")
    );

    if let Err(e) = run(cli).await {
        tracing::error!("Fatal: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config = config::load_config(&cli.overrides()).context("Invalid configuration")?;
    let device = config
        .input_device()
        .context("input device not configured")?
        .to_path_buf();
    tracing::info!(
        "Configuration loaded: mqtt {}, mpd {}, input {}",
        config.mqtt.uri,
        config.mpd.address,
        device.display()
    );

    // Create event bus
    let (events_tx, events_rx) = bus::create_bus();

    // Shared player connection; MPD being down at startup is not fatal
    let manager = Arc::new(player::PlayerConnectionManager::new(MpdConnector::new(
        config.mpd.address.clone(),
        config.mpd_password(),
    )));
    if let Err(e) = manager.ensure_connected().await {
        tracing::warn!("MPD not reachable yet, will retry: {:#}", e);
    }

    // Producers: failing to start either one is fatal
    let mqtt = Arc::new(adapters::mqtt::MqttAdapter::new(
        config.mqtt_settings(),
        events_tx.clone(),
    ));
    let input = Arc::new(adapters::input::InputAdapter::new(device, events_tx));
    let producers: Vec<Arc<dyn Startable>> = vec![mqtt.clone(), input.clone()];
    for adapter in &producers {
        if let Err(e) = adapter.start().await {
            for started in &producers {
                started.stop().await;
            }
            manager.close().await;
            return Err(e.context(format!("Failed to start {} adapter", adapter.name())));
        }
        tracing::info!("{} adapter started", adapter.name());
    }

    let shutdown = CancellationToken::new();

    // State watcher mirrors MPD to MQTT
    let publisher = status::StatusPublisher::new(mqtt.clone(), config.mqtt.status_topic.clone());
    let watcher =
        player::StateWatcher::new(manager.clone(), publisher, config.watcher_settings());
    let watcher_task = tokio::spawn(watcher.run(shutdown.clone()));

    let dispatcher = dispatcher::Dispatcher::new(
        manager.clone(),
        Arc::new(config.poweroff_command()?),
    )
    .with_toggle(config.player.toggle);

    let signal_token = shutdown.clone();
    tokio::spawn(
        async move {
            shutdown_signal().await;
            signal_token.cancel();
        }
        .in_current_span(),
    );

    dispatcher.run(events_rx, shutdown.clone()).await;

    // Cleanup: stop everything in reverse order
    tracing::info!("Shutting down...");
    shutdown.cancel();
    for adapter in producers.iter().rev() {
        adapter.stop().await;
    }
    if let Err(e) = watcher_task.await {
        tracing::warn!("State watcher ended abnormally: {}", e);
    }
    manager.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
