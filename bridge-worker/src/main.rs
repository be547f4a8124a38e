//! Kafka Bridge - relays messages from the Kafka REST proxy to cms-notifier.
//!
//! Starts `NUM_CONSUMERS` consume loops and serves the operational endpoints
//! until SIGINT/SIGTERM, then stops polling and gives in-flight forwards a
//! bounded window to finish.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal, sync::watch, task::JoinHandle};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_bridge::{
    run_consumer, web, AppState, Config, ConsumerStats, Forwarder, HealthChecker, ProxyConsumer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("bridge_starting");

    // Load configuration from environment
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        queue_addrs = ?config.queue_addrs,
        queue_topic = %config.queue_topic,
        queue_group = %config.queue_group,
        downstream_addr = %config.downstream_addr,
        downstream_host = %config.downstream_host,
        num_consumers = config.num_consumers,
        max_in_flight = ?config.max_in_flight,
        "config_loaded"
    );

    // One pooled client shared by forwards, proxy calls and health probes
    let client = config
        .http_settings()
        .build_client()
        .context("Failed to create HTTP client")?;

    let downstream = config.downstream();
    let forwarder = Arc::new(Forwarder::new(client.clone(), &downstream));
    let checker = HealthChecker::new(
        client.clone(),
        config.queue_probe(),
        downstream,
        config.health_timeout(),
    );

    // Bind before consuming so a taken port fails fast
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Consumers start in the background so the endpoints answer and
    // signals are handled while the start delay runs.
    let (stop_tx, stop_rx) = watch::channel(false);
    let launcher = tokio::spawn(launch_consumers(
        config.clone(),
        client.clone(),
        Arc::clone(&forwarder),
        stop_rx,
    ));

    let app = web::router(AppState::new(checker));
    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("bridge_stopping");
    stop_tx.send_replace(true);

    let consumers = match launcher.await {
        Ok(consumers) => consumers,
        Err(e) => {
            error!(error = %e, "consumer_launch_failed");
            Vec::new()
        }
    };

    for (index, handle) in consumers.into_iter().enumerate() {
        match handle.await {
            Ok(stats) => info!(
                consumer = index,
                dispatched = stats.dispatched,
                delivered = stats.delivered,
                abandoned = stats.abandoned,
                "consumer_joined"
            ),
            Err(e) => error!(consumer = index, error = %e, "consumer_join_failed"),
        }
    }

    info!("bridge_shutdown_complete");

    Ok(())
}

/// Spawn `num_consumers` consume loops, spaced by the configured start delay.
///
/// Stops launching as soon as the stop flag is raised.
async fn launch_consumers(
    config: Config,
    client: reqwest::Client,
    forwarder: Arc<Forwarder>,
    mut stop_rx: watch::Receiver<bool>,
) -> Vec<JoinHandle<ConsumerStats>> {
    let mut consumers = Vec::with_capacity(config.num_consumers);
    let delay = Duration::from_millis(config.consumer_start_delay_ms);

    for index in 0..config.num_consumers {
        if index > 0 && !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.changed() => break,
            }
        }
        if *stop_rx.borrow() {
            break;
        }

        let source = ProxyConsumer::new(client.clone(), config.proxy_settings());
        consumers.push(tokio::spawn(run_consumer(
            source,
            Arc::clone(&forwarder),
            config.consumer_settings(),
            stop_rx.clone(),
        )));
        info!(consumer = index, "consumer_spawned");
    }

    consumers
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
