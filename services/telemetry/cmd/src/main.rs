//! Telemetry ingester binary.
//!
//! Wires the MQTT consumer, the ingestion processor, and the retention
//! sweep to one shared store, and runs them until SIGINT/SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use telemetry_ingest::{run_consumer, run_retention, EnvelopeEvent, Processor};
use telemetry_storage::StorageMode;

mod config;

use config::TelemetryConfig;

/// Capacity of the consumer -> processor channel. A full channel stalls the
/// consumer, which is the intended flow control.
const ENVELOPE_CHANNEL_CAPACITY: usize = 256;

/// Mesh telemetry ingester
#[derive(Parser, Debug)]
#[command(name = "telemetryd", version, about = "Mesh telemetry ingester")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Broker host (overrides config file)
    #[arg(long)]
    broker: Option<String>,

    /// Broker port (overrides config file)
    #[arg(long)]
    port: Option<u16>,

    /// Topic pattern to subscribe to (repeatable, overrides config file)
    #[arg(long)]
    topic: Vec<String>,

    /// Retention sweep interval, e.g. 1h (overrides config file)
    #[arg(long)]
    retention_interval: Option<humantime::Duration>,

    /// Retention row lifetime, e.g. 14d (overrides config file)
    #[arg(long)]
    retention_max_age: Option<humantime::Duration>,

    /// Storage mode: memory
    #[arg(long, default_value = "memory")]
    storage_mode: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("telemetryd={}", args.log_level).parse()?)
        .add_directive(format!("telemetry_ingest={}", args.log_level).parse()?)
        .add_directive(format!("telemetry_storage={}", args.log_level).parse()?)
        .add_directive(format!("telemetry_wire={}", args.log_level).parse()?)
        .add_directive(format!("telemetry_topology={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!("Starting telemetry ingester v{}", env!("CARGO_PKG_VERSION"));

    let config = TelemetryConfig::load_from_file(&args.config)?;

    let mut consumer_settings = config.consumer_settings()?;
    if let Some(broker) = args.broker {
        consumer_settings.host = broker;
    }
    if let Some(port) = args.port {
        consumer_settings.port = port;
    }
    if !args.topic.is_empty() {
        consumer_settings.topics = args.topic;
    }

    let mut retention_settings = config.retention_settings()?;
    if let Some(interval) = args.retention_interval {
        retention_settings.interval = interval.into();
    }
    if let Some(max_age) = args.retention_max_age {
        retention_settings.max_age = max_age.into();
    }

    let storage_mode = match args.storage_mode.as_str() {
        "memory" => StorageMode::InMemory,
        other => anyhow::bail!("Invalid storage mode: {other}. Use 'memory'"),
    };
    let store = storage_mode.open()?;

    info!(
        "Broker {}:{}, {} topic(s), retention every {:?} keeping {:?}",
        consumer_settings.host,
        consumer_settings.port,
        consumer_settings.topics.len(),
        retention_settings.interval,
        retention_settings.max_age
    );

    let (envelope_tx, envelope_rx) = mpsc::channel::<EnvelopeEvent>(ENVELOPE_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let write_lock = Arc::new(Mutex::new(()));

    let consumer_handle = tokio::spawn(run_consumer(
        consumer_settings,
        envelope_tx,
        shutdown_rx.clone(),
    ));

    let processor = Processor::new(store.clone(), write_lock.clone());
    let processor_shutdown = shutdown_rx.clone();
    let processor_handle = tokio::spawn(async move {
        processor.run(envelope_rx, processor_shutdown).await;
    });

    let retention_handle = tokio::spawn(run_retention(
        store.clone(),
        write_lock,
        retention_settings,
        shutdown_rx,
    ));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }

    if shutdown_tx.send(true).is_err() {
        warn!("All tasks already stopped");
    }
    let _ = consumer_handle.await;
    let _ = processor_handle.await;
    let _ = retention_handle.await;

    info!("Telemetry ingester shutdown complete");
    Ok(())
}
