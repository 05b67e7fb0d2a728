mod cache;
mod frame;
mod saver;
mod subscriber;
mod writer;

use cache::FrameCache;
use ir_saver_common::config::{Config, ConfigError};
use rdkafka::consumer::Consumer;
use saver::PeriodicSaver;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create save directory {0}: {1}")]
    CreateDirectory(String, std::io::Error),
    #[error("save path {0} exists but is not a directory")]
    NotADirectory(String),
    #[error("failed to create Kafka consumer: {0}")]
    KafkaCreate(String),
    #[error("failed to subscribe to topic {0}: {1}")]
    Subscribe(String, String),
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        brokers = config.kafka.brokers,
        topic = config.kafka.topic,
        group_id = config.kafka.group_id,
        queue_depth = config.kafka.queue_depth,
        interval_secs = config.saver.interval_secs,
        directory = %config.saver.directory.display(),
        "starting IR image auto saver"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let cache = FrameCache::new();

    // The save directory must exist before anything is subscribed.
    let saver = PeriodicSaver::new(&config.saver, cache.clone())?;
    let consumer = subscriber::create_consumer(&config.kafka)?;

    let (queue_tx, queue_rx) = broadcast::channel(config.kafka.queue_depth);
    let ingest = tokio::spawn(subscriber::run_ingest(queue_rx, cache));
    info!(directory = %saver.directory().display(), "IR image auto saver started");
    let saver = saver.spawn();

    tokio::select! {
        _ = subscriber::run_consumer_loop(&consumer, queue_tx) => {
            warn!("Kafka stream ended, shutting down");
        }
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
        },
    }

    // The queue sender was dropped with the consumer loop, which ends ingest.
    let saver_stats = saver.stop().await;
    consumer.unsubscribe();
    let ingest_stats = match ingest.await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "ingest task failed");
            Default::default()
        }
    };

    info!(
        saved = saver_stats.saved,
        skipped = saver_stats.skipped,
        failed = saver_stats.failed,
        received = ingest_stats.received,
        cached = ingest_stats.cached,
        dropped = ingest_stats.dropped,
        last_saved = ?saver_stats.last_saved,
        "shutdown complete"
    );
    Ok(())
}
