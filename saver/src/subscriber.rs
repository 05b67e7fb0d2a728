use bytes::Bytes;
use futures_util::StreamExt;
use ir_saver_common::config::KafkaConfig;
use ir_saver_common::message::ImageMessage;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::ClientConfig;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::cache::FrameCache;
use crate::StartupError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Payloads taken off the queue.
    pub received: u64,
    /// Messages that decoded and replaced the cached frame.
    pub cached: u64,
    /// Payloads dropped because the queue overflowed.
    pub dropped: u64,
}

/// Create a Kafka consumer subscribed to the image topic.
pub fn create_consumer(config: &KafkaConfig) -> Result<StreamConsumer, StartupError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("auto.offset.reset", "latest")
        .set("enable.auto.commit", "true")
        .set("auto.commit.interval.ms", "1000")
        .set("max.partition.fetch.bytes", "10485760")
        .create()
        .map_err(|e| StartupError::KafkaCreate(e.to_string()))?;

    consumer
        .subscribe(&[&config.topic])
        .map_err(|e| StartupError::Subscribe(config.topic.clone(), e.to_string()))?;

    info!(topic = config.topic, "subscribed to Kafka topic");
    Ok(consumer)
}

/// Hand every Kafka payload to the ingest queue. Returns when the stream ends.
///
/// The queue is bounded; once full, the oldest payloads are overwritten so
/// a slow ingest always catches up on the most recent images.
pub async fn run_consumer_loop(consumer: &StreamConsumer, queue: broadcast::Sender<Bytes>) {
    let mut stream = consumer.stream();

    while let Some(result) = stream.next().await {
        match result {
            Ok(msg) => {
                let Some(payload) = msg.payload() else {
                    debug!("empty Kafka message, skipping");
                    continue;
                };
                if queue.send(Bytes::copy_from_slice(payload)).is_err() {
                    debug!("ingest queue has no receiver, dropping message");
                }
            }
            Err(e) => {
                warn!(error = %e, "Kafka consume error");
            }
        }
    }
}

/// Decode queued payloads into the frame cache until the queue closes.
pub async fn run_ingest(mut queue: broadcast::Receiver<Bytes>, cache: FrameCache) -> IngestStats {
    let mut stats = IngestStats::default();

    loop {
        let payload = match queue.recv().await {
            Ok(p) => p,
            Err(RecvError::Lagged(skipped)) => {
                stats.dropped += skipped;
                warn!(skipped, "ingest fell behind, dropped oldest image messages");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        stats.received += 1;

        let msg = match ImageMessage::deserialize(&payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to deserialize image message, skipping");
                continue;
            }
        };

        if cache.update(&msg) {
            stats.cached += 1;
        }

        if stats.received % 100 == 0 {
            debug!(
                received = stats.received,
                cached = stats.cached,
                stamp = ?msg.stamp(),
                "image messages processed"
            );
        }
    }

    info!(
        received = stats.received,
        cached = stats.cached,
        dropped = stats.dropped,
        "ingest stopped"
    );
    stats
}
