//! Kafka broker client.

use crate::broker::{collect_batch, Broker};
use crate::error::{QueueError, Result};
use harvest_core::BrokerConfig;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a poll waits for more once something has arrived.
const RECEIVE_LINGER: Duration = Duration::from_millis(50);

/// One topic, one consumer group, offsets committed automatically.
pub struct KafkaBroker {
    topic: String,
    producer: FutureProducer,
    consumer: StreamConsumer,
}

impl KafkaBroker {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.servers)
            .set("client.id", "producer")
            .create()
            .map_err(|e| QueueError::Broker(format!("create producer: {e}")))?;

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.servers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("max.poll.interval.ms", "600000")
            .create()
            .map_err(|e| QueueError::Broker(format!("create consumer: {e}")))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| QueueError::Broker(format!("subscribe {}: {e}", config.topic)))?;

        info!(servers = %config.servers, topic = %config.topic, "kafka broker connected");
        Ok(Self {
            topic: config.topic.clone(),
            producer,
            consumer,
        })
    }
}

#[async_trait::async_trait]
impl Broker for KafkaBroker {
    async fn publish(&self, key: i32, payload: String) -> Result<()> {
        // big-endian like the Java IntegerSerializer other producers use
        let key = key.to_be_bytes();
        let record = FutureRecord::to(&self.topic).key(&key[..]).payload(&payload);

        let (partition, offset) = self
            .producer
            .send(record, Duration::from_secs(10))
            .await
            .map_err(|(e, _)| QueueError::Broker(format!("message send failed: {e}")))?;
        info!(partition, offset, "message send success");
        Ok(())
    }

    async fn poll(&self, max: usize, wait: Duration) -> Result<Vec<String>> {
        let consumer = &self.consumer;
        collect_batch(max, wait, RECEIVE_LINGER, || async move {
            let message = consumer
                .recv()
                .await
                .map_err(|e| QueueError::Broker(format!("poll: {e}")))?;
            match message.payload_view::<str>() {
                Some(Ok(payload)) => {
                    debug!(
                        partition = message.partition(),
                        offset = message.offset(),
                        "received kafka message"
                    );
                    Ok(Some(payload.to_string()))
                }
                Some(Err(e)) => {
                    warn!(offset = message.offset(), "non UTF-8 message dropped: {}", e);
                    Ok(None)
                }
                None => {
                    warn!(offset = message.offset(), "empty message dropped");
                    Ok(None)
                }
            }
        })
        .await
    }
}
