use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};
use velora_core::adapters::Notifier;
use velora_core::EngineError;

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok(delivery) => {
                let partition = delivery.partition;
                let offset = delivery.offset;
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, partition, offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// The engine's best-effort notification channel rides on the event bus.
#[async_trait]
impl Notifier for EventProducer {
    async fn notify(&self, topic: &str, key: &str, payload: &str) -> Result<(), EngineError> {
        self.publish(topic, key, payload)
            .await
            .map_err(|e| EngineError::Persistence(format!("kafka: {e}")))
    }
}
