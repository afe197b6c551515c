use async_trait::async_trait;
use busline_booking::EventPublisher;
use busline_shared::BusEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

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

    pub async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
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

#[async_trait]
impl EventPublisher for EventProducer {
    /// Keyed by departure id so every event of one departure stays ordered.
    async fn publish(&self, event: &BusEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(event)?;
        self.send(event.topic(), &event.departure_id().to_string(), &payload).await?;
        Ok(())
    }
}

/// Consumer subscribed to the given topics, committing offsets automatically.
pub fn subscribe(brokers: &str, group_id: &str, topics: &[&str]) -> Result<StreamConsumer, rdkafka::error::KafkaError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()?;

    consumer.subscribe(topics)?;
    Ok(consumer)
}

/// Decode a payload produced by `EventProducer`.
pub fn decode_event(payload: &str) -> Result<BusEvent, serde_json::Error> {
    serde_json::from_str(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_shared::TicketScannedEvent;
    use uuid::Uuid;

    #[test]
    fn test_payload_carries_type_tag() {
        let event = BusEvent::TicketScanned(TicketScannedEvent {
            rider_id: Uuid::new_v4(),
            departure_id: Uuid::new_v4(),
            ticket_ids: vec![],
            timestamp: 1,
        });
        let payload = serde_json::to_string(&event).unwrap();
        assert!(payload.contains("\"type\":\"ticket_scanned\""));
        assert_eq!(decode_event(&payload).unwrap(), event);
    }
}
