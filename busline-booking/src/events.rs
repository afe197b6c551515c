use async_trait::async_trait;
use busline_shared::BusEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Outbound boundary of the booking core. Delivery is someone else's job.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &BusEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Fire-and-forget dispatch off the request path. Publishing failures are
/// logged and never reach the caller; a confirmed booking stays confirmed.
pub fn spawn_publish(publisher: Arc<dyn EventPublisher>, events: Vec<BusEvent>) {
    tokio::spawn(async move {
        for event in events {
            if let Err(e) = publisher.publish(&event).await {
                tracing::warn!("Failed to publish {} for departure {}: {}", event.topic(), event.departure_id(), e);
            }
        }
    });
}

/// Publisher used when no broker is configured.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &BusEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!("Event {} for departure {}", event.topic(), event.departure_id());
        Ok(())
    }
}

/// Records everything it is given.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<BusEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<BusEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &BusEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Feeds live subscribers (seat-map streams) and forwards to the durable
/// publisher. A lagging or absent subscriber never blocks delivery.
pub struct FanoutPublisher {
    live: broadcast::Sender<BusEvent>,
    downstream: Arc<dyn EventPublisher>,
}

impl FanoutPublisher {
    pub fn new(live: broadcast::Sender<BusEvent>, downstream: Arc<dyn EventPublisher>) -> Self {
        Self { live, downstream }
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, event: &BusEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let _ = self.live.send(event.clone());
        self.downstream.publish(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_shared::SeatMapChangedEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_fanout_reaches_both_sides() {
        let (tx, mut rx) = broadcast::channel(8);
        let recorder = Arc::new(MemoryPublisher::new());
        let fanout = FanoutPublisher::new(tx, recorder.clone());

        let event = BusEvent::SeatMapChanged(SeatMapChangedEvent {
            departure_id: Uuid::new_v4(),
            seat_numbers: vec!["1".to_string()],
            booked: true,
            timestamp: 0,
        });
        fanout.publish(&event).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
        assert_eq!(recorder.events().await, vec![event]);
    }
}
