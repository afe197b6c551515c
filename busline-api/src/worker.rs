use busline_booking::reminders::{dispatch_due, reminder_for};
use busline_booking::{BookingStore, EventPublisher, ReminderStore};
use busline_shared::models::events::topics;
use busline_shared::BusEvent;
use busline_store::events::{decode_event, subscribe};
use chrono::Utc;
use rdkafka::message::Message;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

const DISPATCH_BATCH: usize = 100;

/// Turns `booking.confirmed` events into durable reminder jobs.
pub async fn start_reminder_scheduler(
    brokers: String,
    group_id: String,
    reminders: Arc<dyn ReminderStore>,
    lead: chrono::Duration,
) -> anyhow::Result<()> {
    let consumer = subscribe(&brokers, &group_id, &[topics::BOOKING_CONFIRMED])?;
    info!("Reminder scheduler started, listening to {}...", topics::BOOKING_CONFIRMED);

    loop {
        // The borrowed message must not live across the store call.
        let payload = match consumer.recv().await {
            Err(e) => {
                error!("Kafka error: {}", e);
                continue;
            }
            Ok(m) => match m.payload_view::<str>() {
                Some(Ok(payload)) => payload.to_owned(),
                _ => {
                    warn!("Skipping unreadable message at offset {}", m.offset());
                    continue;
                }
            },
        };
        schedule_from_payload(reminders.as_ref(), &payload, lead).await;
    }
}

async fn schedule_from_payload(reminders: &dyn ReminderStore, payload: &str, lead: chrono::Duration) {
    match decode_event(payload) {
        Ok(BusEvent::BookingConfirmed(event)) => {
            let job = reminder_for(&event, lead);
            match reminders.schedule_reminder(&job).await {
                Ok(true) => info!(
                    "Reminder for rider {} on departure {} due at {}",
                    job.rider_id, job.departure_id, job.due_at
                ),
                Ok(false) => {}
                Err(e) => error!("Failed to schedule reminder: {}", e),
            }
        }
        Ok(other) => warn!("Unexpected event on {}: {}", topics::BOOKING_CONFIRMED, other.topic()),
        Err(e) => error!("Error decoding payload: {}", e),
    }
}

/// Polls the job store and publishes due reminders to riders still
/// holding a seat.
pub async fn start_reminder_dispatcher(
    reminders: Arc<dyn ReminderStore>,
    bookings: Arc<dyn BookingStore>,
    publisher: Arc<dyn EventPublisher>,
    poll_every: Duration,
) {
    info!("Reminder dispatcher polling every {:?}", poll_every);
    let mut ticker = interval(poll_every);

    loop {
        ticker.tick().await;
        let pass = dispatch_due(reminders.as_ref(), bookings.as_ref(), &publisher, Utc::now(), DISPATCH_BATCH);
        if let Err(e) = pass.await {
            error!("Reminder dispatch failed: {}", e);
        }
    }
}

/// Without a broker, confirmed bookings are picked off the in-process
/// event channel instead.
pub async fn start_local_reminder_scheduler(
    mut rx: tokio::sync::broadcast::Receiver<BusEvent>,
    reminders: Arc<dyn ReminderStore>,
    lead: chrono::Duration,
) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match rx.recv().await {
            Ok(BusEvent::BookingConfirmed(event)) => {
                if let Err(e) = reminders.schedule_reminder(&reminder_for(&event, lead)).await {
                    error!("Failed to schedule reminder: {}", e);
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Reminder scheduler lagged, {} event(s) skipped", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_booking::MemoryReminderStore;
    use busline_shared::BookingConfirmedEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_redelivered_confirmation_schedules_once() {
        let store = MemoryReminderStore::new();
        let event = BusEvent::BookingConfirmed(BookingConfirmedEvent {
            rider_id: Uuid::new_v4(),
            departure_id: Uuid::new_v4(),
            seat_numbers: vec!["4".to_string()],
            ticket_ids: vec![Uuid::new_v4()],
            departs_at: Utc::now() + chrono::Duration::hours(3),
            timestamp: 0,
        });
        let payload = serde_json::to_string(&event).unwrap();

        schedule_from_payload(&store, &payload, chrono::Duration::hours(1)).await;
        schedule_from_payload(&store, &payload, chrono::Duration::hours(1)).await;
        schedule_from_payload(&store, "not json", chrono::Duration::hours(1)).await;

        assert_eq!(store.jobs().await.len(), 1);
    }
}
