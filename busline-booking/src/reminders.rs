use async_trait::async_trait;
use busline_core::DepartureStatus;
use busline_shared::{BookingConfirmedEvent, BusEvent, DepartureReminderDueEvent};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::EventPublisher;
use crate::store::BookingStore;
use crate::BookingResult;

/// A pending "your bus leaves soon" notice. At most one per
/// (departure, rider), no matter how many seats the rider booked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderJob {
    pub departure_id: Uuid,
    pub rider_id: Uuid,
    pub due_at: DateTime<Utc>,
    pub departs_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

/// Build the job for a confirmed booking. A departure closer than the lead
/// time gets a job that is due immediately.
pub fn reminder_for(event: &BookingConfirmedEvent, lead: Duration) -> ReminderJob {
    ReminderJob {
        departure_id: event.departure_id,
        rider_id: event.rider_id,
        due_at: event.departs_at - lead,
        departs_at: event.departs_at,
        dispatched_at: None,
    }
}

/// Durable reminder queue. Survives restarts when backed by a database.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Insert unless a job for the same (departure, rider) already exists.
    /// Returns whether a new job was stored.
    async fn schedule_reminder(&self, job: &ReminderJob) -> BookingResult<bool>;

    /// Undispatched jobs with `due_at <= now`, oldest first.
    async fn due_reminders(&self, now: DateTime<Utc>, limit: usize) -> BookingResult<Vec<ReminderJob>>;

    async fn mark_dispatched(&self, departure_id: Uuid, rider_id: Uuid, now: DateTime<Utc>) -> BookingResult<()>;
}

#[derive(Default)]
pub struct MemoryReminderStore {
    jobs: Mutex<BTreeMap<(Uuid, Uuid), ReminderJob>>,
}

impl MemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn jobs(&self) -> Vec<ReminderJob> {
        self.jobs.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl ReminderStore for MemoryReminderStore {
    async fn schedule_reminder(&self, job: &ReminderJob) -> BookingResult<bool> {
        let mut jobs = self.jobs.lock().await;
        let key = (job.departure_id, job.rider_id);
        if jobs.contains_key(&key) {
            return Ok(false);
        }
        jobs.insert(key, job.clone());
        Ok(true)
    }

    async fn due_reminders(&self, now: DateTime<Utc>, limit: usize) -> BookingResult<Vec<ReminderJob>> {
        let mut due: Vec<ReminderJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| j.dispatched_at.is_none() && j.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|j| j.due_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_dispatched(&self, departure_id: Uuid, rider_id: Uuid, now: DateTime<Utc>) -> BookingResult<()> {
        if let Some(job) = self.jobs.lock().await.get_mut(&(departure_id, rider_id)) {
            job.dispatched_at.get_or_insert(now);
        }
        Ok(())
    }
}

/// Departure instant to announce, or `None` once the reminder is moot:
/// the departure is gone or no longer scheduled, or the rider holds no
/// active ticket on it anymore.
async fn still_travelling(bookings: &dyn BookingStore, job: &ReminderJob) -> BookingResult<Option<DateTime<Utc>>> {
    let Some(departure) = bookings.get_departure(job.departure_id).await? else {
        return Ok(None);
    };
    if departure.status != DepartureStatus::Scheduled {
        return Ok(None);
    }

    let holds_seat = bookings
        .tickets_for_rider(job.rider_id)
        .await?
        .iter()
        .any(|t| t.departure_id == job.departure_id && t.status.is_active());
    Ok(holds_seat.then(|| departure.departs_at()))
}

/// One polling pass: publish every due reminder and mark it dispatched.
/// Moot reminders are marked without publishing. A job whose publish
/// fails stays pending and is retried next pass.
pub async fn dispatch_due(
    reminders: &dyn ReminderStore,
    bookings: &dyn BookingStore,
    publisher: &Arc<dyn EventPublisher>,
    now: DateTime<Utc>,
    limit: usize,
) -> BookingResult<usize> {
    let due = reminders.due_reminders(now, limit).await?;
    let mut dispatched = 0;

    for job in due {
        let Some(departs_at) = still_travelling(bookings, &job).await? else {
            tracing::info!(
                "Dropping reminder for rider {} on departure {}: no longer travelling",
                job.rider_id,
                job.departure_id
            );
            reminders.mark_dispatched(job.departure_id, job.rider_id, now).await?;
            continue;
        };

        let event = BusEvent::DepartureReminderDue(DepartureReminderDueEvent {
            rider_id: job.rider_id,
            departure_id: job.departure_id,
            departs_at,
            timestamp: now.timestamp(),
        });

        match publisher.publish(&event).await {
            Ok(()) => {
                reminders.mark_dispatched(job.departure_id, job.rider_id, now).await?;
                dispatched += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "Reminder for rider {} on departure {} not sent: {}",
                    job.rider_id,
                    job.departure_id,
                    e
                );
            }
        }
    }

    if dispatched > 0 {
        tracing::info!("Dispatched {} departure reminder(s)", dispatched);
    }
    Ok(dispatched)
}
