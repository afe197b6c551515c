use async_trait::async_trait;
use busline_booking::{BookingError, BookingResult, ReminderJob, ReminderStore};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Durable reminder queue. The primary key on (departure, rider) makes
/// scheduling idempotent across redelivered events and restarts.
pub struct PgReminderStore {
    pool: PgPool,
}

impl PgReminderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReminderRow {
    departure_id: Uuid,
    rider_id: Uuid,
    due_at: DateTime<Utc>,
    departs_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
}

impl From<ReminderRow> for ReminderJob {
    fn from(row: ReminderRow) -> Self {
        ReminderJob {
            departure_id: row.departure_id,
            rider_id: row.rider_id,
            due_at: row.due_at,
            departs_at: row.departs_at,
            dispatched_at: row.dispatched_at,
        }
    }
}

#[async_trait]
impl ReminderStore for PgReminderStore {
    async fn schedule_reminder(&self, job: &ReminderJob) -> BookingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO reminder_jobs (departure_id, rider_id, due_at, departs_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (departure_id, rider_id) DO NOTHING
            "#,
        )
        .bind(job.departure_id)
        .bind(job.rider_id)
        .bind(job.due_at)
        .bind(job.departs_at)
        .execute(&self.pool)
        .await
        .map_err(BookingError::storage)?;

        Ok(result.rows_affected() == 1)
    }

    async fn due_reminders(&self, now: DateTime<Utc>, limit: usize) -> BookingResult<Vec<ReminderJob>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            r#"
            SELECT departure_id, rider_id, due_at, departs_at, dispatched_at
            FROM reminder_jobs
            WHERE dispatched_at IS NULL AND due_at <= $1
            ORDER BY due_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(BookingError::storage)?;

        Ok(rows.into_iter().map(ReminderJob::from).collect())
    }

    async fn mark_dispatched(&self, departure_id: Uuid, rider_id: Uuid, now: DateTime<Utc>) -> BookingResult<()> {
        sqlx::query(
            "UPDATE reminder_jobs SET dispatched_at = $3 \
             WHERE departure_id = $1 AND rider_id = $2 AND dispatched_at IS NULL",
        )
        .bind(departure_id)
        .bind(rider_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(BookingError::storage)?;
        Ok(())
    }
}
