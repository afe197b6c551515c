use async_trait::async_trait;
use busline_core::payment::{PaymentLedger, PaymentRecord, PaymentStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::error::Error;
use uuid::Uuid;

pub struct PgPaymentLedger {
    pool: PgPool,
}

impl PgPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    payment_id: String,
    rider_id: Uuid,
    departure_id: Uuid,
    operator_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PAYMENT_COLUMNS: &str =
    "payment_id, rider_id, departure_id, operator_id, amount, currency, status, created_at, updated_at";

impl PaymentRow {
    fn into_record(self) -> Result<PaymentRecord, Box<dyn Error + Send + Sync>> {
        Ok(PaymentRecord {
            payment_id: self.payment_id,
            rider_id: self.rider_id,
            departure_id: self.departure_id,
            operator_id: self.operator_id,
            amount: self.amount,
            currency: self.currency,
            status: self.status.parse::<PaymentStatus>()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl PaymentLedger for PgPaymentLedger {
    async fn record_payment(&self, record: &PaymentRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, rider_id, departure_id, operator_id, amount, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(&record.payment_id)
        .bind(record.rider_id)
        .bind(record.departure_id)
        .bind(record.operator_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_payment_status(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<Option<PaymentRecord>, Box<dyn Error + Send + Sync>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments SET status = $2, updated_at = NOW() WHERE payment_id = $1 RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRow::into_record).transpose()
    }

    async fn payments_for_operator(
        &self,
        operator_id: Uuid,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<PaymentRecord>, Box<dyn Error + Send + Sync>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE operator_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at, payment_id",
            PAYMENT_COLUMNS
        ))
        .bind(operator_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaymentRow::into_record).collect()
    }
}
