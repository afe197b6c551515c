use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Provider-side outcome of a payment. Tracked apart from ticket status:
/// a failed payment never touches an issued ticket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(CoreError::ValidationError(format!("unknown payment status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub payment_id: String, // Provider's ID (e.g., pi_123)
    pub rider_id: Uuid,
    pub departure_id: Uuid,
    pub operator_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Insert a new record. A payment id that already exists is left as is.
    async fn record_payment(
        &self,
        record: &PaymentRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Returns the updated record, or `None` for an unknown payment id.
    async fn update_payment_status(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<Option<PaymentRecord>, Box<dyn std::error::Error + Send + Sync>>;

    /// Every payment collected for an operator, oldest first.
    async fn payments_for_operator(
        &self,
        operator_id: Uuid,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<PaymentRecord>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Ledger kept in process memory, for the memory backend and tests.
#[derive(Default)]
pub struct MemoryPaymentLedger {
    records: tokio::sync::RwLock<std::collections::HashMap<String, PaymentRecord>>,
}

impl MemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedger for MemoryPaymentLedger {
    async fn record_payment(
        &self,
        record: &PaymentRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.records
            .write()
            .await
            .entry(record.payment_id.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn update_payment_status(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<Option<PaymentRecord>, Box<dyn std::error::Error + Send + Sync>> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(payment_id).map(|record| {
            record.status = status;
            record.updated_at = Utc::now();
            record.clone()
        }))
    }

    async fn payments_for_operator(
        &self,
        operator_id: Uuid,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<PaymentRecord>, Box<dyn std::error::Error + Send + Sync>> {
        let mut payments: Vec<PaymentRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.operator_id == operator_id && status.map_or(true, |s| s == r.status))
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.payment_id.cmp(&b.payment_id)));
        Ok(payments)
    }
}
