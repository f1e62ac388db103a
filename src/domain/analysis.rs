//! Consumption analysis record written once per transaction event.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionAnalysis {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    pub category: String,
    pub amount: Decimal,
    pub merchant_name: String,
    pub transaction_date: DateTime<Utc>,
    pub is_anomalous: bool,
    pub anomaly_reason: Option<String>,
    pub metadata: serde_json::Value,
    pub analyzed_at: DateTime<Utc>,
}
