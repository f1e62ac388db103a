//! Persistence ports
//!
//! Settlement ledger, round-up investing records and consumption analyses.
//! Every port has an in-memory implementation and a PostgreSQL one.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    ConsumptionAnalysis, Investment, InvestmentAccount, Payment, RoundUpConfig,
};

/// Errors that can occur in the stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record the operation depends on does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Insert of a record whose id already exists
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Stored data or an update would break a model invariant
    #[error("Invalid data: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Retrying the same operation cannot succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::Duplicate(_) | StoreError::Invalid(_)
        )
    }
}

/// Result of applying a round-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundUpOutcome {
    Applied,
    /// An investment for the same payment and account already exists
    AlreadyApplied,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Persist status, completion time and failure reason
    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError>;
}

#[async_trait]
pub trait InvestmentStore: Send + Sync {
    /// Insert or replace the configuration
    async fn save_round_up_config(&self, config: &RoundUpConfig) -> Result<(), StoreError>;

    async fn find_round_up_config(
        &self,
        user_id: Uuid,
        source_account_id: Uuid,
    ) -> Result<Option<RoundUpConfig>, StoreError>;

    async fn enabled_round_up_configs(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RoundUpConfig>, StoreError>;

    /// Insert or replace the account
    async fn save_investment_account(&self, account: &InvestmentAccount)
        -> Result<(), StoreError>;

    async fn get_investment_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<InvestmentAccount>, StoreError>;

    async fn find_round_up_investment(
        &self,
        payment_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Investment>, StoreError>;

    /// Record `investment`, credit its account and bump the counters of
    /// `config_id`, all or nothing. Re-checks for an existing investment of the
    /// same payment and account inside the same unit of work.
    async fn apply_round_up(
        &self,
        investment: &Investment,
        config_id: Uuid,
    ) -> Result<RoundUpOutcome, StoreError>;

    /// Newest first, at most `limit` when given
    async fn investments_by_user(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Investment>, StoreError>;

    async fn total_invested(&self, user_id: Uuid) -> Result<Decimal, StoreError>;
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn find_analysis_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<ConsumptionAnalysis>, StoreError>;

    /// Returns false when the transaction already has an analysis
    async fn insert_analysis(&self, analysis: &ConsumptionAnalysis) -> Result<bool, StoreError>;

    /// Analyses whose transaction date falls in `[from, to]`, oldest first
    async fn analyses_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConsumptionAnalysis>, StoreError>;
}
