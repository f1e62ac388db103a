use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    ConsumptionAnalysis, Investment, InvestmentAccount, InvestmentType, Payment, RoundUpConfig,
};

use super::{AnalysisStore, InvestmentStore, PaymentStore, RoundUpOutcome, StoreError};

#[derive(Default)]
struct InvestingState {
    configs: HashMap<Uuid, RoundUpConfig>,
    accounts: HashMap<Uuid, InvestmentAccount>,
    investments: Vec<Investment>,
}

/// Process-local implementation of every store port.
///
/// Investing records share one lock so a round-up lands atomically.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    payments: Arc<RwLock<HashMap<Uuid, Payment>>>,
    investing: Arc<RwLock<InvestingState>>,
    analyses: Arc<RwLock<HashMap<Uuid, ConsumptionAnalysis>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(StoreError::Duplicate(format!("payment {}", payment.id)));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&payment.id) {
            Some(stored) => {
                *stored = payment.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("payment {}", payment.id))),
        }
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.payments.read().await.get(&payment_id).cloned())
    }
}

fn is_round_up_of(investment: &Investment, payment_id: Uuid, account_id: Uuid) -> bool {
    investment.investment_type == InvestmentType::RoundUp
        && investment.related_payment_id == Some(payment_id)
        && investment.account_id == account_id
}

#[async_trait]
impl InvestmentStore for InMemoryStore {
    async fn save_round_up_config(&self, config: &RoundUpConfig) -> Result<(), StoreError> {
        let mut state = self.investing.write().await;
        // One configuration per (user, source account)
        if state.configs.values().any(|c| {
            c.id != config.id
                && c.user_id == config.user_id
                && c.source_account_id == config.source_account_id
        }) {
            return Err(StoreError::Duplicate(format!(
                "round-up config for user {} and account {}",
                config.user_id, config.source_account_id
            )));
        }
        state.configs.insert(config.id, config.clone());
        Ok(())
    }

    async fn find_round_up_config(
        &self,
        user_id: Uuid,
        source_account_id: Uuid,
    ) -> Result<Option<RoundUpConfig>, StoreError> {
        Ok(self
            .investing
            .read()
            .await
            .configs
            .values()
            .find(|c| c.user_id == user_id && c.source_account_id == source_account_id)
            .cloned())
    }

    async fn enabled_round_up_configs(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RoundUpConfig>, StoreError> {
        let state = self.investing.read().await;
        let mut configs: Vec<RoundUpConfig> = state
            .configs
            .values()
            .filter(|c| c.user_id == user_id && c.enabled)
            .cloned()
            .collect();
        configs.sort_by_key(|c| c.created_at);
        Ok(configs)
    }

    async fn save_investment_account(
        &self,
        account: &InvestmentAccount,
    ) -> Result<(), StoreError> {
        self.investing
            .write()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn get_investment_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<InvestmentAccount>, StoreError> {
        Ok(self.investing.read().await.accounts.get(&account_id).cloned())
    }

    async fn find_round_up_investment(
        &self,
        payment_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Investment>, StoreError> {
        Ok(self
            .investing
            .read()
            .await
            .investments
            .iter()
            .find(|i| is_round_up_of(i, payment_id, account_id))
            .cloned())
    }

    async fn apply_round_up(
        &self,
        investment: &Investment,
        config_id: Uuid,
    ) -> Result<RoundUpOutcome, StoreError> {
        let payment_id = investment
            .related_payment_id
            .ok_or_else(|| StoreError::Invalid("round-up without payment id".to_string()))?;

        let mut state = self.investing.write().await;

        if state
            .investments
            .iter()
            .any(|i| is_round_up_of(i, payment_id, investment.account_id))
        {
            return Ok(RoundUpOutcome::AlreadyApplied);
        }

        // Validate everything before the first mutation
        let account = state
            .accounts
            .get(&investment.account_id)
            .ok_or_else(|| StoreError::NotFound(format!("investment account {}", investment.account_id)))?;
        let balance = account
            .balance
            .credit(&investment.amount)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        if !state.configs.contains_key(&config_id) {
            return Err(StoreError::NotFound(format!("round-up config {}", config_id)));
        }

        if let Some(account) = state.accounts.get_mut(&investment.account_id) {
            account.balance = balance;
            account.updated_at = investment.invested_at;
        }
        if let Some(config) = state.configs.get_mut(&config_id) {
            config.record(&investment.amount, investment.invested_at);
        }
        state.investments.push(investment.clone());

        Ok(RoundUpOutcome::Applied)
    }

    async fn investments_by_user(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Investment>, StoreError> {
        let state = self.investing.read().await;
        let mut investments: Vec<Investment> = state
            .investments
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        investments.sort_by(|a, b| b.invested_at.cmp(&a.invested_at));
        if let Some(limit) = limit {
            investments.truncate(limit);
        }
        Ok(investments)
    }

    async fn total_invested(&self, user_id: Uuid) -> Result<Decimal, StoreError> {
        Ok(self
            .investing
            .read()
            .await
            .investments
            .iter()
            .filter(|i| i.user_id == user_id)
            .map(|i| i.amount.value())
            .sum())
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn find_analysis_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<ConsumptionAnalysis>, StoreError> {
        Ok(self.analyses.read().await.get(&transaction_id).cloned())
    }

    async fn insert_analysis(&self, analysis: &ConsumptionAnalysis) -> Result<bool, StoreError> {
        let mut analyses = self.analyses.write().await;
        if analyses.contains_key(&analysis.transaction_id) {
            return Ok(false);
        }
        analyses.insert(analysis.transaction_id, analysis.clone());
        Ok(true)
    }

    async fn analyses_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConsumptionAnalysis>, StoreError> {
        let analyses = self.analyses.read().await;
        let mut found: Vec<ConsumptionAnalysis> = analyses
            .values()
            .filter(|a| a.user_id == user_id && a.transaction_date >= from && a.transaction_date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.transaction_date);
        Ok(found)
    }
}
