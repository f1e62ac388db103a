//! Query Service
//!
//! Assembles read models from the store ports. Nothing here writes.

use chrono::{Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::TransferResult;
use crate::store::{AnalysisStore, InvestmentStore, PaymentStore};

/// Investments listed in a summary
pub const RECENT_INVESTMENTS: usize = 10;

pub const DEFAULT_DAYS_BACK: u32 = 30;
pub const MAX_DAYS_BACK: u32 = 365;

#[derive(Debug, Clone, Serialize)]
pub struct InvestmentDetail {
    pub investment_id: Uuid,
    pub product_name: String,
    pub investment_type: String,
    pub amount: Decimal,
    pub invested_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvestmentSummary {
    pub user_id: Uuid,
    pub total_invested: Decimal,
    pub total_rounded_up: Decimal,
    pub total_round_up_transactions: i64,
    pub recent_investments: Vec<InvestmentDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryBreakdown {
    pub category: String,
    pub amount: Decimal,
    pub transaction_count: usize,
    pub average_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalousTransaction {
    pub transaction_id: Uuid,
    pub category: String,
    pub amount: Decimal,
    pub merchant_name: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendingSummary {
    pub user_id: Uuid,
    pub period: String,
    pub total_spending: Decimal,
    pub category_breakdown: Vec<CategoryBreakdown>,
    pub anomalous_transactions: Vec<AnomalousTransaction>,
}

#[derive(Clone)]
pub struct QueryService {
    payments: Arc<dyn PaymentStore>,
    investments: Arc<dyn InvestmentStore>,
    analyses: Arc<dyn AnalysisStore>,
}

impl QueryService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        investments: Arc<dyn InvestmentStore>,
        analyses: Arc<dyn AnalysisStore>,
    ) -> Self {
        Self {
            payments,
            investments,
            analyses,
        }
    }

    pub async fn payment(&self, payment_id: Uuid) -> AppResult<TransferResult> {
        let payment = self
            .payments
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()))?;

        Ok(TransferResult::from_payment(&payment, None))
    }

    /// Totals come from every enabled round-up configuration of the user
    pub async fn investment_summary(&self, user_id: Uuid) -> AppResult<InvestmentSummary> {
        let total_invested = self.investments.total_invested(user_id).await?;

        let configs = self.investments.enabled_round_up_configs(user_id).await?;
        let total_rounded_up = configs.iter().map(|c| c.total_rounded_up).sum();
        let total_round_up_transactions = configs.iter().map(|c| c.total_transactions).sum();

        let recent_investments = self
            .investments
            .investments_by_user(user_id, Some(RECENT_INVESTMENTS))
            .await?
            .into_iter()
            .map(|investment| InvestmentDetail {
                investment_id: investment.id,
                product_name: investment.product_name,
                investment_type: investment.investment_type.as_str().to_string(),
                amount: investment.amount.value(),
                invested_at: investment.invested_at,
            })
            .collect();

        Ok(InvestmentSummary {
            user_id,
            total_invested,
            total_rounded_up,
            total_round_up_transactions,
            recent_investments,
        })
    }

    pub async fn spending_summary(&self, user_id: Uuid, days_back: u32) -> AppResult<SpendingSummary> {
        if days_back == 0 || days_back > MAX_DAYS_BACK {
            return Err(AppError::InvalidRequest(format!(
                "days_back must be between 1 and {}",
                MAX_DAYS_BACK
            )));
        }

        let to = Utc::now();
        let from = to - Duration::days(i64::from(days_back));
        let analyses = self.analyses.analyses_between(user_id, from, to).await?;

        let mut total_spending = Decimal::ZERO;
        // BTreeMap keeps the breakdown ordered by category name
        let mut by_category: BTreeMap<String, (Decimal, usize)> = BTreeMap::new();
        let mut anomalous_transactions = Vec::new();

        for analysis in analyses {
            total_spending += analysis.amount;

            let entry = by_category
                .entry(analysis.category.clone())
                .or_insert((Decimal::ZERO, 0));
            entry.0 += analysis.amount;
            entry.1 += 1;

            if analysis.is_anomalous {
                anomalous_transactions.push(AnomalousTransaction {
                    transaction_id: analysis.transaction_id,
                    category: analysis.category,
                    amount: analysis.amount,
                    merchant_name: analysis.merchant_name,
                    reason: analysis.anomaly_reason,
                });
            }
        }

        let category_breakdown = by_category
            .into_iter()
            .map(|(category, (amount, transaction_count))| CategoryBreakdown {
                average_amount: (amount / Decimal::from(transaction_count))
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
                category,
                amount,
                transaction_count,
            })
            .collect();

        Ok(SpendingSummary {
            user_id,
            period: format!("Last {} days", days_back),
            total_spending,
            category_breakdown,
            anomalous_transactions,
        })
    }
}
