use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    Amount, Balance, ConsumptionAnalysis, Investment, InvestmentAccount, Payment, RoundUpConfig,
};

use super::{AnalysisStore, InvestmentStore, PaymentStore, RoundUpOutcome, StoreError};

type PaymentRow = (
    Uuid,
    Uuid,
    Uuid,
    Uuid,
    String,
    Decimal,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
);

type ConfigRow = (
    Uuid,
    Uuid,
    Uuid,
    Uuid,
    Decimal,
    bool,
    Decimal,
    i64,
    DateTime<Utc>,
    DateTime<Utc>,
);

type AccountRow = (
    Uuid,
    Uuid,
    String,
    Decimal,
    String,
    String,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

type InvestmentRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    String,
    String,
    Decimal,
    String,
    Option<Uuid>,
    DateTime<Utc>,
);

type AnalysisRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    Decimal,
    String,
    DateTime<Utc>,
    bool,
    Option<String>,
    serde_json::Value,
    DateTime<Utc>,
);

const PAYMENT_COLUMNS: &str = "id, user_id, from_account_id, to_account_id, recipient_name, \
     amount, currency, payment_type, status, description, created_at, completed_at, failure_reason";
const CONFIG_COLUMNS: &str = "id, user_id, source_account_id, target_investment_account_id, \
     round_up_unit, enabled, total_rounded_up, total_transactions, created_at, updated_at";
const ACCOUNT_COLUMNS: &str = "id, user_id, account_name, balance, currency, account_type, \
     is_active, created_at, updated_at";
const INVESTMENT_COLUMNS: &str = "id, user_id, account_id, product_id, product_name, \
     investment_type, amount, currency, related_payment_id, invested_at";
const ANALYSIS_COLUMNS: &str = "id, user_id, transaction_id, category, amount, merchant_name, \
     transaction_date, is_anomalous, anomaly_reason, metadata, analyzed_at";

fn invalid(e: impl std::fmt::Display) -> StoreError {
    StoreError::Invalid(e.to_string())
}

fn payment_from_row(row: PaymentRow) -> Result<Payment, StoreError> {
    let (
        id,
        user_id,
        from_account_id,
        to_account_id,
        recipient_name,
        amount,
        currency,
        payment_type,
        status,
        description,
        created_at,
        completed_at,
        failure_reason,
    ) = row;

    Ok(Payment {
        id,
        user_id,
        from_account_id,
        to_account_id,
        recipient_name,
        amount: Amount::new(amount).map_err(invalid)?,
        currency,
        payment_type: payment_type.parse().map_err(invalid)?,
        status: status.parse().map_err(invalid)?,
        description,
        created_at,
        completed_at,
        failure_reason,
    })
}

fn config_from_row(row: ConfigRow) -> Result<RoundUpConfig, StoreError> {
    let (
        id,
        user_id,
        source_account_id,
        target_investment_account_id,
        round_up_unit,
        enabled,
        total_rounded_up,
        total_transactions,
        created_at,
        updated_at,
    ) = row;

    Ok(RoundUpConfig {
        id,
        user_id,
        source_account_id,
        target_investment_account_id,
        round_up_unit: Amount::new(round_up_unit).map_err(invalid)?,
        enabled,
        total_rounded_up,
        total_transactions,
        created_at,
        updated_at,
    })
}

fn account_from_row(row: AccountRow) -> Result<InvestmentAccount, StoreError> {
    let (id, user_id, account_name, balance, currency, account_type, is_active, created_at, updated_at) =
        row;

    Ok(InvestmentAccount {
        id,
        user_id,
        account_name,
        balance: Balance::new(balance).map_err(invalid)?,
        currency,
        account_type: account_type.parse().map_err(invalid)?,
        is_active,
        created_at,
        updated_at,
    })
}

fn investment_from_row(row: InvestmentRow) -> Result<Investment, StoreError> {
    let (
        id,
        user_id,
        account_id,
        product_id,
        product_name,
        investment_type,
        amount,
        currency,
        related_payment_id,
        invested_at,
    ) = row;

    Ok(Investment {
        id,
        user_id,
        account_id,
        product_id,
        product_name,
        investment_type: investment_type.parse().map_err(invalid)?,
        amount: Amount::new(amount).map_err(invalid)?,
        currency,
        related_payment_id,
        invested_at,
    })
}

fn analysis_from_row(row: AnalysisRow) -> ConsumptionAnalysis {
    let (
        id,
        user_id,
        transaction_id,
        category,
        amount,
        merchant_name,
        transaction_date,
        is_anomalous,
        anomaly_reason,
        metadata,
        analyzed_at,
    ) = row;

    ConsumptionAnalysis {
        id,
        user_id,
        transaction_id,
        category,
        amount,
        merchant_name,
        transaction_date,
        is_anomalous,
        anomaly_reason,
        metadata,
        analyzed_at,
    }
}

/// PostgreSQL implementation of every store port
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_round_up_investment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        investment: &Investment,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO investments (
                id, user_id, account_id, product_id, product_name,
                investment_type, amount, currency, related_payment_id, invested_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (related_payment_id, account_id) WHERE investment_type = 'round_up'
            DO NOTHING
            "#,
        )
        .bind(investment.id)
        .bind(investment.user_id)
        .bind(investment.account_id)
        .bind(&investment.product_id)
        .bind(&investment.product_name)
        .bind(investment.investment_type.as_str())
        .bind(investment.amount.value())
        .bind(&investment.currency)
        .bind(investment.related_payment_id)
        .bind(investment.invested_at)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, from_account_id, to_account_id, recipient_name,
                amount, currency, payment_type, status, description,
                created_at, completed_at, failure_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.from_account_id)
        .bind(payment.to_account_id)
        .bind(&payment.recipient_name)
        .bind(payment.amount.value())
        .bind(&payment.currency)
        .bind(payment.payment_type.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.description)
        .bind(payment.created_at)
        .bind(payment.completed_at)
        .bind(&payment.failure_reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(format!("payment {}", payment.id)));
        }
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, completed_at = $3, failure_reason = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(payment.status.as_str())
        .bind(payment.completed_at)
        .bind(&payment.failure_reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("payment {}", payment.id)));
        }
        Ok(())
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(payment_from_row).transpose()
    }
}

#[async_trait]
impl InvestmentStore for PgStore {
    async fn save_round_up_config(&self, config: &RoundUpConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO round_up_configs (
                id, user_id, source_account_id, target_investment_account_id,
                round_up_unit, enabled, total_rounded_up, total_transactions,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                target_investment_account_id = EXCLUDED.target_investment_account_id,
                round_up_unit = EXCLUDED.round_up_unit,
                enabled = EXCLUDED.enabled,
                total_rounded_up = EXCLUDED.total_rounded_up,
                total_transactions = EXCLUDED.total_transactions,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(config.id)
        .bind(config.user_id)
        .bind(config.source_account_id)
        .bind(config.target_investment_account_id)
        .bind(config.round_up_unit.value())
        .bind(config.enabled)
        .bind(config.total_rounded_up)
        .bind(config.total_transactions)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Duplicate(
                format!(
                    "round-up config for user {} and account {}",
                    config.user_id, config.source_account_id
                ),
            ),
            other => StoreError::Database(other),
        })?;

        Ok(())
    }

    async fn find_round_up_config(
        &self,
        user_id: Uuid,
        source_account_id: Uuid,
    ) -> Result<Option<RoundUpConfig>, StoreError> {
        let row: Option<ConfigRow> = sqlx::query_as(&format!(
            "SELECT {} FROM round_up_configs WHERE user_id = $1 AND source_account_id = $2",
            CONFIG_COLUMNS
        ))
        .bind(user_id)
        .bind(source_account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(config_from_row).transpose()
    }

    async fn enabled_round_up_configs(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RoundUpConfig>, StoreError> {
        let rows: Vec<ConfigRow> = sqlx::query_as(&format!(
            "SELECT {} FROM round_up_configs WHERE user_id = $1 AND enabled ORDER BY created_at",
            CONFIG_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(config_from_row).collect()
    }

    async fn save_investment_account(
        &self,
        account: &InvestmentAccount,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO investment_accounts (
                id, user_id, account_name, balance, currency, account_type,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                account_name = EXCLUDED.account_name,
                balance = EXCLUDED.balance,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(account.id)
        .bind(account.user_id)
        .bind(&account.account_name)
        .bind(account.balance.value())
        .bind(&account.currency)
        .bind(account.account_type.as_str())
        .bind(account.is_active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_investment_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<InvestmentAccount>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM investment_accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn find_round_up_investment(
        &self,
        payment_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Investment>, StoreError> {
        let row: Option<InvestmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM investments \
             WHERE related_payment_id = $1 AND account_id = $2 AND investment_type = 'round_up'",
            INVESTMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(investment_from_row).transpose()
    }

    async fn apply_round_up(
        &self,
        investment: &Investment,
        config_id: Uuid,
    ) -> Result<RoundUpOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The partial unique index is the dedup check inside the transaction
        if !self.insert_round_up_investment(&mut tx, investment).await? {
            tx.rollback().await?;
            return Ok(RoundUpOutcome::AlreadyApplied);
        }

        let credited = sqlx::query(
            r#"
            UPDATE investment_accounts
            SET balance = balance + $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(investment.account_id)
        .bind(investment.amount.value())
        .bind(investment.invested_at)
        .execute(&mut *tx)
        .await?;
        if credited.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "investment account {}",
                investment.account_id
            )));
        }

        let counted = sqlx::query(
            r#"
            UPDATE round_up_configs
            SET total_rounded_up = total_rounded_up + $2,
                total_transactions = total_transactions + 1,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(config_id)
        .bind(investment.amount.value())
        .bind(investment.invested_at)
        .execute(&mut *tx)
        .await?;
        if counted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("round-up config {}", config_id)));
        }

        tx.commit().await?;

        Ok(RoundUpOutcome::Applied)
    }

    async fn investments_by_user(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Investment>, StoreError> {
        let rows: Vec<InvestmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM investments WHERE user_id = $1 ORDER BY invested_at DESC LIMIT $2",
            INVESTMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(investment_from_row).collect()
    }

    async fn total_invested(&self, user_id: Uuid) -> Result<Decimal, StoreError> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM investments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

#[async_trait]
impl AnalysisStore for PgStore {
    async fn find_analysis_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<ConsumptionAnalysis>, StoreError> {
        let row: Option<AnalysisRow> = sqlx::query_as(&format!(
            "SELECT {} FROM consumption_analyses WHERE transaction_id = $1",
            ANALYSIS_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(analysis_from_row))
    }

    async fn insert_analysis(&self, analysis: &ConsumptionAnalysis) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO consumption_analyses (
                id, user_id, transaction_id, category, amount, merchant_name,
                transaction_date, is_anomalous, anomaly_reason, metadata, analyzed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(analysis.id)
        .bind(analysis.user_id)
        .bind(analysis.transaction_id)
        .bind(&analysis.category)
        .bind(analysis.amount)
        .bind(&analysis.merchant_name)
        .bind(analysis.transaction_date)
        .bind(analysis.is_anomalous)
        .bind(&analysis.anomaly_reason)
        .bind(&analysis.metadata)
        .bind(analysis.analyzed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn analyses_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConsumptionAnalysis>, StoreError> {
        let rows: Vec<AnalysisRow> = sqlx::query_as(&format!(
            "SELECT {} FROM consumption_analyses \
             WHERE user_id = $1 AND transaction_date BETWEEN $2 AND $3 \
             ORDER BY transaction_date",
            ANALYSIS_COLUMNS
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(analysis_from_row).collect())
    }
}
