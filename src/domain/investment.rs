//! Round-up investing model
//!
//! Configuration, investment records and investment accounts touched by the
//! round-up consumer, plus the round-up arithmetic itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, Balance};

/// Product every round-up investment is booked against.
pub const ROUND_UP_PRODUCT_ID: &str = "ROUNDUP-PRODUCT-001";
pub const ROUND_UP_PRODUCT_NAME: &str = "Round-up Investment";

/// Amount needed to lift `amount` to the next multiple of `unit`.
///
/// Returns zero when `amount` is already a multiple of `unit`. Exact decimal
/// arithmetic: `(unit - amount % unit) % unit`.
pub fn round_up(amount: Decimal, unit: &Amount) -> Decimal {
    let unit = unit.value();
    let remainder = amount % unit;
    if remainder.is_zero() {
        return Decimal::ZERO;
    }
    unit - remainder
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundUpConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_account_id: Uuid,
    pub target_investment_account_id: Uuid,
    pub round_up_unit: Amount,
    pub enabled: bool,
    pub total_rounded_up: Decimal,
    pub total_transactions: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoundUpConfig {
    /// A fresh, enabled configuration with zeroed counters.
    pub fn new(
        user_id: Uuid,
        source_account_id: Uuid,
        target_investment_account_id: Uuid,
        round_up_unit: Amount,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            source_account_id,
            target_investment_account_id,
            round_up_unit,
            enabled: true,
            total_rounded_up: Decimal::ZERO,
            total_transactions: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Count one more rounded-up payment.
    pub fn record(&mut self, amount: &Amount, at: DateTime<Utc>) {
        self.total_rounded_up += amount.value();
        self.total_transactions += 1;
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentType {
    RoundUp,
    Manual,
    Auto,
}

impl InvestmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentType::RoundUp => "round_up",
            InvestmentType::Manual => "manual",
            InvestmentType::Auto => "auto",
        }
    }
}

impl fmt::Display for InvestmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_up" => Ok(InvestmentType::RoundUp),
            "manual" => Ok(InvestmentType::Manual),
            "auto" => Ok(InvestmentType::Auto),
            other => Err(format!("unknown investment type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub product_id: String,
    pub product_name: String,
    pub investment_type: InvestmentType,
    pub amount: Amount,
    pub currency: String,
    pub related_payment_id: Option<Uuid>,
    pub invested_at: DateTime<Utc>,
}

impl Investment {
    /// A round-up investment originating from `payment_id`.
    pub fn round_up(
        user_id: Uuid,
        account_id: Uuid,
        amount: Amount,
        currency: String,
        payment_id: Uuid,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            account_id,
            product_id: ROUND_UP_PRODUCT_ID.to_string(),
            product_name: ROUND_UP_PRODUCT_NAME.to_string(),
            investment_type: InvestmentType::RoundUp,
            amount,
            currency,
            related_payment_id: Some(payment_id),
            invested_at: at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentAccountType {
    Stocks,
    Etf,
    RoundUp,
    Fund,
}

impl InvestmentAccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentAccountType::Stocks => "stocks",
            InvestmentAccountType::Etf => "etf",
            InvestmentAccountType::RoundUp => "round_up",
            InvestmentAccountType::Fund => "fund",
        }
    }
}

impl FromStr for InvestmentAccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stocks" => Ok(InvestmentAccountType::Stocks),
            "etf" => Ok(InvestmentAccountType::Etf),
            "round_up" => Ok(InvestmentAccountType::RoundUp),
            "fund" => Ok(InvestmentAccountType::Fund),
            other => Err(format!("unknown investment account type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_name: String,
    pub balance: Balance,
    pub currency: String,
    pub account_type: InvestmentAccountType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvestmentAccount {
    pub fn new(user_id: Uuid, account_name: String, currency: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            account_name,
            balance: Balance::zero(),
            currency,
            account_type: InvestmentAccountType::RoundUp,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
