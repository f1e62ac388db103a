//! Query module
//!
//! Read models served by the HTTP surface: payment lookup, investment
//! summary and spending summary.

mod service;

pub use service::{
    AnomalousTransaction, CategoryBreakdown, InvestmentDetail, InvestmentSummary, QueryService,
    SpendingSummary, DEFAULT_DAYS_BACK, MAX_DAYS_BACK, RECENT_INVESTMENTS,
};
