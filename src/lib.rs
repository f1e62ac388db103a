//! roundup_settlement Library
//!
//! Re-exports modules for integration testing and the binaries.

pub mod api;
pub mod app;
pub mod consumers;
pub mod domain;
pub mod event_log;
pub mod handlers;
pub mod lease;
pub mod query;
pub mod runtime;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext};
pub use domain::{EventEnvelope, EventPayload};
