//! Command handlers module
//!
//! Handlers that orchestrate settlement: lease, ledger write, settlement rail
//! and event publication.

mod commands;
mod settlement;
mod transfer_handler;


pub use commands::*;
pub use settlement::{InstantSettlement, SettlementError, SettlementRail};
pub use transfer_handler::{lease_key, TransferHandler, TRANSFER_CATEGORY};
