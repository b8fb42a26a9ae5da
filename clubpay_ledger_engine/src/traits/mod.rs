//! The seams between the engine's public APIs and a backing store.
//!
//! Specific backends (currently SQLite) implement these traits; the API layer is generic over
//! them so that the order, refund and settlement flows never touch SQL directly.

mod account_management;
mod data_objects;
mod errors;
mod ledger_database;
mod order_management;
mod settlement_management;

pub use account_management::AccountManagement;
pub use data_objects::{PaidOutcome, RefundBegin};
pub use errors::{OrderFlowError, RefundError, SettlementApiError, WalletApiError};
pub use ledger_database::LedgerDatabase;
pub use order_management::OrderManagement;
pub use settlement_management::SettlementManagement;
