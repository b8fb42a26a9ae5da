//! ClubPay Ledger & Order Settlement Engine
//!
//! The engine owns the money-moving core of the ClubPay platform: member wallets and their
//! append-only ledger, the order payment/refund state machine, and the settlement-withdrawal
//! approval flow. It guarantees exactly-once economic effect for every mutation under concurrent
//! access, asynchronous gateway callbacks and fallible network calls, and leaves a durable,
//! reconstructible audit trail.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@traits`] and the SQLite backend). You should never
//!    need to access the database directly; use the public APIs instead. The data types stored
//!    in the database are public and live in [`mod@db_types`].
//! 2. The engine public API ([`mod@cle_api`]): [`WalletApi`], [`OrderFlowApi`],
//!    [`RefundFlowApi`] and [`SettlementApi`]. Backends implement the traits in [`mod@traits`]
//!    to power these.
//! 3. Asynchronous plumbing: pub-sub event hooks ([`mod@events`]), the background task queue
//!    that drives refunds ([`mod@tasks`]), and the overdue-order worker ([`mod@workers`]).
//!
//! The external payment gateway is consumed only through the narrow [`gateway::GatewayClient`]
//! trait; HTTP, signing and session handling live in the integration crate that implements it.
mod db;

pub mod cle_api;
pub mod db_types;
pub mod events;
pub mod gateway;
pub mod helpers;
pub mod labels;
pub mod tasks;
pub mod traits;
#[cfg(feature = "sqlite")]
pub mod workers;

#[cfg(all(any(feature = "test_utils", test), feature = "sqlite"))]
pub mod test_utils;

pub use cle_api::{OrderFlowApi, RefundFlowApi, RefundOutcome, SettlementApi, WalletApi};
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use traits::{
    AccountManagement,
    LedgerDatabase,
    OrderFlowError,
    OrderManagement,
    PaidOutcome,
    RefundBegin,
    RefundError,
    SettlementApiError,
    SettlementManagement,
    WalletApiError,
};
