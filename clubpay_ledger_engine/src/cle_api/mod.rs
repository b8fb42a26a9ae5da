mod order_flow_api;
pub mod order_objects;
mod refund_api;
mod settlement_api;
mod wallet_api;

pub use order_flow_api::OrderFlowApi;
pub use refund_api::{RefundFlowApi, RefundOutcome};
pub use settlement_api::SettlementApi;
pub use wallet_api::WalletApi;
