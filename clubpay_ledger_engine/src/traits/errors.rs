use clubpay_common::Money;
use thiserror::Error;

use crate::db_types::{OrderNo, OrderStatusType, SettlementStatusType};

#[derive(Debug, Error)]
pub enum WalletApiError {
    #[error("Insufficient balance: {balance} with credit limit {credit_limit} cannot absorb {delta}")]
    InsufficientCredit { balance: Money, credit_limit: Money, delta: Money },
    #[error("Insufficient free units: {units} available, {units_delta} requested")]
    InsufficientUnits { units: i64, units_delta: i64 },
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),
    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("Order [{0}] not found")]
    OrderNotFound(OrderNo),
    #[error("An order with number [{0}] already exists")]
    DuplicateOrder(OrderNo),
    #[error("Order may not move from {from} to {to}")]
    InvalidStateTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Inconsistent fee split: {0}")]
    InvalidFeeSplit(String),
    #[error("Could not find an unused order number after {0} attempts")]
    OrderNoSpaceExhausted(usize),
    #[error(transparent)]
    Wallet(#[from] WalletApiError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum RefundError {
    #[error("Order [{0}] not found")]
    OrderNotFound(OrderNo),
    #[error("Only paid orders can be refunded; order [{order_no}] is {status}")]
    NotRefundable { order_no: OrderNo, status: OrderStatusType },
    #[error("Refund of {requested} exceeds the refundable gateway fee {refundable}")]
    AmountExceedsRefundable { requested: Money, refundable: Money },
    #[error(transparent)]
    Wallet(#[from] WalletApiError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum SettlementApiError {
    #[error("Team #{0} already has a settlement application in progress")]
    ApplicationAlreadyExists(i64),
    #[error("Settlement application #{0} not found")]
    ApplicationNotFound(i64),
    #[error("Settlement application may not move from {from} to {to}")]
    InvalidStateTransition { from: SettlementStatusType, to: SettlementStatusType },
    #[error("Requested balance {requested} exceeds the club balance {available}")]
    InsufficientBalance { requested: Money, available: Money },
    #[error("Invalid settlement request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Wallet(#[from] WalletApiError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}
