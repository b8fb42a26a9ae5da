use serde::{Deserialize, Serialize};

use crate::db_types::Order;

/// Fired once per order, when its payment is first confirmed. The notification layer subscribes
/// to this to tell the payer and the club.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired when a refund reaches its refunded terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundCompletedEvent {
    pub order: Order,
}

impl RefundCompletedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired when a refund exhausts its gateway retry and lands in a failed terminal state. The
/// back office subscribes to this: failed refunds are only ever resolved by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundFailedEvent {
    pub order: Order,
}

impl RefundFailedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
