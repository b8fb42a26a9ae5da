use crate::db_types::Order;

/// Result of a payment confirmation. Confirming an order that is already `Paid` is a no-op so
/// that webhook redelivery cannot debit the wallet twice; callers use the distinction to decide
/// whether to fire hooks.
#[derive(Debug, Clone)]
pub enum PaidOutcome {
    Confirmed(Order),
    AlreadyPaid(Order),
}

impl PaidOutcome {
    pub fn order(&self) -> &Order {
        match self {
            PaidOutcome::Confirmed(order) | PaidOutcome::AlreadyPaid(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            PaidOutcome::Confirmed(order) | PaidOutcome::AlreadyPaid(order) => order,
        }
    }
}

/// Result of entering the refund workflow for an order.
#[derive(Debug, Clone)]
pub enum RefundBegin {
    /// The order left `NoRefund`: the wallet portion has been returned and the refund is marked
    /// in flight. The gateway leg should run next.
    Started(Order),
    /// The order was already in flight (a redelivered trigger, or recovery after a crash between
    /// the wallet leg and the gateway leg). The wallet leg is skipped; the gateway leg resumes.
    Resumed(Order),
    /// The refund already reached a terminal state; nothing to do.
    AlreadySettled(Order),
}
