use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    cle_api::order_objects::OrderQueryFilter,
    db_types::{NewOrder, Order, OrderNo},
    events::{EventProducers, OrderPaidEvent},
    helpers::{new_order_no, MAX_ORDER_NO_ATTEMPTS},
    traits::{LedgerDatabase, OrderFlowError, OrderManagement, PaidOutcome},
};

/// `OrderFlowApi` drives the order lifecycle: creation, payment confirmation, cancellation,
/// finishing, and the overdue-close sweep. Refunds live in
/// [`RefundFlowApi`](crate::cle_api::RefundFlowApi).
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> OrderFlowApi<B>
where B: LedgerDatabase + OrderManagement
{
    /// Creates a new order in `WaitPay` state, assigning a fresh order number.
    ///
    /// The number is regenerated on collision with an existing order, up to
    /// [`MAX_ORDER_NO_ATTEMPTS`] times. Exhausting the attempts means the random source is
    /// broken and is reported as a hard error.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        if !order.fee_split_is_consistent() {
            return Err(OrderFlowError::InvalidFeeSplit(format!(
                "total {} must equal credit {} + payment {} + discount {}",
                order.total_fee, order.credit_fee, order.payment_fee, order.discount_fee
            )));
        }
        if !order.payment_method.is_gateway() && order.payment_fee.is_positive() {
            return Err(OrderFlowError::InvalidFeeSplit(format!(
                "a {} order cannot carry a gateway fee of {}",
                order.payment_method, order.payment_fee
            )));
        }
        for _ in 0..MAX_ORDER_NO_ATTEMPTS {
            let order_no = {
                let mut rng = rand::thread_rng();
                new_order_no(Utc::now(), &mut rng)
            };
            if self.db.order_no_exists(&order_no).await? {
                warn!("🔄️📦️ Order number [{order_no}] already taken. Regenerating");
                continue;
            }
            match self.db.insert_order(&order, order_no.clone()).await {
                Ok(order) => {
                    debug!("🔄️📦️ Order [{}] created for member #{} in team #{}", order.order_no, order.payer_id, order.team_id);
                    return Ok(order);
                },
                // Lost the race against a concurrent insert of the same number. Roll the dice
                // again.
                Err(OrderFlowError::DuplicateOrder(no)) => {
                    warn!("🔄️📦️ Order number [{no}] collided on insert. Regenerating");
                    continue;
                },
                Err(e) => return Err(e),
            }
        }
        error!("🔄️📦️ Gave up generating an order number after {MAX_ORDER_NO_ATTEMPTS} attempts");
        Err(OrderFlowError::OrderNoSpaceExhausted(MAX_ORDER_NO_ATTEMPTS))
    }

    /// Records that a gateway prepayment was issued for the order (`WaitPay → WaitConfirm`).
    /// The payment itself concludes when the gateway's confirmation webhook triggers
    /// [`Self::confirm_paid`].
    pub async fn begin_gateway_payment(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        let order = self.db.mark_order_awaiting_confirm(order_no).await?;
        debug!("🔄️📦️ Order [{order_no}] is awaiting gateway confirmation");
        Ok(order)
    }

    /// Confirms payment of the order. Called by the gateway confirmation webhook, or directly
    /// for wallet-only orders.
    ///
    /// The wallet portion of the payment (`credit_fee`/`credit_units`) is debited atomically
    /// with the state change. Confirming an already-paid order is a no-op, so webhook
    /// redelivery cannot debit twice; hooks fire only on the first confirmation.
    pub async fn confirm_paid(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        match self.db.confirm_order_paid(order_no).await? {
            PaidOutcome::Confirmed(order) => {
                debug!("🔄️📦️ Order [{order_no}] paid: {} from wallet, {} via gateway", order.credit_fee, order.payment_fee);
                self.call_order_paid_hook(&order).await;
                Ok(order)
            },
            PaidOutcome::AlreadyPaid(order) => {
                debug!("🔄️📦️ Order [{order_no}] was already paid. Nothing to do");
                Ok(order)
            },
        }
    }

    /// `WaitPay → CancelledByUser`. Only unpaid orders can be cancelled.
    pub async fn cancel_order(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        let order = self.db.cancel_order(order_no).await?;
        debug!("🔄️📦️ Order [{order_no}] cancelled by the payer");
        Ok(order)
    }

    /// `Paid → Finished`: the event concluded and the club collects the order's receipts.
    pub async fn finish_order(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        let order = self.db.finish_order(order_no).await?;
        debug!("🔄️📦️ Order [{order_no}] finished");
        Ok(order)
    }

    /// Closes orders that have waited for payment or confirmation longer than `max_age`.
    /// Returns the closed orders.
    pub async fn close_overdue_orders(&self, max_age: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let closed = self.db.close_overdue_orders(max_age).await?;
        if !closed.is_empty() {
            info!("🔄️📦️ Closed {} orders that never completed payment", closed.len());
        }
        Ok(closed)
    }

    pub async fn order(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderFlowError> {
        self.db.fetch_order_by_order_no(order_no).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        self.db.search_orders(query).await
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            trace!("🔄️📦️ Notifying order paid hook subscribers");
            let event = OrderPaidEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }
}
