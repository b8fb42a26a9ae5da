use std::fmt::Debug;

use clubpay_common::Money;
use log::*;

use crate::{
    db_types::{Order, RefundRequest, RefundScope},
    events::{EventProducers, RefundCompletedEvent, RefundFailedEvent},
    gateway::{GatewayClient, GatewayConfig, GatewayError, GatewayRefundReceipt, GatewayRefundRequest},
    helpers::{out_refund_no, out_trade_no, RefundAttempt},
    traits::{LedgerDatabase, RefundBegin, RefundError},
};

/// How a refund request concluded. A gateway failure is not an `Err`: the engine records the
/// failed terminal state for operators instead of surfacing an exception, so the caller always
/// learns the order's final refund status.
#[derive(Debug, Clone)]
pub enum RefundOutcome {
    /// The refund settled; the order is in its refunded terminal state.
    Completed(Order),
    /// The order was already in a terminal refund state. Nothing was done.
    Skipped(Order),
    /// Both gateway attempts failed; the order is in its failed terminal state awaiting manual
    /// reconciliation.
    Failed(Order),
}

impl RefundOutcome {
    pub fn order(&self) -> &Order {
        match self {
            RefundOutcome::Completed(order) | RefundOutcome::Skipped(order) | RefundOutcome::Failed(order) => order,
        }
    }
}

/// `RefundFlowApi` reconciles an order's refund against the wallet and the external gateway.
///
/// The wallet leg is synchronous and runs atomically with leaving `NoRefund`. The gateway leg
/// runs afterwards, off any database transaction, bounded by the configured timeout, and is
/// retried exactly once with the alternate trade number before the refund is parked in a failed
/// terminal state. Processing is idempotent under at-least-once delivery of the trigger.
pub struct RefundFlowApi<B, G> {
    db: B,
    gateway: G,
    config: GatewayConfig,
    producers: EventProducers,
}

impl<B, G> Debug for RefundFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundFlowApi")
    }
}

impl<B, G> RefundFlowApi<B, G> {
    pub fn new(db: B, gateway: G, config: GatewayConfig, producers: EventProducers) -> Self {
        Self { db, gateway, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B, G> RefundFlowApi<B, G>
where
    B: LedgerDatabase,
    G: GatewayClient,
{
    pub async fn process_refund(&self, request: &RefundRequest) -> Result<RefundOutcome, RefundError> {
        let order = match self.db.begin_refund(request).await? {
            RefundBegin::AlreadySettled(order) => {
                debug!(
                    "↩️ Order [{}] refund already settled as {}. Nothing to do",
                    request.order_no, order.refund_status
                );
                return Ok(RefundOutcome::Skipped(order));
            },
            RefundBegin::Started(order) => {
                debug!("↩️ Order [{}] refund started: wallet portion returned", request.order_no);
                order
            },
            RefundBegin::Resumed(order) => {
                info!("↩️ Order [{}] refund resumed from {}", request.order_no, order.refund_status);
                order
            },
        };

        let gateway_fee = match request.scope {
            RefundScope::Full => order.refundable_fee(),
            RefundScope::Partial { refund_fee } => refund_fee,
        };
        if gateway_fee.is_zero() || !order.payment_method.is_gateway() {
            let order = self.db.complete_refund(&request.order_no, request.scope, Money::default()).await?;
            self.call_refund_completed_hook(&order).await;
            return Ok(RefundOutcome::Completed(order));
        }

        match self.gateway_refund_with_retry(&order, gateway_fee).await {
            Ok(receipt) => {
                debug!(
                    "↩️ Gateway refunded {gateway_fee} for order [{}] (gateway trade {})",
                    request.order_no, receipt.gateway_trade_no
                );
                let order = self.db.complete_refund(&request.order_no, request.scope, gateway_fee).await?;
                self.call_refund_completed_hook(&order).await;
                Ok(RefundOutcome::Completed(order))
            },
            Err(e) => {
                warn!("↩️ Gateway refund for order [{}] failed twice: {e}", request.order_no);
                let order = self.db.fail_refund(&request.order_no, request.scope).await?;
                self.call_refund_failed_hook(&order).await;
                Ok(RefundOutcome::Failed(order))
            },
        }
    }

    /// Calls the gateway with the `N`-prefixed trade number, then once more with the
    /// `J`-prefixed one if the first attempt fails. The prefixes keep the retry from being
    /// deduplicated against the first attempt on the gateway side.
    async fn gateway_refund_with_retry(
        &self,
        order: &Order,
        refund_fee: Money,
    ) -> Result<GatewayRefundReceipt, GatewayError> {
        let request = GatewayRefundRequest {
            out_trade_no: out_trade_no(&order.order_no, RefundAttempt::First),
            out_refund_no: out_refund_no(&order.order_no),
            total_fee: order.payment_fee,
            refund_fee,
            operator_account: self.config.operator_account.clone(),
        };
        match self.call_gateway(&request).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                warn!(
                    "↩️ First refund attempt for order [{}] failed: {e}. Retrying with alternate trade number",
                    order.order_no
                );
                let retry = GatewayRefundRequest {
                    out_trade_no: out_trade_no(&order.order_no, RefundAttempt::Retry),
                    ..request
                };
                self.call_gateway(&retry).await
            },
        }
    }

    async fn call_gateway(&self, request: &GatewayRefundRequest) -> Result<GatewayRefundReceipt, GatewayError> {
        match tokio::time::timeout(self.config.timeout, self.gateway.refund(request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    async fn call_refund_completed_hook(&self, order: &Order) {
        for emitter in &self.producers.refund_completed_producer {
            trace!("↩️ Notifying refund completed hook subscribers");
            let event = RefundCompletedEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_refund_failed_hook(&self, order: &Order) {
        for emitter in &self.producers.refund_failed_producer {
            trace!("↩️ Notifying refund failed hook subscribers");
            let event = RefundFailedEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }
}
