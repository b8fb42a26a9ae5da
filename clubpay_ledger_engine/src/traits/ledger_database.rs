use chrono::Duration;
use clubpay_common::Money;

use crate::{
    db_types::{
        NewOrder, NewSettlement, Order, OrderNo, RefundRequest, RefundScope, SettlementApplication,
        SettlementDecision, Wallet, WalletAdjustment,
    },
    traits::{
        data_objects::{PaidOutcome, RefundBegin},
        errors::{OrderFlowError, RefundError, SettlementApiError, WalletApiError},
    },
};

/// The write path of the engine. Every method that moves money is a single atomic unit on the
/// backing store: either all of its rows (state change, wallet balance, ledger entry) land, or
/// none do.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Fetches the wallet for the given team/member pair, creating an empty one if it does not
    /// exist yet. Wallets are never deleted.
    async fn fetch_or_create_wallet(&self, team_id: i64, member_id: i64) -> Result<Wallet, WalletApiError>;

    /// Applies one balance/unit mutation and writes its ledger entry in one atomic unit.
    ///
    /// Mutations on the same wallet observe a total order; the credit-limit check, the balance
    /// update and the ledger insert cannot interleave with another mutation of the same wallet.
    /// Under [`CreditPolicy::Enforce`](crate::db_types::CreditPolicy), a delta that would push
    /// the balance below `-credit_limit` fails with
    /// [`WalletApiError::InsufficientCredit`] and writes nothing.
    ///
    /// Returns the new balance.
    async fn adjust_wallet(
        &self,
        team_id: i64,
        member_id: i64,
        adjustment: WalletAdjustment,
    ) -> Result<Money, WalletApiError>;

    /// Sets the maximum overdraft for a wallet. Not a balance mutation; no ledger entry is
    /// written.
    async fn set_credit_limit(&self, team_id: i64, member_id: i64, credit_limit: Money) -> Result<(), WalletApiError>;

    /// Stores a new order under the given (already generated) order number, in `WaitPay` state.
    async fn insert_order(&self, order: &NewOrder, order_no: OrderNo) -> Result<Order, OrderFlowError>;

    async fn order_no_exists(&self, order_no: &OrderNo) -> Result<bool, OrderFlowError>;

    /// `WaitPay → WaitConfirm`: a gateway prepayment was issued for the order.
    async fn mark_order_awaiting_confirm(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError>;

    /// `{WaitPay, WaitConfirm} → Paid`. In the same atomic unit, debits the payer's wallet by
    /// the order's `credit_fee`/`credit_units` (reason Settlement, credit-checked) when those
    /// are nonzero. Confirming an order that is already `Paid` mutates nothing and reports
    /// [`PaidOutcome::AlreadyPaid`].
    async fn confirm_order_paid(&self, order_no: &OrderNo) -> Result<PaidOutcome, OrderFlowError>;

    /// `WaitPay → CancelledByUser`.
    async fn cancel_order(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError>;

    /// `Paid → Finished`. In the same atomic unit, credits the club's receipts wallet with the
    /// money the order actually brought in (wallet portion + gateway portion − refunds).
    async fn finish_order(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError>;

    /// Closes every `WaitPay`/`WaitConfirm` order created more than `max_age` ago. Returns the
    /// closed orders.
    async fn close_overdue_orders(&self, max_age: Duration) -> Result<Vec<Order>, OrderFlowError>;

    /// Enters the refund workflow for an order. On the `NoRefund → *Refunding` transition the
    /// wallet portion (and free units, for full refunds) is returned in the same atomic unit,
    /// so a redelivered trigger can never credit the wallet twice.
    async fn begin_refund(&self, request: &RefundRequest) -> Result<RefundBegin, RefundError>;

    /// `*Refunding → *Refunded`. Accumulates `gateway_refunded` into `refunded_fee`; a full
    /// refund also closes the order.
    async fn complete_refund(
        &self,
        order_no: &OrderNo,
        scope: RefundScope,
        gateway_refunded: Money,
    ) -> Result<Order, RefundError>;

    /// `*Refunding → *RefundFailed`: the gateway leg exhausted its retry. Terminal; surfaced to
    /// operators for manual reconciliation, never retried automatically.
    async fn fail_refund(&self, order_no: &OrderNo, scope: RefundScope) -> Result<Order, RefundError>;

    /// Stores a new settlement application in `Requesting` state. Fails with
    /// [`SettlementApiError::ApplicationAlreadyExists`] when the team already has a `Requesting`
    /// application, and with [`SettlementApiError::InsufficientBalance`] when the club wallet
    /// cannot cover the requested amount.
    async fn insert_settlement(&self, request: &NewSettlement) -> Result<SettlementApplication, SettlementApiError>;

    /// `Requesting → Approved | Disapproved`.
    async fn decide_settlement(
        &self,
        application_id: i64,
        approver: i64,
        decision: SettlementDecision,
    ) -> Result<SettlementApplication, SettlementApiError>;

    /// `Approved → Finished`. In the same atomic unit, debits the club's receipts wallet by the
    /// requested balance, leaving the audit trail of the withdrawal.
    async fn finish_settlement(&self, application_id: i64) -> Result<SettlementApplication, SettlementApiError>;
}
