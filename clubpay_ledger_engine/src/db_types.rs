use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
pub use clubpay_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// Operator id recorded on ledger entries when the engine itself, rather than a staff member,
/// performs the mutation.
pub const SYSTEM_OPERATOR: i64 = 0;

/// Member id of the wallet row that holds a club's accumulated receipts for a team.
pub const CLUB_WALLET_MEMBER: i64 = 0;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------       OrderNo       ---------------------------------------------------------

/// A human-readable order number: a UTC timestamp prefix followed by a random numeric suffix.
/// Globally unique and immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNo(pub String);

impl FromStr for OrderNo {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and no payment has been applied yet.
    WaitPay,
    /// A gateway prepayment was issued and the engine is waiting for the confirmation callback.
    WaitConfirm,
    /// Payment has been received in full (wallet portion debited, gateway portion confirmed).
    Paid,
    /// The order concluded normally and the club has been credited.
    Finished,
    /// The payer cancelled the order before paying.
    CancelledByUser,
    /// The order was closed without completing: the gateway never confirmed, or a full refund
    /// was issued.
    Closed,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::CancelledByUser | Self::Closed)
    }

    /// States from which a payment confirmation may still arrive.
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::WaitPay | Self::WaitConfirm)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::WaitPay => write!(f, "WaitPay"),
            OrderStatusType::WaitConfirm => write!(f, "WaitConfirm"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Finished => write!(f, "Finished"),
            OrderStatusType::CancelledByUser => write!(f, "CancelledByUser"),
            OrderStatusType::Closed => write!(f, "Closed"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WaitPay" => Ok(Self::WaitPay),
            "WaitConfirm" => Ok(Self::WaitConfirm),
            "Paid" => Ok(Self::Paid),
            "Finished" => Ok(Self::Finished),
            "CancelledByUser" => Ok(Self::CancelledByUser),
            "Closed" => Ok(Self::Closed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to WaitPay");
            OrderStatusType::WaitPay
        })
    }
}

//--------------------------------------  RefundStatusType   ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RefundStatusType {
    NoRefund,
    PartialRefunding,
    FullRefunding,
    PartialRefunded,
    FullRefunded,
    /// A partial refund exhausted its gateway retry. Requires manual reconciliation.
    PartialRefundFailed,
    /// A full refund exhausted its gateway retry. Requires manual reconciliation.
    FullRefundFailed,
}

impl RefundStatusType {
    /// Terminal states are never reprocessed: a redelivered refund trigger is a no-op.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PartialRefunded | Self::FullRefunded | Self::PartialRefundFailed | Self::FullRefundFailed
        )
    }

    /// The wallet leg has run but the gateway leg has not concluded.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::PartialRefunding | Self::FullRefunding)
    }
}

impl Display for RefundStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatusType::NoRefund => write!(f, "NoRefund"),
            RefundStatusType::PartialRefunding => write!(f, "PartialRefunding"),
            RefundStatusType::FullRefunding => write!(f, "FullRefunding"),
            RefundStatusType::PartialRefunded => write!(f, "PartialRefunded"),
            RefundStatusType::FullRefunded => write!(f, "FullRefunded"),
            RefundStatusType::PartialRefundFailed => write!(f, "PartialRefundFailed"),
            RefundStatusType::FullRefundFailed => write!(f, "FullRefundFailed"),
        }
    }
}

impl FromStr for RefundStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NoRefund" => Ok(Self::NoRefund),
            "PartialRefunding" => Ok(Self::PartialRefunding),
            "FullRefunding" => Ok(Self::FullRefunding),
            "PartialRefunded" => Ok(Self::PartialRefunded),
            "FullRefunded" => Ok(Self::FullRefunded),
            "PartialRefundFailed" => Ok(Self::PartialRefundFailed),
            "FullRefundFailed" => Ok(Self::FullRefundFailed),
            s => Err(ConversionError(format!("Invalid refund status: {s}"))),
        }
    }
}

//--------------------------------------    LedgerReason     ---------------------------------------------------------

/// Why a wallet balance changed. One reason per ledger entry; the entry, not the reason, carries
/// the sign of the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LedgerReason {
    /// Order payment debits, refund credits, club receipts and withdrawals.
    Settlement,
    /// A staff member corrected a balance by hand.
    ManualAdjust,
    /// The member topped up the wallet.
    Recharge,
    /// The club granted balance or free units.
    Gift,
}

impl Display for LedgerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerReason::Settlement => write!(f, "Settlement"),
            LedgerReason::ManualAdjust => write!(f, "ManualAdjust"),
            LedgerReason::Recharge => write!(f, "Recharge"),
            LedgerReason::Gift => write!(f, "Gift"),
        }
    }
}

impl FromStr for LedgerReason {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Settlement" => Ok(Self::Settlement),
            "ManualAdjust" => Ok(Self::ManualAdjust),
            "Recharge" => Ok(Self::Recharge),
            "Gift" => Ok(Self::Gift),
            s => Err(ConversionError(format!("Invalid ledger reason: {s}"))),
        }
    }
}

//--------------------------------------    PaymentMethod    ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Paid entirely from the wallet balance; no gateway involved.
    Wallet,
    GatewayA,
    GatewayB,
}

impl PaymentMethod {
    pub fn is_gateway(&self) -> bool {
        matches!(self, Self::GatewayA | Self::GatewayB)
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Wallet => write!(f, "Wallet"),
            PaymentMethod::GatewayA => write!(f, "GatewayA"),
            PaymentMethod::GatewayB => write!(f, "GatewayB"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Wallet" => Ok(Self::Wallet),
            "GatewayA" => Ok(Self::GatewayA),
            "GatewayB" => Ok(Self::GatewayB),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------       Wallet        ---------------------------------------------------------

/// A member's prepaid balance with one club. The unit of locking and consistency: all mutations
/// on the same wallet observe a total order, enforced by the storage layer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub team_id: i64,
    pub member_id: i64,
    pub balance: Money,
    /// Maximum allowed overdraft. Non-negative; a balance may go down to `-credit_limit`.
    pub credit_limit: Money,
    /// Punch-card style prepaid usage counter. Never negative.
    pub free_units: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     LedgerEntry     ---------------------------------------------------------

/// One immutable row per wallet mutation. The trail is permanent and is the sole source of truth
/// for reconstructing balance history: the wallet balance always equals the `balance_after` of
/// its latest entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub wallet_id: i64,
    pub delta: Money,
    pub units_delta: i64,
    pub balance_before: Money,
    pub balance_after: Money,
    pub reason: LedgerReason,
    pub order_no: Option<String>,
    pub operator: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   CreditPolicy      ---------------------------------------------------------

/// Whether a wallet mutation must respect the credit limit. System reversals (refund credits)
/// are exempt: they may not be rejected even if the balance is already beyond the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditPolicy {
    Enforce,
    Exempt,
}

//--------------------------------------  WalletAdjustment   ---------------------------------------------------------

/// A single wallet mutation: balance delta, optional free-unit delta, and the audit fields that
/// end up on the ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAdjustment {
    pub delta: Money,
    pub units_delta: i64,
    pub reason: LedgerReason,
    pub order_no: Option<OrderNo>,
    pub operator: i64,
    pub note: Option<String>,
    pub policy: CreditPolicy,
}

impl WalletAdjustment {
    pub fn new(delta: Money, reason: LedgerReason) -> Self {
        Self {
            delta,
            units_delta: 0,
            reason,
            order_no: None,
            operator: SYSTEM_OPERATOR,
            note: None,
            policy: CreditPolicy::Enforce,
        }
    }

    pub fn with_units(mut self, units_delta: i64) -> Self {
        self.units_delta = units_delta;
        self
    }

    pub fn for_order(mut self, order_no: OrderNo) -> Self {
        self.order_no = Some(order_no);
        self
    }

    pub fn by_operator(mut self, operator: i64) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn exempt_from_credit_check(mut self) -> Self {
        self.policy = CreditPolicy::Exempt;
        self
    }
}

//--------------------------------------        Order        ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_no: OrderNo,
    pub payer_id: i64,
    pub team_id: i64,
    pub total_fee: Money,
    /// Portion paid from the wallet balance.
    pub credit_fee: Money,
    /// Portion paid through the external gateway.
    pub payment_fee: Money,
    pub discount_fee: Money,
    /// Free units consumed by this order.
    pub credit_units: i64,
    pub payment_method: PaymentMethod,
    pub status: OrderStatusType,
    pub refund_status: RefundStatusType,
    /// Total refunded through the gateway so far.
    pub refunded_fee: Money,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The amount of real money this order brought in: wallet portion plus gateway portion,
    /// less anything already refunded.
    pub fn received_fee(&self) -> Money {
        self.credit_fee + self.payment_fee - self.refunded_fee
    }

    /// Gateway money that can still be refunded.
    pub fn refundable_fee(&self) -> Money {
        self.payment_fee - self.refunded_fee
    }
}

//--------------------------------------      NewOrder       ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub payer_id: i64,
    pub team_id: i64,
    pub total_fee: Money,
    pub credit_fee: Money,
    pub payment_fee: Money,
    pub discount_fee: Money,
    pub credit_units: i64,
    pub payment_method: PaymentMethod,
    /// Free-form description supplied by the purchase flow (activity name, match round, ...).
    pub memo: Option<String>,
}

impl NewOrder {
    pub fn new(payer_id: i64, team_id: i64, total_fee: Money, payment_method: PaymentMethod) -> Self {
        Self {
            payer_id,
            team_id,
            total_fee,
            credit_fee: Money::default(),
            payment_fee: Money::default(),
            discount_fee: Money::default(),
            credit_units: 0,
            payment_method,
            memo: None,
        }
    }

    pub fn with_credit_fee(mut self, credit_fee: Money) -> Self {
        self.credit_fee = credit_fee;
        self
    }

    pub fn with_payment_fee(mut self, payment_fee: Money) -> Self {
        self.payment_fee = payment_fee;
        self
    }

    pub fn with_discount_fee(mut self, discount_fee: Money) -> Self {
        self.discount_fee = discount_fee;
        self
    }

    pub fn with_credit_units(mut self, credit_units: i64) -> Self {
        self.credit_units = credit_units;
        self
    }

    pub fn with_memo<S: Into<String>>(mut self, memo: S) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// The fee split must account for the full price of the order.
    pub fn fee_split_is_consistent(&self) -> bool {
        !self.total_fee.is_negative()
            && !self.credit_fee.is_negative()
            && !self.payment_fee.is_negative()
            && !self.discount_fee.is_negative()
            && self.credit_units >= 0
            && self.total_fee == self.credit_fee + self.payment_fee + self.discount_fee
    }
}

//--------------------------------------    RefundScope      ---------------------------------------------------------

/// How much of an order to refund. Partial refunds return gateway money only; a full refund also
/// returns the wallet portion and any consumed free units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundScope {
    Full,
    Partial { refund_fee: Money },
}

impl RefundScope {
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn refunding_status(&self) -> RefundStatusType {
        match self {
            Self::Full => RefundStatusType::FullRefunding,
            Self::Partial { .. } => RefundStatusType::PartialRefunding,
        }
    }

    pub fn refunded_status(&self) -> RefundStatusType {
        match self {
            Self::Full => RefundStatusType::FullRefunded,
            Self::Partial { .. } => RefundStatusType::PartialRefunded,
        }
    }

    pub fn failed_status(&self) -> RefundStatusType {
        match self {
            Self::Full => RefundStatusType::FullRefundFailed,
            Self::Partial { .. } => RefundStatusType::PartialRefundFailed,
        }
    }
}

//--------------------------------------   RefundRequest     ---------------------------------------------------------

/// A refund trigger. Delivered at least once; processing is idempotent, so the same request may
/// be enqueued or redelivered safely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_no: OrderNo,
    pub scope: RefundScope,
    pub operator: i64,
}

impl RefundRequest {
    pub fn full(order_no: OrderNo) -> Self {
        Self { order_no, scope: RefundScope::Full, operator: SYSTEM_OPERATOR }
    }

    pub fn partial(order_no: OrderNo, refund_fee: Money) -> Self {
        Self { order_no, scope: RefundScope::Partial { refund_fee }, operator: SYSTEM_OPERATOR }
    }

    pub fn by_operator(mut self, operator: i64) -> Self {
        self.operator = operator;
        self
    }
}

//-------------------------------------- SettlementStatusType ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SettlementStatusType {
    Requesting,
    Approved,
    Disapproved,
    Finished,
}

impl SettlementStatusType {
    /// Only a `Requesting` application blocks a new request for the same team.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Requesting)
    }
}

impl Display for SettlementStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementStatusType::Requesting => write!(f, "Requesting"),
            SettlementStatusType::Approved => write!(f, "Approved"),
            SettlementStatusType::Disapproved => write!(f, "Disapproved"),
            SettlementStatusType::Finished => write!(f, "Finished"),
        }
    }
}

impl FromStr for SettlementStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Requesting" => Ok(Self::Requesting),
            "Approved" => Ok(Self::Approved),
            "Disapproved" => Ok(Self::Disapproved),
            "Finished" => Ok(Self::Finished),
            s => Err(ConversionError(format!("Invalid settlement status: {s}"))),
        }
    }
}

//-------------------------------------- SettlementApplication ---------------------------------------------------------

/// A club's request to withdraw its accumulated balance. At most one application per team may be
/// `Requesting` at a time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SettlementApplication {
    pub id: i64,
    pub team_id: i64,
    pub requester_id: i64,
    pub requested_balance: Money,
    pub status: SettlementStatusType,
    pub approver_id: Option<i64>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSettlement {
    pub team_id: i64,
    pub requester_id: i64,
    pub requested_balance: Money,
}

impl NewSettlement {
    pub fn new(team_id: i64, requester_id: i64, requested_balance: Money) -> Self {
        Self { team_id, requester_id, requested_balance }
    }
}

/// The approver's verdict on a settlement application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementDecision {
    Approve,
    Disapprove { reason: String },
}
