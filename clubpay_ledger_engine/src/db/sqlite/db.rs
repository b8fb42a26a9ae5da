use std::{fmt::Debug, sync::Arc};

use chrono::Duration;
use clubpay_common::Money;
use log::{debug, trace};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use super::{ledger, new_pool, orders, settlements, wallets};
use crate::{
    cle_api::order_objects::OrderQueryFilter,
    db_types::{
        LedgerEntry, LedgerReason, NewOrder, NewSettlement, Order, OrderNo, OrderStatusType,
        RefundRequest, RefundScope, SettlementApplication, SettlementDecision, SettlementStatusType,
        Wallet, WalletAdjustment, CLUB_WALLET_MEMBER, SYSTEM_OPERATOR,
    },
    traits::{
        AccountManagement, LedgerDatabase, OrderFlowError, OrderManagement, PaidOutcome,
        RefundBegin, RefundError, SettlementApiError, SettlementManagement, WalletApiError,
    },
};

/// SQLite backend. Clones share the pool and the write lock.
///
/// SQLite allows a single writer at a time; racing write transactions surface as busy errors
/// rather than waiting. The engine's contract is the opposite: contention on the ledger is
/// waiting, never an error. So every mutating operation serializes on `write_lock` before
/// opening its transaction, and readers go straight to the pool.
#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects using `CLUBPAY_DATABASE_URL`, falling back to the default store path.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = super::db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool, write_lock: Arc::new(Mutex::new(())) })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_or_create_wallet(&self, team_id: i64, member_id: i64) -> Result<Wallet, WalletApiError> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_or_create_wallet(team_id, member_id, &mut conn).await
    }

    async fn adjust_wallet(
        &self,
        team_id: i64,
        member_id: i64,
        adjustment: WalletAdjustment,
    ) -> Result<Money, WalletApiError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::fetch_or_create_wallet(team_id, member_id, &mut tx).await?;
        let (before, after) = wallets::adjust_balance(wallet.id, &adjustment, &mut tx).await?;
        ledger::insert_entry(wallet.id, &adjustment, before, after, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Wallet #{}: {before} -> {after} ({})", wallet.id, adjustment.reason);
        Ok(after)
    }

    async fn set_credit_limit(&self, team_id: i64, member_id: i64, credit_limit: Money) -> Result<(), WalletApiError> {
        let _write = self.write_lock.lock().await;
        if credit_limit.is_negative() {
            return Err(WalletApiError::InvalidAdjustment(format!(
                "credit limit must be non-negative, got {credit_limit}"
            )));
        }
        let mut conn = self.pool.acquire().await?;
        wallets::set_credit_limit(team_id, member_id, credit_limit, &mut conn).await
    }

    async fn insert_order(&self, order: &NewOrder, order_no: OrderNo) -> Result<Order, OrderFlowError> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &order_no, &mut conn).await
    }

    async fn order_no_exists(&self, order_no: &OrderNo) -> Result<bool, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let exists = orders::order_no_exists(order_no, &mut conn).await?;
        Ok(exists)
    }

    async fn mark_order_awaiting_confirm(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        orders::mark_awaiting_confirm(order_no, &mut conn).await
    }

    async fn confirm_order_paid(&self, order_no: &OrderNo) -> Result<PaidOutcome, OrderFlowError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_no(order_no, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_no.clone()))?;
        match order.status {
            OrderStatusType::Paid => return Ok(PaidOutcome::AlreadyPaid(order)),
            s if s.is_payable() => {},
            s => return Err(OrderFlowError::InvalidStateTransition { from: s, to: OrderStatusType::Paid }),
        }
        if order.credit_fee.is_positive() || order.credit_units > 0 {
            let wallet = wallets::fetch_or_create_wallet(order.team_id, order.payer_id, &mut tx).await?;
            let adjustment = WalletAdjustment::new(-order.credit_fee, LedgerReason::Settlement)
                .with_units(-order.credit_units)
                .for_order(order.order_no.clone())
                .with_note("order payment");
            let (before, after) = wallets::adjust_balance(wallet.id, &adjustment, &mut tx).await?;
            ledger::insert_entry(wallet.id, &adjustment, before, after, &mut tx).await?;
        }
        let paid = orders::mark_paid(order_no, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_no}] has been marked as paid");
        Ok(PaidOutcome::Confirmed(paid))
    }

    async fn cancel_order(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        orders::mark_cancelled(order_no, &mut conn).await
    }

    async fn finish_order(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_no(order_no, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_no.clone()))?;
        if order.status != OrderStatusType::Paid {
            return Err(OrderFlowError::InvalidStateTransition {
                from: order.status,
                to: OrderStatusType::Finished,
            });
        }
        let receipt = order.received_fee();
        if receipt.is_positive() {
            let wallet = wallets::fetch_or_create_wallet(order.team_id, CLUB_WALLET_MEMBER, &mut tx).await?;
            let adjustment = WalletAdjustment::new(receipt, LedgerReason::Settlement)
                .for_order(order.order_no.clone())
                .with_note("club receipt")
                .exempt_from_credit_check();
            let (before, after) = wallets::adjust_balance(wallet.id, &adjustment, &mut tx).await?;
            ledger::insert_entry(wallet.id, &adjustment, before, after, &mut tx).await?;
        }
        let finished = orders::mark_finished(order_no, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_no}] finished; {receipt} credited to team #{}", finished.team_id);
        Ok(finished)
    }

    async fn close_overdue_orders(&self, max_age: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        let closed = orders::close_overdue(max_age.num_seconds(), &mut conn).await?;
        Ok(closed)
    }

    async fn begin_refund(&self, request: &RefundRequest) -> Result<RefundBegin, RefundError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_no(&request.order_no, &mut tx)
            .await?
            .ok_or_else(|| RefundError::OrderNotFound(request.order_no.clone()))?;
        if order.refund_status.is_terminal() {
            return Ok(RefundBegin::AlreadySettled(order));
        }
        if order.refund_status.is_in_flight() {
            return Ok(RefundBegin::Resumed(order));
        }
        if order.status != OrderStatusType::Paid {
            return Err(RefundError::NotRefundable { order_no: order.order_no, status: order.status });
        }
        if let RefundScope::Partial { refund_fee } = request.scope {
            if !refund_fee.is_positive() || refund_fee > order.refundable_fee() {
                return Err(RefundError::AmountExceedsRefundable {
                    requested: refund_fee,
                    refundable: order.refundable_fee(),
                });
            }
        }
        // The wallet leg runs exactly once, atomically with leaving NoRefund. A redelivered
        // trigger lands in the Resumed branch above and cannot credit the wallet again.
        if request.scope.is_full() && (order.credit_fee.is_positive() || order.credit_units > 0) {
            let wallet = wallets::fetch_or_create_wallet(order.team_id, order.payer_id, &mut tx).await?;
            let adjustment = WalletAdjustment::new(order.credit_fee, LedgerReason::Settlement)
                .with_units(order.credit_units)
                .for_order(order.order_no.clone())
                .by_operator(request.operator)
                .with_note("order refund")
                .exempt_from_credit_check();
            let (before, after) = wallets::adjust_balance(wallet.id, &adjustment, &mut tx).await?;
            ledger::insert_entry(wallet.id, &adjustment, before, after, &mut tx).await?;
        }
        let refunding = orders::mark_refunding(&request.order_no, request.scope.refunding_status(), &mut tx)
            .await?
            .ok_or_else(|| RefundError::NotRefundable { order_no: request.order_no.clone(), status: order.status })?;
        tx.commit().await?;
        debug!("🗃️ Order [{}] entered {}", request.order_no, refunding.refund_status);
        Ok(RefundBegin::Started(refunding))
    }

    async fn complete_refund(
        &self,
        order_no: &OrderNo,
        scope: RefundScope,
        gateway_refunded: Money,
    ) -> Result<Order, RefundError> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        let updated =
            orders::mark_refunded(order_no, scope.refunded_status(), gateway_refunded, scope.is_full(), &mut conn)
                .await?;
        match updated {
            Some(order) => {
                debug!("🗃️ Order [{order_no}] refund settled: {} ({gateway_refunded} via gateway)", order.refund_status);
                Ok(order)
            },
            None => match orders::fetch_order_by_no(order_no, &mut conn).await? {
                Some(order) => {
                    Err(RefundError::NotRefundable { order_no: order_no.clone(), status: order.status })
                },
                None => Err(RefundError::OrderNotFound(order_no.clone())),
            },
        }
    }

    async fn fail_refund(&self, order_no: &OrderNo, scope: RefundScope) -> Result<Order, RefundError> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        let updated = orders::mark_refund_failed(order_no, scope.failed_status(), &mut conn).await?;
        match updated {
            Some(order) => {
                debug!("🗃️ Order [{order_no}] refund marked failed: {}", order.refund_status);
                Ok(order)
            },
            None => match orders::fetch_order_by_no(order_no, &mut conn).await? {
                Some(order) => {
                    Err(RefundError::NotRefundable { order_no: order_no.clone(), status: order.status })
                },
                None => Err(RefundError::OrderNotFound(order_no.clone())),
            },
        }
    }

    async fn insert_settlement(&self, request: &NewSettlement) -> Result<SettlementApplication, SettlementApiError> {
        let _write = self.write_lock.lock().await;
        if !request.requested_balance.is_positive() {
            return Err(SettlementApiError::InvalidRequest(format!(
                "requested balance must be positive, got {}",
                request.requested_balance
            )));
        }
        let mut tx = self.pool.begin().await?;
        if settlements::open_for_team(request.team_id, &mut tx).await?.is_some() {
            return Err(SettlementApiError::ApplicationAlreadyExists(request.team_id));
        }
        let available = wallets::fetch_wallet(request.team_id, CLUB_WALLET_MEMBER, &mut tx)
            .await?
            .map(|w| w.balance)
            .unwrap_or_default();
        if request.requested_balance > available {
            return Err(SettlementApiError::InsufficientBalance {
                requested: request.requested_balance,
                available,
            });
        }
        let application = settlements::insert_settlement(request, &mut tx).await?;
        tx.commit().await?;
        Ok(application)
    }

    async fn decide_settlement(
        &self,
        application_id: i64,
        approver: i64,
        decision: SettlementDecision,
    ) -> Result<SettlementApplication, SettlementApiError> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        let (to, reason) = match decision {
            SettlementDecision::Approve => (SettlementStatusType::Approved, None),
            SettlementDecision::Disapprove { reason } => (SettlementStatusType::Disapproved, Some(reason)),
        };
        let application = settlements::decide(application_id, approver, to, reason, &mut conn).await?;
        debug!("🗃️ Settlement #{application_id} decided: {}", application.status);
        Ok(application)
    }

    async fn finish_settlement(&self, application_id: i64) -> Result<SettlementApplication, SettlementApiError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let application = settlements::fetch_settlement(application_id, &mut tx)
            .await?
            .ok_or(SettlementApiError::ApplicationNotFound(application_id))?;
        if application.status != SettlementStatusType::Approved {
            return Err(SettlementApiError::InvalidStateTransition {
                from: application.status,
                to: SettlementStatusType::Finished,
            });
        }
        let wallet = wallets::fetch_or_create_wallet(application.team_id, CLUB_WALLET_MEMBER, &mut tx).await?;
        let adjustment = WalletAdjustment::new(-application.requested_balance, LedgerReason::Settlement)
            .by_operator(application.approver_id.unwrap_or(SYSTEM_OPERATOR))
            .with_note("settlement withdrawal");
        let (before, after) = wallets::adjust_balance(wallet.id, &adjustment, &mut tx).await?;
        ledger::insert_entry(wallet.id, &adjustment, before, after, &mut tx).await?;
        let finished = settlements::mark_finished(application_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Settlement #{application_id} finished; {} withdrawn from team #{}", finished.requested_balance, finished.team_id);
        Ok(finished)
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_wallet(&self, team_id: i64, member_id: i64) -> Result<Option<Wallet>, WalletApiError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet(team_id, member_id, &mut conn).await?;
        Ok(wallet)
    }

    async fn wallet_history(&self, team_id: i64, member_id: i64) -> Result<Vec<LedgerEntry>, WalletApiError> {
        let mut conn = self.pool.acquire().await?;
        let Some(wallet) = wallets::fetch_wallet(team_id, member_id, &mut conn).await? else {
            return Ok(Vec::new());
        };
        let entries = ledger::entries_for_wallet(wallet.id, &mut conn).await?;
        Ok(entries)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_no(order_no, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }
}

impl SettlementManagement for SqliteDatabase {
    async fn fetch_settlement(&self, application_id: i64) -> Result<Option<SettlementApplication>, SettlementApiError> {
        let mut conn = self.pool.acquire().await?;
        let application = settlements::fetch_settlement(application_id, &mut conn).await?;
        Ok(application)
    }

    async fn open_settlement_for_team(&self, team_id: i64) -> Result<Option<SettlementApplication>, SettlementApiError> {
        let mut conn = self.pool.acquire().await?;
        let application = settlements::open_for_team(team_id, &mut conn).await?;
        Ok(application)
    }

    async fn settlements_for_team(&self, team_id: i64) -> Result<Vec<SettlementApplication>, SettlementApiError> {
        let mut conn = self.pool.acquire().await?;
        let applications = settlements::list_for_team(team_id, &mut conn).await?;
        Ok(applications)
    }
}
