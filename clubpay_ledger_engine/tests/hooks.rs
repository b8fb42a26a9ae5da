use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use futures_util::FutureExt;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use clubpay_ledger_engine::{
    db_types::{Money, NewOrder, PaymentMethod, RefundRequest},
    events::{EventHandlers, EventHooks},
    gateway::{GatewayConfig, GatewayError},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        TestGateway,
    },
    LedgerDatabase, OrderFlowApi, RefundFlowApi, SqliteDatabase, WalletApi,
};

const TEAM: i64 = 2;
const PAYER: i64 = 15;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

async fn setup_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

#[tokio::test]
async fn on_order_paid_fires_once_per_confirmation() {
    let db = setup_db().await;
    let event = HookCalled::default();
    let event_copy = event.clone();
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |ev| {
        info!("🪝️ {:?}", ev.order.order_no);
        event_copy.called();
        async {}.boxed()
    });
    let handlers = EventHandlers::new(4, hooks);
    let producers = handlers.producers();

    let wallets = WalletApi::new(db.clone());
    wallets.recharge(TEAM, PAYER, Money::from(10_000), 1, "top up").await.unwrap();
    let orders = OrderFlowApi::new(db.clone(), producers);
    let order = orders
        .create_order(
            NewOrder::new(PAYER, TEAM, Money::from(1_000), PaymentMethod::Wallet).with_credit_fee(Money::from(1_000)),
        )
        .await
        .unwrap();
    orders.confirm_paid(&order.order_no).await.unwrap();
    // Redelivered webhook: no second event.
    orders.confirm_paid(&order.order_no).await.unwrap();
    let order2 = orders
        .create_order(
            NewOrder::new(PAYER, TEAM, Money::from(2_000), PaymentMethod::Wallet).with_credit_fee(Money::from(2_000)),
        )
        .await
        .unwrap();
    orders.confirm_paid(&order2.order_no).await.unwrap();

    // Dropping the producers lets the handler drain to completion.
    drop(orders);
    if let Some(handler) = handlers.on_order_paid {
        handler.start_handler().await;
    }
    assert_eq!(event.count(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn refund_hooks_distinguish_settled_from_failed() {
    let db = setup_db().await;
    let completed = HookCalled::default();
    let failed = HookCalled::default();
    let completed_copy = completed.clone();
    let failed_copy = failed.clone();
    let mut hooks = EventHooks::default();
    hooks.on_refund_completed(move |ev| {
        info!("🪝️ refund completed for {:?}", ev.order.order_no);
        completed_copy.called();
        async {}.boxed()
    });
    hooks.on_refund_failed(move |ev| {
        info!("🪝️ refund FAILED for {:?}", ev.order.order_no);
        failed_copy.called();
        async {}.boxed()
    });
    let handlers = EventHandlers::new(4, hooks);
    let producers = handlers.producers();

    let wallets = WalletApi::new(db.clone());
    wallets.recharge(TEAM, PAYER, Money::from(20_000), 1, "top up").await.unwrap();
    let orders = OrderFlowApi::new(db.clone(), Default::default());
    let gateway = TestGateway::new();
    let refunds = RefundFlowApi::new(db.clone(), gateway.clone(), GatewayConfig::new("club-op"), producers);

    // One refund settles, one exhausts both gateway attempts.
    let ok_order = orders
        .create_order(
            NewOrder::new(PAYER, TEAM, Money::from(5_000), PaymentMethod::GatewayA).with_payment_fee(Money::from(5_000)),
        )
        .await
        .unwrap();
    orders.confirm_paid(&ok_order.order_no).await.unwrap();
    let bad_order = orders
        .create_order(
            NewOrder::new(PAYER, TEAM, Money::from(4_000), PaymentMethod::GatewayA).with_payment_fee(Money::from(4_000)),
        )
        .await
        .unwrap();
    orders.confirm_paid(&bad_order.order_no).await.unwrap();

    refunds.process_refund(&RefundRequest::full(ok_order.order_no.clone())).await.unwrap();
    gateway.enqueue_failure(GatewayError::Timeout);
    gateway.enqueue_failure(GatewayError::Timeout);
    refunds.process_refund(&RefundRequest::full(bad_order.order_no.clone())).await.unwrap();

    drop(refunds);
    if let Some(handler) = handlers.on_refund_completed {
        handler.start_handler().await;
    }
    if let Some(handler) = handlers.on_refund_failed {
        handler.start_handler().await;
    }
    assert_eq!(completed.count(), 1);
    assert_eq!(failed.count(), 1);
    tear_down(db).await;
}
