use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use clubpay_ledger_engine::{
    db_types::{Money, NewOrder, OrderStatusType, PaymentMethod, RefundRequest, RefundStatusType},
    events::EventProducers,
    gateway::{GatewayConfig, GatewayError},
    tasks::{run_refund_worker, TaskQueue, REFUND_TASK},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        TestGateway,
    },
    LedgerDatabase, OrderFlowApi, RefundError, RefundFlowApi, RefundOutcome, SqliteDatabase, WalletApi,
};

const TEAM: i64 = 9;
const PAYER: i64 = 77;
const OPERATOR: i64 = 2;

struct TestRig {
    db: SqliteDatabase,
    orders: OrderFlowApi<SqliteDatabase>,
    wallets: WalletApi<SqliteDatabase>,
    gateway: TestGateway,
    refunds: RefundFlowApi<SqliteDatabase, TestGateway>,
}

async fn setup() -> TestRig {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let gateway = TestGateway::new();
    let refunds = RefundFlowApi::new(
        db.clone(),
        gateway.clone(),
        GatewayConfig::new("club-op"),
        EventProducers::default(),
    );
    TestRig {
        db: db.clone(),
        orders: OrderFlowApi::new(db.clone(), EventProducers::default()),
        wallets: WalletApi::new(db),
        gateway,
        refunds,
    }
}

async fn tear_down(mut rig: TestRig) {
    let url = rig.db.url().to_string();
    if let Err(e) = rig.db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

/// Creates and pays an order of 100.00: 20.00 from the wallet, 80.00 via the gateway.
async fn paid_mixed_order(rig: &TestRig) -> clubpay_ledger_engine::db_types::Order {
    rig.wallets.recharge(TEAM, PAYER, Money::from(10_000), OPERATOR, "top up").await.unwrap();
    let new_order = NewOrder::new(PAYER, TEAM, Money::from(10_000), PaymentMethod::GatewayA)
        .with_credit_fee(Money::from(2_000))
        .with_payment_fee(Money::from(8_000));
    let order = rig.orders.create_order(new_order).await.unwrap();
    rig.orders.begin_gateway_payment(&order.order_no).await.unwrap();
    rig.orders.confirm_paid(&order.order_no).await.unwrap()
}

#[tokio::test]
async fn full_refund_retries_with_alternate_trade_number() {
    let rig = setup().await;
    let order = paid_mixed_order(&rig).await;
    assert_eq!(rig.wallets.balance_of(TEAM, PAYER).await.unwrap(), Money::from(8_000));

    rig.gateway.enqueue_failure(GatewayError::Timeout);
    rig.gateway.enqueue_success("gw-refund-001");

    let outcome = rig.refunds.process_refund(&RefundRequest::full(order.order_no.clone())).await.unwrap();
    let refunded = match outcome {
        RefundOutcome::Completed(order) => order,
        other => panic!("expected a completed refund, got {other:?}"),
    };
    assert_eq!(refunded.refund_status, RefundStatusType::FullRefunded);
    assert_eq!(refunded.refunded_fee, Money::from(8_000));
    assert_eq!(refunded.status, OrderStatusType::Closed);

    // The wallet portion came back synchronously.
    assert_eq!(rig.wallets.balance_of(TEAM, PAYER).await.unwrap(), Money::from(10_000));

    // First attempt used the N trade number; the retry used J. One refund reference for both.
    let calls = rig.gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].out_trade_no, format!("N{}", order.order_no));
    assert_eq!(calls[1].out_trade_no, format!("J{}", order.order_no));
    assert_eq!(calls[0].out_refund_no, format!("R{}", order.order_no));
    assert_eq!(calls[1].out_refund_no, calls[0].out_refund_no);
    assert_eq!(calls[0].refund_fee, Money::from(8_000));
    assert_eq!(calls[0].total_fee, Money::from(8_000));
    assert_eq!(calls[0].operator_account, "club-op");
    tear_down(rig).await;
}

#[tokio::test]
async fn refund_trigger_is_idempotent_once_settled() {
    let rig = setup().await;
    let order = paid_mixed_order(&rig).await;
    let request = RefundRequest::full(order.order_no.clone());
    rig.refunds.process_refund(&request).await.unwrap();
    assert_eq!(rig.gateway.call_count(), 1);
    let history_len = rig.wallets.history(TEAM, PAYER).await.unwrap().len();

    // Redelivery of the same trigger: no ledger mutation, no gateway call.
    let outcome = rig.refunds.process_refund(&request).await.unwrap();
    assert!(matches!(outcome, RefundOutcome::Skipped(_)));
    assert_eq!(rig.gateway.call_count(), 1);
    assert_eq!(rig.wallets.history(TEAM, PAYER).await.unwrap().len(), history_len);
    assert_eq!(rig.wallets.balance_of(TEAM, PAYER).await.unwrap(), Money::from(10_000));
    tear_down(rig).await;
}

#[tokio::test]
async fn refund_parks_in_failed_state_after_both_attempts() {
    let rig = setup().await;
    let order = paid_mixed_order(&rig).await;
    rig.gateway.enqueue_failure(GatewayError::Timeout);
    rig.gateway.enqueue_failure(GatewayError::Declined { code: "SYSTEMERROR".to_string() });

    let outcome = rig.refunds.process_refund(&RefundRequest::full(order.order_no.clone())).await.unwrap();
    let failed = match outcome {
        RefundOutcome::Failed(order) => order,
        other => panic!("expected a failed refund, got {other:?}"),
    };
    assert_eq!(failed.refund_status, RefundStatusType::FullRefundFailed);
    assert_eq!(failed.refunded_fee, Money::default());
    // The order is left for manual reconciliation, not closed.
    assert_eq!(failed.status, OrderStatusType::Paid);
    assert_eq!(rig.gateway.call_count(), 2);

    // The wallet leg had already run and stays applied.
    assert_eq!(rig.wallets.balance_of(TEAM, PAYER).await.unwrap(), Money::from(10_000));

    // Failed is terminal: the trigger becomes a no-op, with no third gateway attempt.
    let outcome = rig.refunds.process_refund(&RefundRequest::full(order.order_no.clone())).await.unwrap();
    assert!(matches!(outcome, RefundOutcome::Skipped(_)));
    assert_eq!(rig.gateway.call_count(), 2);
    tear_down(rig).await;
}

#[tokio::test]
async fn wallet_only_refund_never_touches_the_gateway() {
    let rig = setup().await;
    rig.wallets.recharge(TEAM, PAYER, Money::from(5_000), OPERATOR, "top up").await.unwrap();
    rig.wallets.gift(TEAM, PAYER, Money::default(), 3, OPERATOR, "punch card").await.unwrap();
    let new_order = NewOrder::new(PAYER, TEAM, Money::from(3_000), PaymentMethod::Wallet)
        .with_credit_fee(Money::from(3_000))
        .with_credit_units(2);
    let order = rig.orders.create_order(new_order).await.unwrap();
    rig.orders.confirm_paid(&order.order_no).await.unwrap();
    assert_eq!(rig.wallets.balance_of(TEAM, PAYER).await.unwrap(), Money::from(2_000));
    assert_eq!(rig.wallets.wallet(TEAM, PAYER).await.unwrap().unwrap().free_units, 1);

    let outcome = rig.refunds.process_refund(&RefundRequest::full(order.order_no.clone())).await.unwrap();
    let refunded = match outcome {
        RefundOutcome::Completed(order) => order,
        other => panic!("expected a completed refund, got {other:?}"),
    };
    assert_eq!(refunded.refund_status, RefundStatusType::FullRefunded);
    assert_eq!(refunded.status, OrderStatusType::Closed);
    assert_eq!(refunded.refunded_fee, Money::default());
    assert_eq!(rig.gateway.call_count(), 0);

    // Balance and punch card restored.
    assert_eq!(rig.wallets.balance_of(TEAM, PAYER).await.unwrap(), Money::from(5_000));
    assert_eq!(rig.wallets.wallet(TEAM, PAYER).await.unwrap().unwrap().free_units, 3);
    tear_down(rig).await;
}

#[tokio::test]
async fn partial_refund_returns_gateway_money_only() {
    let rig = setup().await;
    let order = paid_mixed_order(&rig).await;
    let request = RefundRequest::partial(order.order_no.clone(), Money::from(3_000));

    let outcome = rig.refunds.process_refund(&request).await.unwrap();
    let refunded = match outcome {
        RefundOutcome::Completed(order) => order,
        other => panic!("expected a completed refund, got {other:?}"),
    };
    assert_eq!(refunded.refund_status, RefundStatusType::PartialRefunded);
    assert_eq!(refunded.refunded_fee, Money::from(3_000));
    // A partial refund leaves the order paid and the wallet portion untouched.
    assert_eq!(refunded.status, OrderStatusType::Paid);
    assert_eq!(rig.wallets.balance_of(TEAM, PAYER).await.unwrap(), Money::from(8_000));
    assert_eq!(rig.gateway.call_count(), 1);
    assert_eq!(rig.gateway.calls()[0].refund_fee, Money::from(3_000));
    tear_down(rig).await;
}

#[tokio::test]
async fn partial_refund_cannot_exceed_the_gateway_fee() {
    let rig = setup().await;
    let order = paid_mixed_order(&rig).await;
    let request = RefundRequest::partial(order.order_no.clone(), Money::from(9_000));
    let err = rig.refunds.process_refund(&request).await.unwrap_err();
    assert!(matches!(err, RefundError::AmountExceedsRefundable { .. }));
    assert_eq!(rig.gateway.call_count(), 0);
    tear_down(rig).await;
}

#[tokio::test]
async fn only_paid_orders_are_refundable() {
    let rig = setup().await;
    let new_order = NewOrder::new(PAYER, TEAM, Money::from(1_000), PaymentMethod::GatewayA)
        .with_payment_fee(Money::from(1_000));
    let order = rig.orders.create_order(new_order).await.unwrap();

    let err = rig.refunds.process_refund(&RefundRequest::full(order.order_no.clone())).await.unwrap_err();
    assert!(matches!(err, RefundError::NotRefundable { status: OrderStatusType::WaitPay, .. }));
    assert_eq!(rig.gateway.call_count(), 0);
    tear_down(rig).await;
}

#[tokio::test]
async fn double_enqueued_refund_settles_once() {
    let rig = setup().await;
    let order = paid_mixed_order(&rig).await;

    let (queue, receiver) = TaskQueue::new(8);
    let worker = tokio::spawn(run_refund_worker(
        RefundFlowApi::new(
            rig.db.clone(),
            rig.gateway.clone(),
            GatewayConfig::new("club-op"),
            EventProducers::default(),
        ),
        receiver,
    ));

    // At-least-once delivery: the same trigger lands twice.
    let request = RefundRequest::full(order.order_no.clone());
    queue.enqueue(REFUND_TASK, &request).await.unwrap();
    queue.enqueue(REFUND_TASK, &request).await.unwrap();
    drop(queue);
    worker.await.unwrap();

    let refunded = rig.orders.order(&order.order_no).await.unwrap().unwrap();
    assert_eq!(refunded.refund_status, RefundStatusType::FullRefunded);
    assert_eq!(refunded.refunded_fee, Money::from(8_000));
    // One gateway call and one wallet credit despite two deliveries.
    assert_eq!(rig.gateway.call_count(), 1);
    assert_eq!(rig.wallets.balance_of(TEAM, PAYER).await.unwrap(), Money::from(10_000));
    tear_down(rig).await;
}
