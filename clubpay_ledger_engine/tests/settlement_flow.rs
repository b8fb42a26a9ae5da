use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use clubpay_ledger_engine::{
    db_types::{
        LedgerReason, Money, NewOrder, NewSettlement, PaymentMethod, SettlementStatusType,
        CLUB_WALLET_MEMBER,
    },
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    LedgerDatabase, OrderFlowApi, SettlementApi, SettlementApiError, SqliteDatabase, WalletApi,
};

const TEAM: i64 = 5;
const PAYER: i64 = 31;
const REQUESTER: i64 = 8;
const APPROVER: i64 = 99;

struct TestRig {
    db: SqliteDatabase,
    settlements: SettlementApi<SqliteDatabase>,
    wallets: WalletApi<SqliteDatabase>,
    orders: OrderFlowApi<SqliteDatabase>,
}

async fn setup() -> TestRig {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    TestRig {
        db: db.clone(),
        settlements: SettlementApi::new(db.clone()),
        wallets: WalletApi::new(db.clone()),
        orders: OrderFlowApi::new(db, EventProducers::default()),
    }
}

async fn tear_down(mut rig: TestRig) {
    let url = rig.db.url().to_string();
    if let Err(e) = rig.db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

/// Runs an order through payment and finish so the club wallet accumulates `amount`.
async fn accumulate_club_balance(rig: &TestRig, amount: Money) {
    rig.wallets.recharge(TEAM, PAYER, amount, 1, "top up").await.unwrap();
    let order = rig
        .orders
        .create_order(NewOrder::new(PAYER, TEAM, amount, PaymentMethod::Wallet).with_credit_fee(amount))
        .await
        .unwrap();
    rig.orders.confirm_paid(&order.order_no).await.unwrap();
    rig.orders.finish_order(&order.order_no).await.unwrap();
}

#[tokio::test]
async fn one_open_application_per_team() {
    let rig = setup().await;
    accumulate_club_balance(&rig, Money::from(20_000)).await;

    let first = rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(5_000))).await.unwrap();
    assert_eq!(first.status, SettlementStatusType::Requesting);

    let err = rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(1_000))).await.unwrap_err();
    assert!(matches!(err, SettlementApiError::ApplicationAlreadyExists(t) if t == TEAM));

    // Once decided, a new request goes through.
    rig.settlements.approve(first.id, APPROVER).await.unwrap();
    let second = rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(1_000))).await.unwrap();
    assert_eq!(second.status, SettlementStatusType::Requesting);
    tear_down(rig).await;
}

#[tokio::test]
async fn requests_are_capped_by_the_club_balance() {
    let rig = setup().await;
    accumulate_club_balance(&rig, Money::from(3_000)).await;

    let err = rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(5_000))).await.unwrap_err();
    assert!(matches!(err, SettlementApiError::InsufficientBalance { .. }));

    let err = rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::default())).await.unwrap_err();
    assert!(matches!(err, SettlementApiError::InvalidRequest(_)));
    tear_down(rig).await;
}

#[tokio::test]
async fn finished_settlement_debits_the_club_wallet() {
    let rig = setup().await;
    accumulate_club_balance(&rig, Money::from(20_000)).await;

    let application =
        rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(12_000))).await.unwrap();
    let approved = rig.settlements.approve(application.id, APPROVER).await.unwrap();
    assert_eq!(approved.status, SettlementStatusType::Approved);
    assert_eq!(approved.approver_id, Some(APPROVER));
    assert!(approved.decided_at.is_some());
    // Approval records the decision only; the balance moves when the payout is finished.
    assert_eq!(rig.wallets.balance_of(TEAM, CLUB_WALLET_MEMBER).await.unwrap(), Money::from(20_000));

    let finished = rig.settlements.finish(application.id).await.unwrap();
    assert_eq!(finished.status, SettlementStatusType::Finished);
    assert!(finished.finished_at.is_some());
    assert_eq!(rig.wallets.balance_of(TEAM, CLUB_WALLET_MEMBER).await.unwrap(), Money::from(8_000));

    // The withdrawal is on the club's audit trail.
    let history = rig.wallets.history(TEAM, CLUB_WALLET_MEMBER).await.unwrap();
    assert_eq!(history[0].delta, Money::from(-12_000));
    assert_eq!(history[0].reason, LedgerReason::Settlement);
    assert_eq!(history[0].operator, APPROVER);

    let err = rig.settlements.finish(application.id).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementApiError::InvalidStateTransition { from: SettlementStatusType::Finished, .. }
    ));
    tear_down(rig).await;
}

#[tokio::test]
async fn disapproval_frees_the_team_for_a_new_request() {
    let rig = setup().await;
    accumulate_club_balance(&rig, Money::from(10_000)).await;

    let application =
        rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(10_000))).await.unwrap();
    let rejected =
        rig.settlements.disapprove(application.id, APPROVER, "event costs not yet booked").await.unwrap();
    assert_eq!(rejected.status, SettlementStatusType::Disapproved);
    assert_eq!(rejected.reject_reason.as_deref(), Some("event costs not yet booked"));

    // No money moved, and the team can request again.
    assert_eq!(rig.wallets.balance_of(TEAM, CLUB_WALLET_MEMBER).await.unwrap(), Money::from(10_000));
    rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(4_000))).await.unwrap();

    // A disapproved application cannot be finished.
    let err = rig.settlements.finish(application.id).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementApiError::InvalidStateTransition { from: SettlementStatusType::Disapproved, .. }
    ));
    tear_down(rig).await;
}

#[tokio::test]
async fn unknown_applications_are_reported() {
    let rig = setup().await;
    let err = rig.settlements.approve(4_242, APPROVER).await.unwrap_err();
    assert!(matches!(err, SettlementApiError::ApplicationNotFound(4_242)));
    assert!(rig.settlements.application(4_242).await.unwrap().is_none());
    tear_down(rig).await;
}

#[tokio::test]
async fn team_history_is_newest_first() {
    let rig = setup().await;
    accumulate_club_balance(&rig, Money::from(10_000)).await;

    let first = rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(2_000))).await.unwrap();
    rig.settlements.disapprove(first.id, APPROVER, "too early").await.unwrap();
    let second = rig.settlements.request(NewSettlement::new(TEAM, REQUESTER, Money::from(3_000))).await.unwrap();

    let history = rig.settlements.history_for_team(TEAM).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);

    let open = rig.settlements.open_for_team(TEAM).await.unwrap().unwrap();
    assert_eq!(open.id, second.id);
    tear_down(rig).await;
}
