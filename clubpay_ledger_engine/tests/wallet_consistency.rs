use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use clubpay_ledger_engine::{
    db_types::{LedgerReason, Money, WalletAdjustment},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    LedgerDatabase, SqliteDatabase, WalletApi, WalletApiError,
};

const TEAM: i64 = 11;
const MEMBER: i64 = 201;
const OPERATOR: i64 = 7;

async fn setup() -> WalletApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    WalletApi::new(db)
}

async fn tear_down(mut api: WalletApi<SqliteDatabase>) {
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

#[tokio::test]
async fn balance_equals_sum_of_deltas_and_latest_entry() {
    let api = setup().await;
    api.recharge(TEAM, MEMBER, Money::from(10_000), OPERATOR, "top up").await.unwrap();
    api.gift(TEAM, MEMBER, Money::from(5_000), 2, OPERATOR, "welcome gift").await.unwrap();
    let balance = api.manual_adjust(TEAM, MEMBER, Money::from(-3_000), 0, OPERATOR, "correction").await.unwrap();

    assert_eq!(balance, Money::from(12_000));
    assert_eq!(api.balance_of(TEAM, MEMBER).await.unwrap(), Money::from(12_000));

    let history = api.history(TEAM, MEMBER).await.unwrap();
    assert_eq!(history.len(), 3);
    // Newest first: its balance_after must match the live balance.
    assert_eq!(history[0].balance_after, balance);
    let total: Money = history.iter().map(|e| e.delta).sum();
    assert_eq!(total, balance);
    for entry in &history {
        assert_eq!(entry.balance_after, entry.balance_before + entry.delta);
    }
    // Entries chain: each balance_before is the previous balance_after.
    for pair in history.windows(2) {
        assert_eq!(pair[0].balance_before, pair[1].balance_after);
    }

    let wallet = api.wallet(TEAM, MEMBER).await.unwrap().unwrap();
    assert_eq!(wallet.free_units, 2);
    tear_down(api).await;
}

#[tokio::test]
async fn insufficient_credit_rejects_and_writes_nothing() {
    let api = setup().await;
    api.recharge(TEAM, MEMBER, Money::from(2_000), OPERATOR, "seed").await.unwrap();

    let err = api.manual_adjust(TEAM, MEMBER, Money::from(-5_000), 0, OPERATOR, "too much").await.unwrap_err();
    assert!(matches!(err, WalletApiError::InsufficientCredit { .. }));

    // No mutation, no audit row.
    assert_eq!(api.balance_of(TEAM, MEMBER).await.unwrap(), Money::from(2_000));
    assert_eq!(api.history(TEAM, MEMBER).await.unwrap().len(), 1);
    tear_down(api).await;
}

#[tokio::test]
async fn credit_limit_boundary_is_inclusive() {
    let api = setup().await;
    api.recharge(TEAM, MEMBER, Money::from(2_000), OPERATOR, "seed").await.unwrap();
    api.set_credit_limit(TEAM, MEMBER, Money::from(3_000)).await.unwrap();

    // 2000 - 5000 = -3000 = -credit_limit: exactly at the limit is allowed.
    let balance = api.manual_adjust(TEAM, MEMBER, Money::from(-5_000), 0, OPERATOR, "to the limit").await.unwrap();
    assert_eq!(balance, Money::from(-3_000));

    // One more fen is not.
    let err = api.manual_adjust(TEAM, MEMBER, Money::from(-1), 0, OPERATOR, "over").await.unwrap_err();
    assert!(matches!(err, WalletApiError::InsufficientCredit { .. }));
    assert_eq!(api.balance_of(TEAM, MEMBER).await.unwrap(), Money::from(-3_000));
    tear_down(api).await;
}

#[tokio::test]
async fn system_reversals_bypass_the_credit_check() {
    let api = setup().await;
    api.recharge(TEAM, MEMBER, Money::from(1_000), OPERATOR, "seed").await.unwrap();
    api.set_credit_limit(TEAM, MEMBER, Money::from(1_000)).await.unwrap();
    api.manual_adjust(TEAM, MEMBER, Money::from(-2_000), 0, OPERATOR, "to the limit").await.unwrap();

    // The limit is exhausted; an enforced debit fails but an exempt reversal still lands.
    let enforced = WalletAdjustment::new(Money::from(-100), LedgerReason::Settlement);
    assert!(matches!(
        api.adjust(TEAM, MEMBER, enforced).await.unwrap_err(),
        WalletApiError::InsufficientCredit { .. }
    ));
    let reversal = WalletAdjustment::new(Money::from(-100), LedgerReason::Settlement).exempt_from_credit_check();
    let balance = api.adjust(TEAM, MEMBER, reversal).await.unwrap();
    assert_eq!(balance, Money::from(-1_100));
    tear_down(api).await;
}

#[tokio::test]
async fn free_units_cannot_go_negative() {
    let api = setup().await;
    api.gift(TEAM, MEMBER, Money::default(), 2, OPERATOR, "punch card").await.unwrap();

    let err = api.manual_adjust(TEAM, MEMBER, Money::default(), -3, OPERATOR, "use three").await.unwrap_err();
    assert!(matches!(err, WalletApiError::InsufficientUnits { units: 2, units_delta: -3 }));

    api.manual_adjust(TEAM, MEMBER, Money::default(), -2, OPERATOR, "use two").await.unwrap();
    assert_eq!(api.wallet(TEAM, MEMBER).await.unwrap().unwrap().free_units, 0);
    tear_down(api).await;
}

#[tokio::test]
async fn debit_before_credit_rejects_exactly_one() {
    let api = setup().await;
    api.recharge(TEAM, MEMBER, Money::from(2_000), OPERATOR, "seed").await.unwrap();

    // Pinned serialization: the debit runs first against balance 20.00 and must be rejected;
    // the credit then lands.
    let err = api.manual_adjust(TEAM, MEMBER, Money::from(-5_000), 0, OPERATOR, "debit").await.unwrap_err();
    assert!(matches!(err, WalletApiError::InsufficientCredit { .. }));
    let balance = api.manual_adjust(TEAM, MEMBER, Money::from(3_000), 0, OPERATOR, "credit").await.unwrap();
    assert_eq!(balance, Money::from(5_000));
    assert_eq!(api.history(TEAM, MEMBER).await.unwrap().len(), 2);
    tear_down(api).await;
}

#[tokio::test]
async fn concurrent_mutations_keep_the_ledger_consistent() {
    let api = setup().await;
    api.recharge(TEAM, MEMBER, Money::from(2_000), OPERATOR, "seed").await.unwrap();

    let debit_api = api.clone();
    let credit_api = api.clone();
    let debit = tokio::spawn(async move {
        debit_api.manual_adjust(TEAM, MEMBER, Money::from(-5_000), 0, OPERATOR, "debit").await
    });
    let credit = tokio::spawn(async move {
        credit_api.manual_adjust(TEAM, MEMBER, Money::from(3_000), 0, OPERATOR, "credit").await
    });
    let results = [debit.await.unwrap(), credit.await.unwrap()];

    // The serialization order is not pinned, but in every admissible interleaving any failure
    // is InsufficientCredit, failed calls write no ledger row, and the balance matches the
    // applied deltas.
    let mut successes = 0;
    for result in results {
        match result {
            Ok(_) => successes += 1,
            Err(WalletApiError::InsufficientCredit { .. }) => {},
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    let history = api.history(TEAM, MEMBER).await.unwrap();
    assert_eq!(history.len(), 1 + successes);
    let balance = api.balance_of(TEAM, MEMBER).await.unwrap();
    let total: Money = history.iter().map(|e| e.delta).sum();
    assert_eq!(total, balance);
    assert_eq!(history[0].balance_after, balance);
    // Either the debit was first and rejected (balance 50.00) or the credit landed first and
    // both applied (balance 0).
    match successes {
        1 => assert_eq!(balance, Money::from(5_000)),
        2 => assert_eq!(balance, Money::default()),
        n => panic!("expected 1 or 2 successful mutations, got {n}"),
    }
    tear_down(api).await;
}
