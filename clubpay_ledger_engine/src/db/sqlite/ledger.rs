use clubpay_common::Money;
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{LedgerEntry, WalletAdjustment};

/// Writes the audit row for a wallet mutation. Entries are never updated or deleted; this module
/// deliberately exposes no way to do either.
pub async fn insert_entry(
    wallet_id: i64,
    adjustment: &WalletAdjustment,
    balance_before: Money,
    balance_after: Money,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, sqlx::Error> {
    let entry: LedgerEntry = sqlx::query_as(
        r#"
        INSERT INTO ledger_entries
            (wallet_id, delta, units_delta, balance_before, balance_after, reason, order_no, operator, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(wallet_id)
    .bind(adjustment.delta.value())
    .bind(adjustment.units_delta)
    .bind(balance_before.value())
    .bind(balance_after.value())
    .bind(adjustment.reason.to_string())
    .bind(adjustment.order_no.as_ref().map(|o| o.as_str().to_string()))
    .bind(adjustment.operator)
    .bind(adjustment.note.clone())
    .fetch_one(conn)
    .await?;
    trace!(
        "🗃️ Ledger entry #{} for wallet #{wallet_id}: {} -> {} ({})",
        entry.id,
        entry.balance_before,
        entry.balance_after,
        entry.reason
    );
    Ok(entry)
}

/// The wallet's mutation history, newest first.
pub async fn entries_for_wallet(wallet_id: i64, conn: &mut SqliteConnection) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM ledger_entries WHERE wallet_id = $1 ORDER BY id DESC")
        .bind(wallet_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

