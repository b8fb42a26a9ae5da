use clubpay_common::Money;
use log::debug;
use sqlx::{Row, SqliteConnection};

use crate::{
    db_types::{CreditPolicy, Wallet, WalletAdjustment},
    traits::WalletApiError,
};

pub async fn fetch_wallet(
    team_id: i64,
    member_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE team_id = $1 AND member_id = $2")
        .bind(team_id)
        .bind(member_id)
        .fetch_optional(conn)
        .await?;
    Ok(wallet)
}

pub async fn fetch_wallet_by_id(wallet_id: i64, conn: &mut SqliteConnection) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE id = $1").bind(wallet_id).fetch_optional(conn).await?;
    Ok(wallet)
}

/// Fetches the wallet for the team/member pair, creating an empty one on first use. The insert
/// ignores conflicts so that two racing callers converge on the same row.
pub async fn fetch_or_create_wallet(
    team_id: i64,
    member_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Wallet, WalletApiError> {
    if let Some(wallet) = fetch_wallet(team_id, member_id, &mut *conn).await? {
        return Ok(wallet);
    }
    let result = sqlx::query(
        "INSERT INTO wallets (team_id, member_id) VALUES ($1, $2) ON CONFLICT (team_id, member_id) DO NOTHING",
    )
    .bind(team_id)
    .bind(member_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() > 0 {
        debug!("📝️ Created wallet for member #{member_id} in team #{team_id}");
    }
    fetch_wallet(team_id, member_id, conn)
        .await?
        .ok_or_else(|| WalletApiError::WalletNotFound(format!("team #{team_id}, member #{member_id}")))
}

/// Applies the balance and free-unit deltas as one guarded `UPDATE`. The credit-limit and unit
/// checks live in the statement's `WHERE` clause, so the check and the write are a single step
/// and cannot interleave with another mutation of the same wallet.
///
/// Returns `(balance_before, balance_after)`. The caller is expected to run this inside the
/// transaction that also writes the ledger entry.
pub async fn adjust_balance(
    wallet_id: i64,
    adjustment: &WalletAdjustment,
    conn: &mut SqliteConnection,
) -> Result<(Money, Money), WalletApiError> {
    let exempt = adjustment.policy == CreditPolicy::Exempt;
    let row = sqlx::query(
        r#"
        UPDATE wallets SET
            balance = balance + $1,
            free_units = free_units + $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
          AND free_units + $2 >= 0
          AND ($4 OR balance + $1 >= -credit_limit)
        RETURNING balance
        "#,
    )
    .bind(adjustment.delta.value())
    .bind(adjustment.units_delta)
    .bind(wallet_id)
    .bind(exempt)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => {
            let balance_after = Money::from(row.try_get::<i64, _>("balance")?);
            Ok((balance_after - adjustment.delta, balance_after))
        },
        None => {
            let wallet = fetch_wallet_by_id(wallet_id, conn)
                .await?
                .ok_or_else(|| WalletApiError::WalletNotFound(format!("wallet #{wallet_id}")))?;
            if wallet.free_units + adjustment.units_delta < 0 {
                Err(WalletApiError::InsufficientUnits {
                    units: wallet.free_units,
                    units_delta: adjustment.units_delta,
                })
            } else {
                Err(WalletApiError::InsufficientCredit {
                    balance: wallet.balance,
                    credit_limit: wallet.credit_limit,
                    delta: adjustment.delta,
                })
            }
        },
    }
}

pub async fn set_credit_limit(
    team_id: i64,
    member_id: i64,
    credit_limit: Money,
    conn: &mut SqliteConnection,
) -> Result<(), WalletApiError> {
    let result = sqlx::query(
        "UPDATE wallets SET credit_limit = $1, updated_at = CURRENT_TIMESTAMP WHERE team_id = $2 AND member_id = $3",
    )
    .bind(credit_limit.value())
    .bind(team_id)
    .bind(member_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        Err(WalletApiError::WalletNotFound(format!("team #{team_id}, member #{member_id}")))
    } else {
        Ok(())
    }
}
