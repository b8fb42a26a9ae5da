use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewSettlement, SettlementApplication, SettlementStatusType},
    traits::SettlementApiError,
};

/// Inserts a new application in `Requesting` state. The partial unique index on
/// `(team_id) WHERE status = 'Requesting'` backs up the request-time check, so a racing second
/// request surfaces as a unique violation.
pub async fn insert_settlement(
    request: &NewSettlement,
    conn: &mut SqliteConnection,
) -> Result<SettlementApplication, SettlementApiError> {
    let result = sqlx::query_as(
        r#"
        INSERT INTO settlements (team_id, requester_id, requested_balance)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(request.team_id)
    .bind(request.requester_id)
    .bind(request.requested_balance.value())
    .fetch_one(conn)
    .await;
    match result {
        Ok(application) => {
            debug!("📝️ Settlement application inserted for team #{}", request.team_id);
            Ok(application)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(SettlementApiError::ApplicationAlreadyExists(request.team_id))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_settlement(
    application_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<SettlementApplication>, sqlx::Error> {
    let application =
        sqlx::query_as("SELECT * FROM settlements WHERE id = $1").bind(application_id).fetch_optional(conn).await?;
    Ok(application)
}

pub async fn open_for_team(
    team_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<SettlementApplication>, sqlx::Error> {
    let application = sqlx::query_as("SELECT * FROM settlements WHERE team_id = $1 AND status = 'Requesting'")
        .bind(team_id)
        .fetch_optional(conn)
        .await?;
    Ok(application)
}

pub async fn list_for_team(
    team_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SettlementApplication>, sqlx::Error> {
    let applications = sqlx::query_as("SELECT * FROM settlements WHERE team_id = $1 ORDER BY id DESC")
        .bind(team_id)
        .fetch_all(conn)
        .await?;
    Ok(applications)
}

async fn transition_error(
    application_id: i64,
    to: SettlementStatusType,
    conn: &mut SqliteConnection,
) -> SettlementApiError {
    match fetch_settlement(application_id, conn).await {
        Ok(Some(application)) => SettlementApiError::InvalidStateTransition { from: application.status, to },
        Ok(None) => SettlementApiError::ApplicationNotFound(application_id),
        Err(e) => SettlementApiError::DatabaseError(e),
    }
}

/// `Requesting → Approved | Disapproved`.
pub async fn decide(
    application_id: i64,
    approver: i64,
    to: SettlementStatusType,
    reject_reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<SettlementApplication, SettlementApiError> {
    let updated: Option<SettlementApplication> = sqlx::query_as(
        r#"
        UPDATE settlements SET
            status = $1,
            approver_id = $2,
            reject_reason = $3,
            decided_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $4 AND status = 'Requesting'
        RETURNING *
        "#,
    )
    .bind(to.to_string())
    .bind(approver)
    .bind(reject_reason)
    .bind(application_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(application) => Ok(application),
        None => Err(transition_error(application_id, to, conn).await),
    }
}

/// `Approved → Finished`. The club wallet debit must run in the same transaction.
pub async fn mark_finished(
    application_id: i64,
    conn: &mut SqliteConnection,
) -> Result<SettlementApplication, SettlementApiError> {
    let updated: Option<SettlementApplication> = sqlx::query_as(
        r#"
        UPDATE settlements SET status = 'Finished', finished_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND status = 'Approved'
        RETURNING *
        "#,
    )
    .bind(application_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(application) => Ok(application),
        None => Err(transition_error(application_id, SettlementStatusType::Finished, conn).await),
    }
}
