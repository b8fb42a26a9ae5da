use clubpay_common::Money;
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    cle_api::order_objects::OrderQueryFilter,
    db_types::{NewOrder, Order, OrderNo, OrderStatusType, RefundStatusType},
    traits::OrderFlowError,
};

/// Inserts a new order in `WaitPay` state under the given order number.
pub async fn insert_order(
    order: &NewOrder,
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let result = sqlx::query_as(
        r#"
        INSERT INTO orders
            (order_no, payer_id, team_id, total_fee, credit_fee, payment_fee, discount_fee, credit_units,
             payment_method, memo)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(order_no.as_str())
    .bind(order.payer_id)
    .bind(order.team_id)
    .bind(order.total_fee.value())
    .bind(order.credit_fee.value())
    .bind(order.payment_fee.value())
    .bind(order.discount_fee.value())
    .bind(order.credit_units)
    .bind(order.payment_method.to_string())
    .bind(order.memo.clone())
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => {
            debug!("📝️ Order [{order_no}] inserted");
            Ok(order)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(OrderFlowError::DuplicateOrder(order_no.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_no(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_no = $1").bind(order_no.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn order_no_exists(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM orders WHERE order_no = $1").bind(order_no.as_str()).fetch_optional(conn).await?;
    Ok(row.is_some())
}

/// Builds the error for a transition whose guarded UPDATE matched no row: either the order does
/// not exist, or it is in a state the transition does not accept.
async fn transition_error(
    order_no: &OrderNo,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> OrderFlowError {
    match fetch_order_by_no(order_no, conn).await {
        Ok(Some(order)) => OrderFlowError::InvalidStateTransition { from: order.status, to },
        Ok(None) => OrderFlowError::OrderNotFound(order_no.clone()),
        Err(e) => OrderFlowError::DatabaseError(e),
    }
}

/// `WaitPay → WaitConfirm`.
pub async fn mark_awaiting_confirm(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET status = 'WaitConfirm', updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $1 AND status = 'WaitPay'
        RETURNING *
        "#,
    )
    .bind(order_no.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(order) => Ok(order),
        None => Err(transition_error(order_no, OrderStatusType::WaitConfirm, conn).await),
    }
}

/// `{WaitPay, WaitConfirm} → Paid`. The wallet debit, if any, is the caller's responsibility and
/// must run in the same transaction.
pub async fn mark_paid(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET status = 'Paid', paid_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $1 AND status IN ('WaitPay', 'WaitConfirm')
        RETURNING *
        "#,
    )
    .bind(order_no.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(order) => Ok(order),
        None => Err(transition_error(order_no, OrderStatusType::Paid, conn).await),
    }
}

/// `WaitPay → CancelledByUser`.
pub async fn mark_cancelled(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET status = 'CancelledByUser', cancelled_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $1 AND status = 'WaitPay'
        RETURNING *
        "#,
    )
    .bind(order_no.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(order) => Ok(order),
        None => Err(transition_error(order_no, OrderStatusType::CancelledByUser, conn).await),
    }
}

/// `Paid → Finished`. The club credit must run in the same transaction.
pub async fn mark_finished(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET status = 'Finished', finished_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $1 AND status = 'Paid'
        RETURNING *
        "#,
    )
    .bind(order_no.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(order) => Ok(order),
        None => Err(transition_error(order_no, OrderStatusType::Finished, conn).await),
    }
}

/// Closes every order still waiting for payment or confirmation after `max_age_secs`. Returns
/// the orders that were closed.
pub async fn close_overdue(max_age_secs: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let closed = sqlx::query_as(
        r#"
        UPDATE orders SET status = 'Closed', updated_at = CURRENT_TIMESTAMP
        WHERE status IN ('WaitPay', 'WaitConfirm')
          AND created_at < datetime('now', '-' || $1 || ' seconds')
        RETURNING *
        "#,
    )
    .bind(max_age_secs)
    .fetch_all(conn)
    .await?;
    Ok(closed)
}

/// `NoRefund → *Refunding`, gated on the order being `Paid`. Returns `None` when the guard does
/// not match; the caller distinguishes the reasons.
pub async fn mark_refunding(
    order_no: &OrderNo,
    to: RefundStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let updated = sqlx::query_as(
        r#"
        UPDATE orders SET refund_status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $2 AND status = 'Paid' AND refund_status = 'NoRefund'
        RETURNING *
        "#,
    )
    .bind(to.to_string())
    .bind(order_no.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// `*Refunding → *Refunded`. Accumulates the gateway-refunded amount; a full refund also closes
/// the order.
pub async fn mark_refunded(
    order_no: &OrderNo,
    to: RefundStatusType,
    gateway_refunded: Money,
    close_order: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let updated = sqlx::query_as(
        r#"
        UPDATE orders SET
            refund_status = $1,
            refunded_fee = refunded_fee + $2,
            status = CASE WHEN $3 THEN 'Closed' ELSE status END,
            updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $4 AND refund_status IN ('PartialRefunding', 'FullRefunding')
        RETURNING *
        "#,
    )
    .bind(to.to_string())
    .bind(gateway_refunded.value())
    .bind(close_order)
    .bind(order_no.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// `*Refunding → *RefundFailed`.
pub async fn mark_refund_failed(
    order_no: &OrderNo,
    to: RefundStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let updated = sqlx::query_as(
        r#"
        UPDATE orders SET refund_status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $2 AND refund_status IN ('PartialRefunding', 'FullRefunding')
        RETURNING *
        "#,
    )
    .bind(to.to_string())
    .bind(order_no.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE 1 = 1");
    if let Some(order_no) = &query.order_no {
        builder.push(" AND order_no = ").push_bind(order_no.as_str().to_string());
    }
    if let Some(payer_id) = query.payer_id {
        builder.push(" AND payer_id = ").push_bind(payer_id);
    }
    if let Some(team_id) = query.team_id {
        builder.push(" AND team_id = ").push_bind(team_id);
    }
    if let Some(statuses) = &query.status {
        builder.push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.to_string());
        }
        builder.push(")");
    }
    if let Some(since) = query.since {
        builder.push(" AND created_at >= datetime(").push_bind(since.to_rfc3339()).push(")");
    }
    if let Some(until) = query.until {
        builder.push(" AND created_at <= datetime(").push_bind(until.to_rfc3339()).push(")");
    }
    builder.push(" ORDER BY created_at ASC");
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}
