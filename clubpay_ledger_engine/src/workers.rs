use chrono::Duration;
use log::*;
use tokio::task::JoinHandle;

use crate::{
    cle_api::OrderFlowApi,
    db_types::Order,
    events::EventProducers,
    SqliteDatabase,
};

/// Starts the worker that closes orders stuck in `WaitPay`/`WaitConfirm` (a gateway payment that
/// never confirmed, or an abandoned checkout). Do not await the returned `JoinHandle`; it runs
/// indefinitely.
pub fn start_expiry_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    max_age: Duration,
    poll_interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = OrderFlowApi::new(db, producers);
        let mut timer = tokio::time::interval(poll_interval);
        info!("🕰️ Overdue order worker started");
        loop {
            timer.tick().await;
            match api.close_overdue_orders(max_age).await {
                Ok(closed) if closed.is_empty() => {
                    trace!("🕰️ No overdue orders this round");
                },
                Ok(closed) => {
                    info!("🕰️ {} overdue orders closed: {}", closed.len(), order_list(&closed));
                },
                Err(e) => {
                    error!("🕰️ Error closing overdue orders: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] payer: #{} team: #{}", o.order_no, o.payer_id, o.team_id))
        .collect::<Vec<String>>()
        .join(", ")
}
