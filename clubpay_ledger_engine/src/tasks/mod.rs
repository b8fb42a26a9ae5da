//! In-process task queue for work that must run off the request path.
//!
//! Delivery is treated as at-least-once: a trigger may reach its handler more than once (the
//! caller may enqueue the same request again after a timeout, or replay on restart), so every
//! handler must be idempotent. The refund handler is; see
//! [`RefundFlowApi::process_refund`](crate::cle_api::RefundFlowApi::process_refund).

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::*;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    cle_api::RefundFlowApi,
    db_types::RefundRequest,
    gateway::GatewayClient,
    traits::LedgerDatabase,
};

/// Task name handled by the refund worker.
pub const REFUND_TASK: &str = "order.refund";

#[derive(Debug, Clone)]
pub struct Task {
    pub id: u64,
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum TaskQueueError {
    #[error("The task queue has shut down")]
    Closed,
    #[error("Could not encode task arguments: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The producer half of the queue. Cheap to clone; hand one to every component that dispatches
/// background work.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<Task>,
    next_id: Arc<AtomicU64>,
}

impl TaskQueue {
    /// Creates the queue and the receiver to hand to a worker loop.
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Task>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (Self { sender, next_id: Arc::new(AtomicU64::new(0)) }, receiver)
    }

    /// Enqueues a task and returns its id.
    pub async fn enqueue<A: Serialize>(&self, name: &str, args: &A) -> Result<u64, TaskQueueError> {
        let args = serde_json::to_value(args)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let task = Task { id, name: name.to_string(), args };
        self.sender.send(task).await.map_err(|_| TaskQueueError::Closed)?;
        debug!("🛠️ Task #{id} [{name}] enqueued");
        Ok(id)
    }
}

/// Drains the queue, processing refund tasks until every producer is gone. Spawn this on the
/// runtime at startup; it never blocks a request path.
pub async fn run_refund_worker<B, G>(api: RefundFlowApi<B, G>, mut tasks: mpsc::Receiver<Task>)
where
    B: LedgerDatabase,
    G: GatewayClient,
{
    info!("🛠️ Refund worker started");
    while let Some(task) = tasks.recv().await {
        if task.name != REFUND_TASK {
            warn!("🛠️ Task #{} has unknown name [{}]. Dropping it", task.id, task.name);
            continue;
        }
        let request: RefundRequest = match serde_json::from_value(task.args) {
            Ok(request) => request,
            Err(e) => {
                error!("🛠️ Task #{} carried malformed refund arguments: {e}", task.id);
                continue;
            },
        };
        match api.process_refund(&request).await {
            Ok(outcome) => {
                debug!(
                    "🛠️ Task #{}: refund for order [{}] settled as {}",
                    task.id,
                    request.order_no,
                    outcome.order().refund_status
                );
            },
            Err(e) => {
                error!("🛠️ Task #{}: refund for order [{}] was rejected: {e}", task.id, request.order_no);
            },
        }
    }
    info!("🛠️ Refund worker shutting down");
}
