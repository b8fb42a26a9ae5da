use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler, EventProducer, Handler, OrderPaidEvent, RefundCompletedEvent, RefundFailedEvent,
};

/// The producer ends of every registered hook. Cloned into each API that fires events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub refund_completed_producer: Vec<EventProducer<RefundCompletedEvent>>,
    pub refund_failed_producer: Vec<EventProducer<RefundFailedEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_refund_completed: Option<EventHandler<RefundCompletedEvent>>,
    pub on_refund_failed: Option<EventHandler<RefundFailedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_completed = hooks.on_refund_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_failed = hooks.on_refund_failed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_refund_completed, on_refund_failed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_completed {
            result.refund_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_failed {
            result.refund_failed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

/// User-supplied hook closures, one per event type.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_refund_completed: Option<Handler<RefundCompletedEvent>>,
    pub on_refund_failed: Option<Handler<RefundFailedEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_refund_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_refund_completed = Some(Arc::new(f));
        self
    }

    pub fn on_refund_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_refund_failed = Some(Arc::new(f));
        self
    }
}
