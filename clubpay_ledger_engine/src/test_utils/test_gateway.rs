use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use log::debug;

use crate::gateway::{GatewayClient, GatewayError, GatewayRefundRequest, GatewayRefundReceipt};

/// A scripted [`GatewayClient`] double. Outcomes are consumed in the order they were enqueued;
/// once the script runs dry, every further call succeeds with a synthetic gateway trade number.
/// Every call is recorded for assertions.
#[derive(Clone, Default)]
pub struct TestGateway {
    script: Arc<Mutex<VecDeque<Result<GatewayRefundReceipt, GatewayError>>>>,
    calls: Arc<Mutex<Vec<GatewayRefundRequest>>>,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_success(&self, gateway_trade_no: &str) {
        let receipt = GatewayRefundReceipt {
            result_code: "SUCCESS".to_string(),
            gateway_trade_no: gateway_trade_no.to_string(),
        };
        self.script.lock().unwrap().push_back(Ok(receipt));
    }

    pub fn enqueue_failure(&self, error: GatewayError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Every request the engine has made so far, in order.
    pub fn calls(&self) -> Vec<GatewayRefundRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl GatewayClient for TestGateway {
    async fn refund(&self, request: &GatewayRefundRequest) -> Result<GatewayRefundReceipt, GatewayError> {
        debug!("🧪️ Gateway refund called: {} ({} of {})", request.out_trade_no, request.refund_fee, request.total_fee);
        self.calls.lock().unwrap().push(request.clone());
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(GatewayRefundReceipt {
                result_code: "SUCCESS".to_string(),
                gateway_trade_no: format!("gw-{}", request.out_trade_no),
            }),
        }
    }
}
