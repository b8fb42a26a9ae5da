//! The narrow seam to the external payment gateway.
//!
//! The engine only ever talks to the gateway through [`GatewayClient`]; transport, signing and
//! session handling belong to the integration crate that implements the trait. Refund calls are
//! bounded by the configured timeout and never run inside a database transaction.

use std::{env, time::Duration};

use clubpay_common::{Money, Secret};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// One refund attempt as submitted to the gateway. `out_trade_no` differs between the first
/// attempt and the retry (see [`crate::helpers::RefundAttempt`]); everything else is identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefundRequest {
    pub out_trade_no: String,
    pub out_refund_no: String,
    /// The gateway-paid portion of the original order.
    pub total_fee: Money,
    /// The amount to refund in this call.
    pub refund_fee: Money,
    pub operator_account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefundReceipt {
    pub result_code: String,
    pub gateway_trade_no: String,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway call timed out")]
    Timeout,
    #[error("Gateway declined the refund: {code}")]
    Declined { code: String },
    #[error("Gateway transport error: {0}")]
    Transport(String),
}

/// Implemented by gateway integrations (and by the scripted test double). A non-success result
/// is retryable exactly once, with the alternate trade number; the refund flow owns that policy.
#[allow(async_fn_in_trait)]
pub trait GatewayClient {
    async fn refund(&self, request: &GatewayRefundRequest) -> Result<GatewayRefundReceipt, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// The merchant operator account submitted with refund calls.
    pub operator_account: String,
    pub api_key: Secret<String>,
    /// Upper bound on a single gateway call.
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new<S: Into<String>>(operator_account: S) -> Self {
        Self {
            operator_account: operator_account.into(),
            api_key: Secret::default(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, api_key: Secret<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads `CLUBPAY_GATEWAY_ACCOUNT`, `CLUBPAY_GATEWAY_KEY` and
    /// `CLUBPAY_GATEWAY_TIMEOUT_SECS`, falling back to an empty account and the default timeout.
    pub fn from_env() -> Self {
        let operator_account = env::var("CLUBPAY_GATEWAY_ACCOUNT").unwrap_or_default();
        let api_key = Secret::new(env::var("CLUBPAY_GATEWAY_KEY").unwrap_or_default());
        let timeout = env::var("CLUBPAY_GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT);
        Self { operator_account, api_key, timeout }
    }
}
