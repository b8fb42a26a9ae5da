pub mod order_number;
pub mod trade_number;

pub use order_number::{new_order_no, MAX_ORDER_NO_ATTEMPTS};
pub use trade_number::{out_refund_no, out_trade_no, RefundAttempt};
