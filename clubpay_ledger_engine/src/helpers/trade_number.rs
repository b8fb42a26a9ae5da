use crate::db_types::OrderNo;

/// Which attempt of a gateway refund a trade number identifies.
///
/// The first call and its retry use different prefixes so the gateway cannot mistake the retry
/// for a duplicate submission of the first attempt, while both stay derivable from the order
/// number alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundAttempt {
    First,
    Retry,
}

impl RefundAttempt {
    pub fn prefix(&self) -> &'static str {
        match self {
            RefundAttempt::First => "N",
            RefundAttempt::Retry => "J",
        }
    }
}

/// The trade number sent to the gateway for a refund attempt.
pub fn out_trade_no(order_no: &OrderNo, attempt: RefundAttempt) -> String {
    format!("{}{}", attempt.prefix(), order_no.as_str())
}

/// The refund reference sent alongside the trade number. One per order, shared by both attempts.
pub fn out_refund_no(order_no: &OrderNo) -> String {
    format!("R{}", order_no.as_str())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn attempts_use_distinct_prefixes() {
        let no = OrderNo::from("20240620093005123456".to_string());
        assert_eq!(out_trade_no(&no, RefundAttempt::First), "N20240620093005123456");
        assert_eq!(out_trade_no(&no, RefundAttempt::Retry), "J20240620093005123456");
        assert_eq!(out_refund_no(&no), "R20240620093005123456");
    }
}
