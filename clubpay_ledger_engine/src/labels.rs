//! User-facing display names for the domain enums.
//!
//! The domain types carry no presentation data; the notification and web layers look labels up
//! here. Labels are the simplified-Chinese strings shown in the club app.

use crate::db_types::{
    LedgerReason, OrderStatusType, PaymentMethod, RefundStatusType, SettlementStatusType,
};

pub fn order_status_label(status: OrderStatusType) -> &'static str {
    match status {
        OrderStatusType::WaitPay => "待支付",
        OrderStatusType::WaitConfirm => "待确认",
        OrderStatusType::Paid => "已支付",
        OrderStatusType::Finished => "已完成",
        OrderStatusType::CancelledByUser => "已取消",
        OrderStatusType::Closed => "已关闭",
    }
}

pub fn refund_status_label(status: RefundStatusType) -> &'static str {
    match status {
        RefundStatusType::NoRefund => "未退款",
        RefundStatusType::PartialRefunding => "部分退款中",
        RefundStatusType::FullRefunding => "全额退款中",
        RefundStatusType::PartialRefunded => "部分退款成功",
        RefundStatusType::FullRefunded => "全额退款成功",
        RefundStatusType::PartialRefundFailed => "部分退款失败",
        RefundStatusType::FullRefundFailed => "全额退款失败",
    }
}

pub fn ledger_reason_label(reason: LedgerReason) -> &'static str {
    match reason {
        LedgerReason::Settlement => "结算",
        LedgerReason::ManualAdjust => "手动调整",
        LedgerReason::Recharge => "充值",
        LedgerReason::Gift => "赠送",
    }
}

pub fn payment_method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Wallet => "钱包支付",
        PaymentMethod::GatewayA => "微信支付",
        PaymentMethod::GatewayB => "支付宝支付",
    }
}

pub fn settlement_status_label(status: SettlementStatusType) -> &'static str {
    match status {
        SettlementStatusType::Requesting => "申请中",
        SettlementStatusType::Approved => "已批准",
        SettlementStatusType::Disapproved => "已驳回",
        SettlementStatusType::Finished => "已完成",
    }
}
