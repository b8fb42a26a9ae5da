use crate::{
    cle_api::order_objects::OrderQueryFilter,
    db_types::{Order, OrderNo},
    traits::errors::OrderFlowError,
};

/// Read access to orders.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderFlowError>;

    /// Fetches orders matching the filter, ordered by creation time ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;
}
