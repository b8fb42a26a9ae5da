use crate::{
    db_types::SettlementApplication,
    traits::errors::SettlementApiError,
};

/// Read access to settlement applications.
#[allow(async_fn_in_trait)]
pub trait SettlementManagement {
    async fn fetch_settlement(&self, application_id: i64) -> Result<Option<SettlementApplication>, SettlementApiError>;

    /// The team's `Requesting` application, if any. At most one can exist.
    async fn open_settlement_for_team(&self, team_id: i64) -> Result<Option<SettlementApplication>, SettlementApiError>;

    /// All applications ever made by the team, newest first.
    async fn settlements_for_team(&self, team_id: i64) -> Result<Vec<SettlementApplication>, SettlementApiError>;
}
