use log::*;

use crate::{
    db_types::{NewSettlement, SettlementApplication, SettlementDecision},
    traits::{LedgerDatabase, SettlementApiError, SettlementManagement},
};

/// `SettlementApi` drives the withdrawal approval flow: a club requests its accumulated balance,
/// an administrator approves or disapproves, and the terminal `finish` records the payout
/// against the club wallet. The cash transfer itself happens outside the engine.
#[derive(Debug, Clone)]
pub struct SettlementApi<B> {
    db: B,
}

impl<B> SettlementApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> SettlementApi<B>
where B: LedgerDatabase + SettlementManagement
{
    /// Opens a withdrawal request for the club. At most one request per team may be open; a
    /// second one fails with [`SettlementApiError::ApplicationAlreadyExists`] until the first
    /// is decided.
    pub async fn request(&self, request: NewSettlement) -> Result<SettlementApplication, SettlementApiError> {
        let application = self.db.insert_settlement(&request).await?;
        info!(
            "🏦️ Team #{} requested settlement of {} (application #{})",
            application.team_id, application.requested_balance, application.id
        );
        Ok(application)
    }

    /// `Requesting → Approved`. The actual payout is performed externally; call
    /// [`Self::finish`] once it has been made.
    pub async fn approve(&self, application_id: i64, approver: i64) -> Result<SettlementApplication, SettlementApiError> {
        let application = self.db.decide_settlement(application_id, approver, SettlementDecision::Approve).await?;
        info!("🏦️ Settlement #{application_id} approved by operator #{approver}");
        Ok(application)
    }

    /// `Requesting → Disapproved`.
    pub async fn disapprove(
        &self,
        application_id: i64,
        approver: i64,
        reason: &str,
    ) -> Result<SettlementApplication, SettlementApiError> {
        let decision = SettlementDecision::Disapprove { reason: reason.to_string() };
        let application = self.db.decide_settlement(application_id, approver, decision).await?;
        info!("🏦️ Settlement #{application_id} disapproved by operator #{approver}: {reason}");
        Ok(application)
    }

    /// `Approved → Finished`: the payout has been made; debit the club wallet so the ledger
    /// records the withdrawal.
    pub async fn finish(&self, application_id: i64) -> Result<SettlementApplication, SettlementApiError> {
        let application = self.db.finish_settlement(application_id).await?;
        info!("🏦️ Settlement #{application_id} finished");
        Ok(application)
    }

    pub async fn application(&self, application_id: i64) -> Result<Option<SettlementApplication>, SettlementApiError> {
        self.db.fetch_settlement(application_id).await
    }

    pub async fn open_for_team(&self, team_id: i64) -> Result<Option<SettlementApplication>, SettlementApiError> {
        self.db.open_settlement_for_team(team_id).await
    }

    pub async fn history_for_team(&self, team_id: i64) -> Result<Vec<SettlementApplication>, SettlementApiError> {
        self.db.settlements_for_team(team_id).await
    }
}
