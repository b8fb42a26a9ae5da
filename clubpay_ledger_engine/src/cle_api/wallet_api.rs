use clubpay_common::Money;
use log::debug;

use crate::{
    db_types::{LedgerEntry, LedgerReason, Wallet, WalletAdjustment},
    traits::{AccountManagement, LedgerDatabase, WalletApiError},
};

/// `WalletApi` exposes wallet balances, the audit trail, and the staff-facing balance operations
/// (recharge, gift, manual adjustment). Order payments and refunds go through the order and
/// refund flows instead; they share the same underlying mutation.
#[derive(Debug, Clone)]
pub struct WalletApi<B> {
    db: B,
}

impl<B> WalletApi<B> {
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

impl<B> WalletApi<B>
where B: LedgerDatabase + AccountManagement
{
    /// The current balance for the member's wallet. A wallet that was never created reports a
    /// zero balance.
    pub async fn balance_of(&self, team_id: i64, member_id: i64) -> Result<Money, WalletApiError> {
        let wallet = self.db.fetch_wallet(team_id, member_id).await?;
        Ok(wallet.map(|w| w.balance).unwrap_or_default())
    }

    pub async fn wallet(&self, team_id: i64, member_id: i64) -> Result<Option<Wallet>, WalletApiError> {
        self.db.fetch_wallet(team_id, member_id).await
    }

    /// The wallet's full mutation history, newest first.
    pub async fn history(&self, team_id: i64, member_id: i64) -> Result<Vec<LedgerEntry>, WalletApiError> {
        self.db.wallet_history(team_id, member_id).await
    }

    /// A member top-up. The amount must be positive.
    pub async fn recharge(
        &self,
        team_id: i64,
        member_id: i64,
        amount: Money,
        operator: i64,
        note: &str,
    ) -> Result<Money, WalletApiError> {
        if !amount.is_positive() {
            return Err(WalletApiError::InvalidAdjustment(format!("recharge amount must be positive, got {amount}")));
        }
        let adjustment =
            WalletAdjustment::new(amount, LedgerReason::Recharge).by_operator(operator).with_note(note);
        let balance = self.db.adjust_wallet(team_id, member_id, adjustment).await?;
        debug!("💰️ Member #{member_id} in team #{team_id} recharged {amount}; balance is now {balance}");
        Ok(balance)
    }

    /// A club grant of balance and/or free units. Neither may be negative.
    pub async fn gift(
        &self,
        team_id: i64,
        member_id: i64,
        amount: Money,
        units: i64,
        operator: i64,
        note: &str,
    ) -> Result<Money, WalletApiError> {
        if amount.is_negative() || units < 0 {
            return Err(WalletApiError::InvalidAdjustment(format!(
                "gifts cannot take anything away: {amount}, {units} units"
            )));
        }
        if amount.is_zero() && units == 0 {
            return Err(WalletApiError::InvalidAdjustment("empty gift".to_string()));
        }
        let adjustment = WalletAdjustment::new(amount, LedgerReason::Gift)
            .with_units(units)
            .by_operator(operator)
            .with_note(note);
        let balance = self.db.adjust_wallet(team_id, member_id, adjustment).await?;
        debug!("💰️ Member #{member_id} in team #{team_id} received a gift of {amount} and {units} units");
        Ok(balance)
    }

    /// A staff correction in either direction. Subject to the credit limit like any ordinary
    /// mutation.
    pub async fn manual_adjust(
        &self,
        team_id: i64,
        member_id: i64,
        delta: Money,
        units_delta: i64,
        operator: i64,
        note: &str,
    ) -> Result<Money, WalletApiError> {
        let adjustment = WalletAdjustment::new(delta, LedgerReason::ManualAdjust)
            .with_units(units_delta)
            .by_operator(operator)
            .with_note(note);
        let balance = self.db.adjust_wallet(team_id, member_id, adjustment).await?;
        debug!("💰️ Member #{member_id} in team #{team_id} adjusted by {delta}; balance is now {balance}");
        Ok(balance)
    }

    pub async fn set_credit_limit(&self, team_id: i64, member_id: i64, credit_limit: Money) -> Result<(), WalletApiError> {
        self.db.set_credit_limit(team_id, member_id, credit_limit).await
    }

    /// Low-level escape hatch used by back-office tooling; prefer the named operations above.
    pub async fn adjust(&self, team_id: i64, member_id: i64, adjustment: WalletAdjustment) -> Result<Money, WalletApiError> {
        self.db.adjust_wallet(team_id, member_id, adjustment).await
    }
}
