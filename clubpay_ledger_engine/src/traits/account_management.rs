use crate::{
    db_types::{LedgerEntry, Wallet},
    traits::errors::WalletApiError,
};

/// Read access to wallets and their audit trail.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the wallet for the given team/member pair. `None` if it was never created.
    async fn fetch_wallet(&self, team_id: i64, member_id: i64) -> Result<Option<Wallet>, WalletApiError>;

    /// The full mutation history for a wallet, newest first. Empty if the wallet does not exist.
    async fn wallet_history(&self, team_id: i64, member_id: i64) -> Result<Vec<LedgerEntry>, WalletApiError>;
}
