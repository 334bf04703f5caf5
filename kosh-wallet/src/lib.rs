//! Wallet service: per-user spendable balances.
//!
//! Balance mutations run under the wallet's row-level lock and inside a
//! store transaction; two concurrent debits on the same wallet serialize and
//! the loser observes the post-commit balance. Every mutation is idempotent
//! on a caller-supplied key.

pub mod mutation;
pub mod state;

use chrono::Utc;
use uuid::Uuid;

use kosh_common::model::{Hold, Wallet, WalletMutation, WalletStatus};
use kosh_common::{Currency, Paise, Result};
use kosh_store::Store;

pub use mutation::{apply_credit, apply_debit, derived_balance, invariants_hold};

#[derive(Clone)]
pub struct WalletService {
    store: Store,
}

/// Spendable view returned by balance queries.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BalanceView {
    pub balance: Paise,
    pub available_balance: Paise,
    pub currency: Currency,
}

impl WalletService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates a pending wallet and provisions its mirror liability account
    /// in the ledger, atomically.
    pub async fn create(&self, user_id: Uuid, currency: Currency) -> Result<Wallet> {
        self.store
            .write(|t| {
                let id = Uuid::new_v4();
                let account = kosh_ledger::chart::create_wallet_account(t, id, currency)?;
                let wallet = Wallet {
                    id,
                    user_id,
                    currency,
                    balance: Paise::ZERO,
                    available_balance: Paise::ZERO,
                    status: WalletStatus::Pending,
                    ledger_account_id: account.id,
                    status_reason: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                t.wallets.insert(wallet.id, wallet.clone());
                tracing::info!(wallet = %wallet.id, user = %user_id, "wallet created");
                Ok(wallet)
            })
            .await
    }

    pub async fn activate(&self, id: Uuid) -> Result<Wallet> {
        self.transition(id, WalletStatus::Active, None).await
    }

    pub async fn freeze(&self, id: Uuid, reason: String) -> Result<Wallet> {
        self.transition(id, WalletStatus::Frozen, Some(reason)).await
    }

    pub async fn unfreeze(&self, id: Uuid) -> Result<Wallet> {
        self.transition(id, WalletStatus::Active, None).await
    }

    pub async fn close(&self, id: Uuid, reason: String) -> Result<Wallet> {
        self.transition(id, WalletStatus::Closed, Some(reason)).await
    }

    async fn transition(
        &self,
        id: Uuid,
        to: WalletStatus,
        reason: Option<String>,
    ) -> Result<Wallet> {
        let _guard = self.store.wallet_locks().acquire(id).await?;
        self.store
            .write(|t| {
                let wallet = t.require_wallet_mut(id)?;
                state::ensure_transition(wallet.status, to)?;
                wallet.status = to;
                wallet.status_reason = reason;
                wallet.updated_at = Utc::now();
                tracing::info!(wallet = %id, status = ?to, "wallet transitioned");
                Ok(wallet.clone())
            })
            .await
    }

    pub async fn debit(
        &self,
        id: Uuid,
        amount: Paise,
        currency: Currency,
        idem_key: &str,
    ) -> Result<WalletMutation> {
        let _guard = self.store.wallet_locks().acquire(id).await?;
        self.store
            .write(|t| mutation::apply_debit(t, id, amount, currency, idem_key))
            .await
    }

    pub async fn credit(
        &self,
        id: Uuid,
        amount: Paise,
        currency: Currency,
        idem_key: &str,
    ) -> Result<WalletMutation> {
        let _guard = self.store.wallet_locks().acquire(id).await?;
        self.store
            .write(|t| mutation::apply_credit(t, id, amount, currency, idem_key))
            .await
    }

    pub async fn hold(&self, id: Uuid, amount: Paise) -> Result<Hold> {
        let _guard = self.store.wallet_locks().acquire(id).await?;
        self.store
            .write(|t| mutation::place_hold(t, id, amount))
            .await
    }

    pub async fn release(&self, wallet_id: Uuid, hold_id: Uuid) -> Result<Hold> {
        let _guard = self.store.wallet_locks().acquire(wallet_id).await?;
        self.store
            .write(|t| mutation::release_hold(t, hold_id))
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Wallet> {
        self.store.read(|t| t.require_wallet(id).cloned()).await
    }

    pub async fn get_balance(&self, id: Uuid) -> Result<BalanceView> {
        self.store
            .read(|t| {
                let wallet = t.require_wallet(id)?;
                Ok(BalanceView {
                    balance: wallet.balance,
                    available_balance: wallet.available_balance,
                    currency: wallet.currency,
                })
            })
            .await
    }

    pub async fn wallets_for_user(&self, user_id: Uuid) -> Vec<Wallet> {
        self.store
            .read(|t| {
                let mut wallets: Vec<Wallet> = t
                    .wallets
                    .values()
                    .filter(|w| w.user_id == user_id)
                    .cloned()
                    .collect();
                wallets.sort_by_key(|w| w.created_at);
                wallets
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kosh_common::CoreError;

    async fn active_wallet(store: &Store, balance: i64) -> Wallet {
        let service = WalletService::new(store.clone());
        let wallet = service.create(Uuid::new_v4(), Currency::Inr).await.unwrap();
        let wallet = service.activate(wallet.id).await.unwrap();
        if balance > 0 {
            service
                .credit(wallet.id, Paise(balance), Currency::Inr, "seed")
                .await
                .unwrap();
        }
        service.get(wallet.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_provisions_ledger_account() {
        let store = Store::new();
        let wallet = active_wallet(&store, 0).await;
        let account = store
            .read(|t| t.accounts.get(&wallet.ledger_account_id).cloned())
            .await;
        assert!(account.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_debits_linearize() {
        let store = Store::new();
        let wallet = active_wallet(&store, 1000).await;
        let service = WalletService::new(store.clone());

        let s1 = service.clone();
        let s2 = service.clone();
        let id = wallet.id;
        let d1 = tokio::spawn(async move { s1.debit(id, Paise(700), Currency::Inr, "k1").await });
        let d2 = tokio::spawn(async move { s2.debit(id, Paise(700), Currency::Inr, "k2").await });

        let r1 = d1.await.unwrap();
        let r2 = d2.await.unwrap();

        // Exactly one succeeds, the loser sees insufficient funds.
        assert!(r1.is_ok() ^ r2.is_ok());
        let err = if r1.is_err() { r1.unwrap_err() } else { r2.unwrap_err() };
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));

        let view = service.get_balance(id).await.unwrap();
        assert_eq!(view.balance, Paise(300));
        assert_eq!(
            mutation::derived_balance(&store.read(|t| t.clone()).await, id),
            300
        );
    }

    #[tokio::test]
    async fn test_illegal_transition_fails() {
        let store = Store::new();
        let service = WalletService::new(store.clone());
        let wallet = service.create(Uuid::new_v4(), Currency::Inr).await.unwrap();
        // pending → frozen is not legal
        assert!(matches!(
            service.freeze(wallet.id, "susp".into()).await,
            Err(CoreError::WalletStateInvalid { .. })
        ));
        // close is terminal
        let wallet = service.activate(wallet.id).await.unwrap();
        service.close(wallet.id, "done".into()).await.unwrap();
        assert!(service.activate(wallet.id).await.is_err());
    }
}
