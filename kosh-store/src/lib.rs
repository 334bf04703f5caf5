//! Transactional map over the core's relational tables.
//!
//! The storage engine itself is out of scope for the core; what the services
//! rely on is a transactional map with serializable-capable transactions,
//! row-level wallet locks, and unique-constraint enforcement. `Store`
//! provides exactly that contract: committed tables behind a single
//! reader-writer lock, write scopes that commit all-or-nothing, and a keyed
//! async lock registry for wallet rows.

pub mod locks;
pub mod tables;

use std::sync::Arc;

use tokio::sync::RwLock;

use kosh_common::Result;
pub use locks::LockRegistry;
pub use tables::Tables;

#[derive(Clone)]
pub struct Store {
    state: Arc<RwLock<Tables>>,
    wallet_locks: LockRegistry,
}

impl Store {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(Tables::default())),
            wallet_locks: LockRegistry::new(),
        }
    }

    /// Runs a read-only closure against the committed tables.
    pub async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let guard = self.state.read().await;
        f(&guard)
    }

    /// Runs a closure inside a write transaction.
    ///
    /// The closure mutates a scratch copy of the tables; only a successful
    /// return commits it. On error nothing the closure did is visible, which
    /// is what makes multi-table operations (debit + credit + journal entry
    /// + record) atomic.
    pub async fn write<R>(&self, f: impl FnOnce(&mut Tables) -> Result<R>) -> Result<R> {
        let mut guard = self.state.write().await;
        let mut scratch = guard.clone();
        match f(&mut scratch) {
            Ok(value) => {
                *guard = scratch;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    /// Row-level wallet locks. Multi-wallet operations must acquire in
    /// ascending id order; see [`LockRegistry::acquire_ordered`].
    pub fn wallet_locks(&self) -> &LockRegistry {
        &self.wallet_locks
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kosh_common::model::{Account, AccountKind, AccountStatus};
    use kosh_common::{CoreError, Currency};
    use uuid::Uuid;

    fn account(code: &str) -> Account {
        Account {
            id: Uuid::new_v4(),
            code: code.into(),
            name: code.into(),
            kind: AccountKind::Asset,
            currency: Currency::Inr,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_write_commits_on_ok() {
        let store = Store::new();
        let acc = account("CASH");
        let id = acc.id;
        store
            .write(|t| {
                t.insert_account(acc.clone())?;
                Ok(())
            })
            .await
            .unwrap();
        let found = store.read(|t| t.accounts.get(&id).cloned()).await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_write_rolls_back_on_err() {
        let store = Store::new();
        let acc = account("CASH");
        let id = acc.id;
        let res: Result<()> = store
            .write(|t| {
                t.insert_account(acc.clone())?;
                Err(CoreError::Validation("boom".into()))
            })
            .await;
        assert!(res.is_err());
        let found = store.read(|t| t.accounts.get(&id).cloned()).await;
        assert!(found.is_none(), "rolled-back insert must not be visible");
    }

    #[tokio::test]
    async fn test_unique_code_conflict() {
        let store = Store::new();
        store
            .write(|t| t.insert_account(account("CASH")))
            .await
            .unwrap();
        let res = store.write(|t| t.insert_account(account("CASH"))).await;
        assert!(matches!(res, Err(CoreError::Conflict(_))));
    }
}
