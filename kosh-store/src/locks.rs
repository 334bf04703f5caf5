use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use kosh_common::{CoreError, Result};

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Keyed async mutexes standing in for row-level exclusive locks.
///
/// Acquisition suspends until the lock is granted or the timeout elapses;
/// a timeout is a transient infrastructure failure, eligible for retry at
/// the orchestrator.
#[derive(Clone)]
pub struct LockRegistry {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

pub type RowGuard = OwnedMutexGuard<()>;

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquires the exclusive lock for one row.
    pub async fn acquire(&self, id: Uuid) -> Result<RowGuard> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        tokio::time::timeout(LOCK_TIMEOUT, lock.lock_owned())
            .await
            .map_err(|_| CoreError::internal(format!("wallet lock timeout for {id}")))
    }

    /// Acquires several row locks in ascending id order.
    ///
    /// Every multi-wallet operation goes through here; the fixed order is
    /// what prevents deadlock between two transfers moving opposite
    /// directions between the same pair of wallets.
    pub async fn acquire_ordered(&self, ids: &[Uuid]) -> Result<Vec<RowGuard>> {
        let mut sorted: Vec<Uuid> = ids.to_vec();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.acquire(id).await?);
        }
        Ok(guards)
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
