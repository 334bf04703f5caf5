use chrono::Utc;
use uuid::Uuid;

use kosh_common::model::{IdempotencyReservation, TransactionRecord};
use kosh_common::{CoreError, Result};
use kosh_store::{Store, Tables};

/// Outcome of reserving an idempotency key at operation entry.
pub enum Reservation {
    /// First time this key is seen; the operation proceeds.
    New,
    /// The key settled before; return this record verbatim.
    Replay(TransactionRecord),
}

/// Reserves a key before any work happens.
///
/// A concurrent request holding the same unfulfilled key is a conflict; a
/// settled key replays its transaction record, completed or failed alike.
pub async fn reserve(store: &Store, key: &str, user_id: Uuid) -> Result<Reservation> {
    if key.is_empty() || key.len() > 128 {
        return Err(CoreError::Validation(
            "idempotency key must be 1-128 characters".into(),
        ));
    }
    let key = key.to_string();
    store
        .write(move |t| match t.idempotency_keys.get(&key) {
            Some(existing) if existing.user_id != user_id => Err(CoreError::Forbidden(
                "idempotency key belongs to another user".into(),
            )),
            Some(existing) => match existing.transaction_id {
                Some(tx_id) => Ok(Reservation::Replay(t.require_transaction(tx_id)?.clone())),
                None => Err(CoreError::Conflict(
                    "request with this idempotency key is in flight".into(),
                )),
            },
            None => {
                t.idempotency_keys.insert(
                    key.clone(),
                    IdempotencyReservation {
                        key,
                        user_id,
                        transaction_id: None,
                        created_at: Utc::now(),
                    },
                );
                Ok(Reservation::New)
            }
        })
        .await
}

/// Points a reservation at the transaction that settled it. Called inside
/// the same scope that persists the record.
pub fn fulfill(tables: &mut Tables, key: Option<&str>, transaction_id: Uuid) {
    if let Some(key) = key {
        if let Some(reservation) = tables.idempotency_keys.get_mut(key) {
            reservation.transaction_id = Some(transaction_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_then_conflict_while_in_flight() {
        let store = Store::new();
        let user = Uuid::new_v4();
        assert!(matches!(
            reserve(&store, "k1", user).await.unwrap(),
            Reservation::New
        ));
        assert!(matches!(
            reserve(&store, "k1", user).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_key_forbidden() {
        let store = Store::new();
        reserve(&store, "k1", Uuid::new_v4()).await.unwrap();
        assert!(matches!(
            reserve(&store, "k1", Uuid::new_v4()).await,
            Err(CoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = Store::new();
        assert!(reserve(&store, "", Uuid::new_v4()).await.is_err());
    }
}
