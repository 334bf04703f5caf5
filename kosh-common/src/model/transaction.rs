use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::{Currency, Paise};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdrawal,
    Transfer,
    Reversal,
    Fee,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
    Cancelled,
}

/// Record of one orchestrated money movement.
///
/// Wallet references depend on kind: a transfer names both wallets (distinct),
/// a deposit only the destination, a withdrawal only the source. A reversal
/// points at its completed parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub kind: TxKind,
    pub status: TxStatus,
    pub source_wallet_id: Option<Uuid>,
    pub destination_wallet_id: Option<Uuid>,
    pub amount: Paise,
    pub currency: Currency,
    pub description: Option<String>,
    pub external_reference: Option<String>,
    pub parent_id: Option<Uuid>,
    pub category: Option<String>,
    /// Journal entry that settled this transaction, once completed.
    pub journal_entry_id: Option<Uuid>,
    pub failure_reason: Option<String>,
    /// User on whose behalf the orchestrator acted.
    pub initiated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Orchestrator-level idempotency reservation.
///
/// The key is reserved at operation entry; once the operation settles the
/// reservation points at the transaction whose record replays return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyReservation {
    pub key: String,
    pub user_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
