use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::{Currency, Paise};

/// Wallet lifecycle. `pending → active ↔ frozen → closed`; closed is
/// terminal. Frozen wallets receive credits but may not debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Pending,
    Active,
    Frozen,
    Closed,
}

/// A user-held spendable balance.
///
/// `balance` is authoritative; `available_balance` subtracts active holds.
/// At every commit point `0 <= available_balance <= balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub balance: Paise,
    pub available_balance: Paise,
    pub status: WalletStatus,
    /// Liability account in the ledger that mirrors this wallet.
    pub ledger_account_id: Uuid,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Debit,
    Credit,
}

/// Idempotency log row: one committed balance mutation.
///
/// The signed sum of all mutations for a wallet equals its balance; replays
/// of the same `(wallet_id, idem_key)` return this row instead of applying
/// the mutation again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMutation {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub idem_key: String,
    pub kind: MutationKind,
    pub amount: Paise,
    /// Balance observed immediately after this mutation committed.
    pub balance_after: Paise,
    pub created_at: DateTime<Utc>,
}

impl WalletMutation {
    pub fn signed_delta(&self) -> i64 {
        match self.kind {
            MutationKind::Debit => -self.amount.0,
            MutationKind::Credit => self.amount.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    Released,
    Captured,
}

/// A reservation against available balance; balance itself is unchanged
/// until the hold is captured as a debit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount: Paise,
    pub status: HoldStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
