//! Double-entry ledger: the system of record for balances.
//!
//! Every posting is a journal entry whose lines debit and credit accounts in
//! equal measure. Entries are immutable once committed; corrections are made
//! by compensating entries. Balances are derivable from the journal alone.

pub mod balance;
pub mod chart;
pub mod entry;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use kosh_common::model::{Account, AccountKind, EntryKind, JournalEntry};
use kosh_common::{Currency, Paise, Result};
use kosh_store::Store;

pub use entry::LineSpec;

/// An entry joined with its ordered lines, as returned to callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PostedEntry {
    pub entry: JournalEntry,
    pub lines: Vec<kosh_common::model::JournalLine>,
}

#[derive(Clone)]
pub struct LedgerService {
    store: Store,
}

impl LedgerService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn create_account(
        &self,
        code: String,
        name: String,
        kind: AccountKind,
        currency: Currency,
    ) -> Result<Account> {
        self.store
            .write(|t| chart::create_account(t, code, name, kind, currency))
            .await
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Account> {
        self.store
            .read(|t| t.require_account(id).cloned())
            .await
    }

    /// Posts a balanced entry atomically: the entry and all its lines either
    /// commit together or not at all.
    pub async fn post_entry(
        &self,
        kind: EntryKind,
        description: String,
        lines: Vec<LineSpec>,
    ) -> Result<PostedEntry> {
        self.store
            .write(|t| entry::post_entry(t, kind, description, lines))
            .await
    }

    /// Authoritative balance of an account, derived from the journal.
    pub async fn get_balance(&self, account_id: Uuid, as_of: Option<DateTime<Utc>>) -> Result<Paise> {
        self.store
            .read(|t| balance::derive_balance(t, account_id, as_of))
            .await
    }

    pub async fn list_entries(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<PostedEntry>> {
        self.store
            .read(|t| balance::list_entries(t, account_id, from, to))
            .await
    }
}
