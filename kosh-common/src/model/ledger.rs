use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::{Currency, Paise};

/// The five classes of the chart of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    /// Asset and expense accounts increase on the debit side; the rest on
    /// the credit side.
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountKind::Asset | AccountKind::Expense)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
}

/// A ledger account. `code` is unique within the chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub currency: Currency,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

/// Economic nature of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    Transfer,
    Reversal,
    Fee,
    Refund,
    Adjustment,
}

/// An atomic posting. Once committed an entry is immutable; corrections are
/// made by compensating entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub kind: EntryKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// One side of a posting. Exactly one of `debit`/`credit` is positive and
/// the other is zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub account_id: Uuid,
    pub debit: Paise,
    pub credit: Paise,
    pub position: u32,
}

impl JournalLine {
    /// Signed effect of this line on the account's balance, given the
    /// account's normal side.
    pub fn signed_delta(&self, kind: AccountKind) -> i64 {
        if kind.is_debit_normal() {
            self.debit.0 - self.credit.0
        } else {
            self.credit.0 - self.debit.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_side() {
        assert!(AccountKind::Asset.is_debit_normal());
        assert!(AccountKind::Expense.is_debit_normal());
        assert!(!AccountKind::Liability.is_debit_normal());
        assert!(!AccountKind::Revenue.is_debit_normal());
        assert!(!AccountKind::Equity.is_debit_normal());
    }

    #[test]
    fn test_signed_delta_by_normal_side() {
        let line = JournalLine {
            id: Uuid::new_v4(),
            entry_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            debit: Paise(500),
            credit: Paise::ZERO,
            position: 0,
        };
        assert_eq!(line.signed_delta(AccountKind::Asset), 500);
        assert_eq!(line.signed_delta(AccountKind::Liability), -500);
    }
}
