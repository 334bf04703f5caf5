use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use kosh_common::model::{AccountStatus, EntryKind, JournalEntry, JournalLine};
use kosh_common::{CoreError, Paise, Result};
use kosh_store::Tables;

use crate::PostedEntry;

/// One requested line of a posting. Exactly one of `debit`/`credit` must be
/// positive and the other zero.
#[derive(Debug, Clone, Deserialize)]
pub struct LineSpec {
    pub account_id: Uuid,
    #[serde(default)]
    pub debit: Paise,
    #[serde(default)]
    pub credit: Paise,
}

impl LineSpec {
    pub fn debit(account_id: Uuid, amount: Paise) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: Paise::ZERO,
        }
    }

    pub fn credit(account_id: Uuid, amount: Paise) -> Self {
        Self {
            account_id,
            debit: Paise::ZERO,
            credit: amount,
        }
    }
}

/// Posts an entry inside an open store transaction.
///
/// Fails with `UnbalancedEntry` unless total debits equal total credits and
/// both are strictly positive; with a validation error if any referenced
/// account is not postable; with `CurrencyMismatch` if line accounts disagree
/// on currency.
pub fn post_entry(
    tables: &mut Tables,
    kind: EntryKind,
    description: String,
    lines: Vec<LineSpec>,
) -> Result<PostedEntry> {
    if lines.is_empty() {
        return Err(CoreError::Validation("entry requires at least one line".into()));
    }

    let mut debits = Paise::ZERO;
    let mut credits = Paise::ZERO;
    let mut currency = None;

    for spec in &lines {
        let one_sided = (spec.debit.is_positive() && spec.credit == Paise::ZERO)
            || (spec.credit.is_positive() && spec.debit == Paise::ZERO);
        if !one_sided {
            return Err(CoreError::Validation(
                "each line must carry exactly one positive side".into(),
            ));
        }

        let account = tables.require_account(spec.account_id)?;
        if account.status != AccountStatus::Active {
            return Err(CoreError::Validation(format!(
                "account {} is not in a postable state",
                account.code
            )));
        }
        match currency {
            None => currency = Some(account.currency),
            Some(c) if c != account.currency => return Err(CoreError::CurrencyMismatch),
            Some(_) => {}
        }

        debits = debits.checked_add(spec.debit)?;
        credits = credits.checked_add(spec.credit)?;
    }

    if debits != credits || !debits.is_positive() {
        return Err(CoreError::UnbalancedEntry { debits, credits });
    }

    let entry = JournalEntry {
        id: Uuid::new_v4(),
        kind,
        description,
        created_at: Utc::now(),
    };
    let lines: Vec<JournalLine> = lines
        .into_iter()
        .enumerate()
        .map(|(i, spec)| JournalLine {
            id: Uuid::new_v4(),
            entry_id: entry.id,
            account_id: spec.account_id,
            debit: spec.debit,
            credit: spec.credit,
            position: i as u32,
        })
        .collect();

    tables.insert_entry(entry.clone(), lines.clone());
    tracing::debug!(entry = %entry.id, kind = ?entry.kind, total = %debits, "journal entry posted");
    Ok(PostedEntry { entry, lines })
}

/// Builds the compensating line set for a committed entry: every debit
/// becomes a credit of the same amount and vice versa.
pub fn swapped_lines(tables: &Tables, entry_id: Uuid) -> Result<Vec<LineSpec>> {
    let lines = tables.lines_for_entry(entry_id);
    if lines.is_empty() {
        return Err(CoreError::not_found("journal entry"));
    }
    Ok(lines
        .into_iter()
        .map(|l| LineSpec {
            account_id: l.account_id,
            debit: l.credit,
            credit: l.debit,
        })
        .collect())
}
