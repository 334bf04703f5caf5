use chrono::{DateTime, Utc};
use uuid::Uuid;

use kosh_common::{Paise, Result};
use kosh_store::Tables;

use crate::PostedEntry;

/// Derives an account's balance from the journal alone.
///
/// `Σ debits − Σ credits` for debit-normal accounts, the inverse for
/// credit-normal ones. Any materialized balance elsewhere (the wallet cache)
/// must reproduce this number exactly.
pub fn derive_balance(
    tables: &Tables,
    account_id: Uuid,
    as_of: Option<DateTime<Utc>>,
) -> Result<Paise> {
    let account = tables.require_account(account_id)?;
    let mut total: i64 = 0;
    for line in tables.lines_for_account(account_id) {
        if let Some(cutoff) = as_of {
            let entry = tables
                .journal_entries
                .get(&line.entry_id)
                .ok_or_else(|| kosh_common::CoreError::internal("dangling journal line"))?;
            if entry.created_at > cutoff {
                continue;
            }
        }
        total += line.signed_delta(account.kind);
    }
    Ok(Paise(total))
}

/// Entries touching an account inside an optional time range, newest first.
pub fn list_entries(
    tables: &Tables,
    account_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<PostedEntry>> {
    tables.require_account(account_id)?;
    let mut entry_ids: Vec<Uuid> = tables
        .lines_for_account(account_id)
        .iter()
        .map(|l| l.entry_id)
        .collect();
    entry_ids.sort();
    entry_ids.dedup();

    let mut result: Vec<PostedEntry> = entry_ids
        .into_iter()
        .filter_map(|id| tables.journal_entries.get(&id).cloned())
        .filter(|e| from.map_or(true, |f| e.created_at >= f))
        .filter(|e| to.map_or(true, |t| e.created_at <= t))
        .map(|e| PostedEntry {
            lines: tables.lines_for_entry(e.id).into_iter().cloned().collect(),
            entry: e,
        })
        .collect();
    result.sort_by(|a, b| b.entry.created_at.cmp(&a.entry.created_at));
    Ok(result)
}
