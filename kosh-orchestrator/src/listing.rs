use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kosh_common::auth::Claims;
use kosh_common::model::{TransactionRecord, TxKind, TxStatus};
use kosh_common::{CoreError, Paise, Result};

use crate::{Orchestrator, ADMIN_PERMISSION};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;
const MAX_SEARCH_LEN: usize = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub status: Option<TxStatus>,
    pub kind: Option<TxKind>,
    pub min_amount: Option<Paise>,
    pub max_amount: Option<Paise>,
    /// Bounded free-text search over description and external reference.
    pub search: Option<String>,
    /// Admin-only: scope to one user's transactions.
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionRecord>,
    pub total_count: u64,
}

impl Orchestrator {
    /// Lists transactions, newest first.
    ///
    /// Non-admin callers are always scoped to wallets they own; admin-scoped
    /// callers see every wallet and may filter by user id.
    pub async fn list(&self, acting: &Claims, filter: ListFilter) -> Result<TransactionPage> {
        if let Some(search) = &filter.search {
            if search.len() > MAX_SEARCH_LEN {
                return Err(CoreError::Validation(format!(
                    "search must be at most {MAX_SEARCH_LEN} characters"
                )));
            }
        }
        let is_admin = acting.has_permission(ADMIN_PERMISSION);
        if filter.user_id.is_some() && filter.user_id != Some(acting.user_id) && !is_admin {
            return Err(CoreError::Forbidden(
                "filtering by user requires admin scope".into(),
            ));
        }

        let acting = acting.clone();
        self.store()
            .read(move |t| {
                let scope_user = if is_admin {
                    filter.user_id
                } else {
                    Some(acting.user_id)
                };

                let mut records: Vec<TransactionRecord> = t
                    .transactions
                    .values()
                    .filter(|r| match scope_user {
                        Some(user) => owned_by(t, r, user),
                        None => true,
                    })
                    .filter(|r| filter.status.map_or(true, |s| r.status == s))
                    .filter(|r| filter.kind.map_or(true, |k| r.kind == k))
                    .filter(|r| filter.min_amount.map_or(true, |min| r.amount >= min))
                    .filter(|r| filter.max_amount.map_or(true, |max| r.amount <= max))
                    .filter(|r| matches_search(r, filter.search.as_deref()))
                    .cloned()
                    .collect();

                records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let total_count = records.len() as u64;
                let offset = filter.offset.unwrap_or(0);
                let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
                let transactions = records.into_iter().skip(offset).take(limit).collect();
                Ok(TransactionPage {
                    transactions,
                    total_count,
                })
            })
            .await
    }
}

fn owned_by(tables: &kosh_store::Tables, record: &TransactionRecord, user: Uuid) -> bool {
    if record.initiated_by == user {
        return true;
    }
    [record.source_wallet_id, record.destination_wallet_id]
        .into_iter()
        .flatten()
        .any(|wallet_id| {
            tables
                .wallets
                .get(&wallet_id)
                .map_or(false, |w| w.user_id == user)
        })
}

fn matches_search(record: &TransactionRecord, search: Option<&str>) -> bool {
    let Some(search) = search else {
        return true;
    };
    let needle = search.to_lowercase();
    let hay = |s: &Option<String>| {
        s.as_deref()
            .map_or(false, |v| v.to_lowercase().contains(&needle))
    };
    hay(&record.description) || hay(&record.external_reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kosh_common::Currency;

    fn record(description: &str, amount: i64) -> TransactionRecord {
        let now = Utc::now();
        TransactionRecord {
            id: Uuid::new_v4(),
            kind: TxKind::Deposit,
            status: TxStatus::Completed,
            source_wallet_id: None,
            destination_wallet_id: None,
            amount: Paise(amount),
            currency: Currency::Inr,
            description: Some(description.into()),
            external_reference: Some("UTR-991".into()),
            parent_id: None,
            category: None,
            journal_entry_id: None,
            failure_reason: None,
            initiated_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_search_matches_description_and_reference() {
        let r = record("rent for May", 100);
        assert!(matches_search(&r, Some("RENT")));
        assert!(matches_search(&r, Some("utr-991")));
        assert!(!matches_search(&r, Some("groceries")));
        assert!(matches_search(&r, None));
    }
}
