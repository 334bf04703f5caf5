use chrono::Utc;
use uuid::Uuid;

use kosh_common::auth::Claims;
use kosh_common::model::{EntryKind, TransactionRecord, TxKind, TxStatus};
use kosh_common::{CoreError, Result};
use kosh_ledger::entry::{post_entry, swapped_lines};
use kosh_wallet::mutation::{apply_credit, apply_debit};

use crate::{idempotency, retry, Orchestrator, ADMIN_PERMISSION};

impl Orchestrator {
    /// Reverses a completed transaction.
    ///
    /// The reversal's journal entry swaps the parent's debits and credits,
    /// wallet balances move back accordingly, the parent is marked
    /// `reversed`, and the new record points at it. A transaction reverses
    /// at most once.
    pub async fn reverse(
        &self,
        acting: &Claims,
        parent_id: Uuid,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        if let Some(key) = idem_key {
            if let idempotency::Reservation::Replay(record) =
                idempotency::reserve(self.store(), key, acting.user_id).await?
            {
                return Ok(record);
            }
        }

        // Pre-flight: existence, authorization, reversibility.
        let acting_check = acting.clone();
        let parent = self
            .store()
            .read(move |t| {
                let parent = t.require_transaction(parent_id)?.clone();
                if parent.initiated_by != acting_check.user_id
                    && !acting_check.has_permission(ADMIN_PERMISSION)
                {
                    return Err(CoreError::not_found("transaction"));
                }
                Ok(parent)
            })
            .await?;

        match parent.status {
            TxStatus::Completed => {}
            TxStatus::Reversed => return Err(CoreError::AlreadyReversed),
            _ => {
                return Err(CoreError::Conflict(
                    "only completed transactions can be reversed".into(),
                ))
            }
        }
        if !matches!(
            parent.kind,
            TxKind::Deposit | TxKind::Withdrawal | TxKind::Transfer
        ) {
            return Err(CoreError::Validation(format!(
                "{:?} transactions cannot be reversed",
                parent.kind
            )));
        }

        let settled = retry::with_backoff("reversal.settle", || {
            self.settle_reversal(acting, &parent, idem_key)
        })
        .await?;
        self.publish("transaction.reversed", &settled);
        Ok(settled)
    }

    async fn settle_reversal(
        &self,
        acting: &Claims,
        parent: &TransactionRecord,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        let involved: Vec<Uuid> = [parent.source_wallet_id, parent.destination_wallet_id]
            .into_iter()
            .flatten()
            .collect();
        let _guards = self.store().wallet_locks().acquire_ordered(&involved).await?;

        let reversal_id = Uuid::new_v4();
        let user = acting.user_id;
        let parent_id = parent.id;
        let key = idem_key.map(str::to_string);

        self.store()
            .write(move |t| {
                // Re-check under the locks: a concurrent reversal may have
                // won the race.
                let parent = t.require_transaction(parent_id)?.clone();
                if parent.status == TxStatus::Reversed {
                    return Err(CoreError::AlreadyReversed);
                }
                if parent.status != TxStatus::Completed {
                    return Err(CoreError::Conflict(
                        "only completed transactions can be reversed".into(),
                    ));
                }
                let entry_id = parent
                    .journal_entry_id
                    .ok_or_else(|| CoreError::internal("completed transaction without journal entry"))?;

                // Undo the wallet legs.
                match parent.kind {
                    TxKind::Deposit => {
                        let wallet = parent
                            .destination_wallet_id
                            .ok_or_else(|| CoreError::internal("deposit without destination"))?;
                        apply_debit(
                            t,
                            wallet,
                            parent.amount,
                            parent.currency,
                            &format!("txn-{reversal_id}-debit"),
                        )?;
                    }
                    TxKind::Withdrawal => {
                        let wallet = parent
                            .source_wallet_id
                            .ok_or_else(|| CoreError::internal("withdrawal without source"))?;
                        apply_credit(
                            t,
                            wallet,
                            parent.amount,
                            parent.currency,
                            &format!("txn-{reversal_id}-credit"),
                        )?;
                    }
                    TxKind::Transfer => {
                        let source = parent
                            .source_wallet_id
                            .ok_or_else(|| CoreError::internal("transfer without source"))?;
                        let dest = parent
                            .destination_wallet_id
                            .ok_or_else(|| CoreError::internal("transfer without destination"))?;
                        apply_debit(
                            t,
                            dest,
                            parent.amount,
                            parent.currency,
                            &format!("txn-{reversal_id}-debit"),
                        )?;
                        apply_credit(
                            t,
                            source,
                            parent.amount,
                            parent.currency,
                            &format!("txn-{reversal_id}-credit"),
                        )?;
                    }
                    _ => unreachable!("reversibility checked before settling"),
                }

                // Compensating entry: parent's debits and credits swapped.
                let lines = swapped_lines(t, entry_id)?;
                let posted = post_entry(
                    t,
                    EntryKind::Reversal,
                    format!("reversal of {parent_id}"),
                    lines,
                )?;

                let marker = t
                    .transactions
                    .get_mut(&parent_id)
                    .expect("parent re-read above");
                marker.status = TxStatus::Reversed;
                marker.updated_at = Utc::now();

                let now = Utc::now();
                let record = TransactionRecord {
                    id: reversal_id,
                    kind: TxKind::Reversal,
                    status: TxStatus::Completed,
                    source_wallet_id: parent.destination_wallet_id,
                    destination_wallet_id: parent.source_wallet_id,
                    amount: parent.amount,
                    currency: parent.currency,
                    description: Some(format!("reversal of {parent_id}")),
                    external_reference: None,
                    parent_id: Some(parent_id),
                    category: None,
                    journal_entry_id: Some(posted.entry.id),
                    failure_reason: None,
                    initiated_by: user,
                    created_at: now,
                    updated_at: now,
                };
                t.transactions.insert(reversal_id, record.clone());
                idempotency::fulfill(t, key.as_deref(), reversal_id);
                tracing::info!(reversal = %reversal_id, parent = %parent_id, "transaction reversed");
                Ok(record)
            })
            .await
    }
}
