use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

use kosh_common::auth::Claims;
use kosh_common::model::{EntryKind, TransactionRecord, TxKind, TxStatus};
use kosh_common::{CoreError, Currency, Paise, Result};
use kosh_ledger::chart::SYSTEM_CASH_CODE;
use kosh_ledger::entry::{post_entry, LineSpec};
use kosh_store::Tables;
use kosh_wallet::mutation::{apply_credit, apply_debit};

use crate::risk::RiskContext;
use crate::{idempotency, retry, Orchestrator, ADMIN_PERMISSION};

pub const SIMULATED_CATEGORY: &str = "simulated_deposit";

/// Completion of a simulated deposit is sampled uniformly from this window.
const SIM_DELAY_MIN_SECS: u64 = 3;
const SIM_DELAY_MAX_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct DepositInput {
    pub wallet_id: Uuid,
    pub amount: Paise,
    pub currency: Currency,
    pub description: Option<String>,
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalInput {
    pub wallet_id: Uuid,
    pub amount: Paise,
    pub currency: Currency,
    pub description: Option<String>,
}

impl Orchestrator {
    /// Credits a wallet against the system cash account: the journal debits
    /// cash holding and credits the wallet's liability account.
    pub async fn deposit(
        &self,
        acting: &Claims,
        input: DepositInput,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        input.amount.require_positive()?;
        crate::validate_text(&input.description, "description")?;
        crate::validate_text(&input.external_reference, "external_reference")?;
        self.authorize_wallet_access(acting, input.wallet_id).await?;

        if let Some(key) = idem_key {
            if let idempotency::Reservation::Replay(record) =
                idempotency::reserve(self.store(), key, acting.user_id).await?
            {
                return Ok(record);
            }
        }

        let settled = retry::with_backoff("deposit.settle", || {
            self.settle_deposit(acting, &input, idem_key)
        })
        .await;

        match settled {
            Ok(record) => {
                self.publish("transaction.completed", &record);
                Ok(record)
            }
            Err(e) => {
                self.record_failure(
                    acting,
                    TxKind::Deposit,
                    None,
                    Some(input.wallet_id),
                    input.amount,
                    input.currency,
                    input.description.clone(),
                    &e,
                    idem_key,
                )
                .await;
                Err(e)
            }
        }
    }

    async fn settle_deposit(
        &self,
        acting: &Claims,
        input: &DepositInput,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        let _guard = self.store().wallet_locks().acquire(input.wallet_id).await?;
        let tx_id = Uuid::new_v4();
        let user = acting.user_id;
        let input = input.clone();
        let key = idem_key.map(str::to_string);

        self.store()
            .write(move |t| {
                let record = settle_credit_leg(t, tx_id, user, &input)?;
                idempotency::fulfill(t, key.as_deref(), tx_id);
                tracing::info!(transaction = %tx_id, amount = %record.amount, "deposit completed");
                Ok(record)
            })
            .await
    }

    /// Debits a wallet into the system cash account; the mirror image of a
    /// deposit, requiring sufficient available balance.
    pub async fn withdrawal(
        &self,
        acting: &Claims,
        input: WithdrawalInput,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        input.amount.require_positive()?;
        crate::validate_text(&input.description, "description")?;
        self.authorize_wallet_access(acting, input.wallet_id).await?;

        if let Some(key) = idem_key {
            if let idempotency::Reservation::Replay(record) =
                idempotency::reserve(self.store(), key, acting.user_id).await?
            {
                return Ok(record);
            }
        }

        let decision = self
            .consult_risk(&RiskContext {
                user_id: acting.user_id,
                kind: TxKind::Withdrawal,
                amount: input.amount,
                source_wallet_id: Some(input.wallet_id),
                destination_wallet_id: None,
            })
            .await?;
        let flagged = decision == crate::RiskDecision::Flagged;

        let settled = retry::with_backoff("withdrawal.settle", || {
            self.settle_withdrawal(acting, &input, flagged, idem_key)
        })
        .await;

        match settled {
            Ok(record) => {
                self.publish("transaction.completed", &record);
                Ok(record)
            }
            Err(e) => {
                self.record_failure(
                    acting,
                    TxKind::Withdrawal,
                    Some(input.wallet_id),
                    None,
                    input.amount,
                    input.currency,
                    input.description.clone(),
                    &e,
                    idem_key,
                )
                .await;
                Err(e)
            }
        }
    }

    async fn settle_withdrawal(
        &self,
        acting: &Claims,
        input: &WithdrawalInput,
        flagged: bool,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        let _guard = self.store().wallet_locks().acquire(input.wallet_id).await?;
        let tx_id = Uuid::new_v4();
        let user = acting.user_id;
        let input = input.clone();
        let key = idem_key.map(str::to_string);

        self.store()
            .write(move |t| {
                let wallet_account = t.require_wallet(input.wallet_id)?.ledger_account_id;
                let cash_account = system_cash_account(t)?;

                apply_debit(
                    t,
                    input.wallet_id,
                    input.amount,
                    input.currency,
                    &format!("txn-{tx_id}-debit"),
                )?;
                let posted = post_entry(
                    t,
                    EntryKind::Withdrawal,
                    input
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("withdrawal {tx_id}")),
                    vec![
                        LineSpec::debit(wallet_account, input.amount),
                        LineSpec::credit(cash_account, input.amount),
                    ],
                )?;

                let now = Utc::now();
                let record = TransactionRecord {
                    id: tx_id,
                    kind: TxKind::Withdrawal,
                    status: TxStatus::Completed,
                    source_wallet_id: Some(input.wallet_id),
                    destination_wallet_id: None,
                    amount: input.amount,
                    currency: input.currency,
                    description: input.description.clone(),
                    external_reference: None,
                    parent_id: None,
                    category: flagged.then(|| "risk_flagged".to_string()),
                    journal_entry_id: Some(posted.entry.id),
                    failure_reason: None,
                    initiated_by: user,
                    created_at: now,
                    updated_at: now,
                };
                t.transactions.insert(tx_id, record.clone());
                idempotency::fulfill(t, key.as_deref(), tx_id);
                tracing::info!(transaction = %tx_id, amount = %record.amount, "withdrawal completed");
                Ok(record)
            })
            .await
    }

    // --- simulated deposits ---

    /// Creates a pending deposit and schedules its completion after a
    /// uniformly sampled delay. The scheduler is at-least-once; completion
    /// is idempotent on the transaction id.
    pub async fn initiate_simulated_deposit(
        &self,
        acting: &Claims,
        input: DepositInput,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        input.amount.require_positive()?;
        crate::validate_text(&input.description, "description")?;
        self.authorize_wallet_access(acting, input.wallet_id).await?;

        if let Some(key) = idem_key {
            if let idempotency::Reservation::Replay(record) =
                idempotency::reserve(self.store(), key, acting.user_id).await?
            {
                return Ok(record);
            }
        }

        let now = Utc::now();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            kind: TxKind::Deposit,
            status: TxStatus::Pending,
            source_wallet_id: None,
            destination_wallet_id: Some(input.wallet_id),
            amount: input.amount,
            currency: input.currency,
            description: input.description.clone(),
            external_reference: Some(
                input
                    .external_reference
                    .clone()
                    .unwrap_or_else(|| format!("SIM-{}", Uuid::new_v4().simple())),
            ),
            parent_id: None,
            category: Some(SIMULATED_CATEGORY.to_string()),
            journal_entry_id: None,
            failure_reason: None,
            initiated_by: acting.user_id,
            created_at: now,
            updated_at: now,
        };

        let stored = record.clone();
        let key = idem_key.map(str::to_string);
        self.store()
            .write(move |t| {
                idempotency::fulfill(t, key.as_deref(), stored.id);
                t.transactions.insert(stored.id, stored.clone());
                Ok(())
            })
            .await?;

        let delay = Duration::from_secs(
            rand::thread_rng().gen_range(SIM_DELAY_MIN_SECS..=SIM_DELAY_MAX_SECS),
        );
        let orchestrator = self.clone();
        let tx_id = record.id;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = orchestrator.complete_simulated_deposit(tx_id).await {
                tracing::warn!(transaction = %tx_id, error = %e, "scheduled completion failed, completer will retry");
            }
        });

        tracing::info!(transaction = %tx_id, delay_secs = delay.as_secs(), "simulated deposit initiated");
        Ok(record)
    }

    /// Completes a pending simulated deposit. Safe to call any number of
    /// times: a transaction that is no longer pending is returned unchanged.
    pub async fn complete_simulated_deposit(&self, tx_id: Uuid) -> Result<TransactionRecord> {
        let wallet_id = self
            .store()
            .read(move |t| {
                let record = t.require_transaction(tx_id)?;
                record
                    .destination_wallet_id
                    .ok_or_else(|| CoreError::internal("simulated deposit without destination"))
            })
            .await?;

        let _guard = self.store().wallet_locks().acquire(wallet_id).await?;
        let settled = self
            .store()
            .write(move |t| {
                let record = t.require_transaction(tx_id)?.clone();
                // Replay guard: only a still-pending record settles.
                if record.status != TxStatus::Pending {
                    return Ok(record);
                }
                let input = DepositInput {
                    wallet_id,
                    amount: record.amount,
                    currency: record.currency,
                    description: record.description.clone(),
                    external_reference: record.external_reference.clone(),
                };
                let completed = settle_credit_leg_onto(t, record, &input)?;
                Ok(completed)
            })
            .await;

        match settled {
            Ok(record) => {
                if record.status == TxStatus::Completed {
                    self.publish("transaction.completed", &record);
                }
                Ok(record)
            }
            // A business rejection (the wallet closed in the meantime, say)
            // will never succeed on retry; mark the record failed so the
            // completer stops re-driving it.
            Err(e) if !e.is_transient() => {
                let reason = e.to_string();
                let failed = self
                    .store()
                    .write(move |t| {
                        let record = t
                            .transactions
                            .get_mut(&tx_id)
                            .ok_or(CoreError::not_found("transaction"))?;
                        if record.status == TxStatus::Pending {
                            record.status = TxStatus::Failed;
                            record.failure_reason = Some(reason);
                            record.updated_at = Utc::now();
                        }
                        Ok(record.clone())
                    })
                    .await?;
                tracing::warn!(transaction = %tx_id, reason = ?failed.failure_reason, "simulated deposit failed");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Pending simulated deposits old enough that their scheduled completion
    /// should already have fired; the completer re-drives these.
    pub async fn overdue_simulated_deposits(&self, grace_secs: i64) -> Vec<Uuid> {
        let cutoff = Utc::now() - chrono::Duration::seconds(grace_secs);
        self.store()
            .read(move |t| {
                t.transactions
                    .values()
                    .filter(|r| {
                        r.status == TxStatus::Pending
                            && r.category.as_deref() == Some(SIMULATED_CATEGORY)
                            && r.created_at < cutoff
                    })
                    .map(|r| r.id)
                    .collect()
            })
            .await
    }

    async fn authorize_wallet_access(&self, acting: &Claims, wallet_id: Uuid) -> Result<()> {
        let acting = acting.clone();
        self.store()
            .read(move |t| {
                let wallet = t.require_wallet(wallet_id)?;
                if wallet.user_id != acting.user_id && !acting.has_permission(ADMIN_PERMISSION) {
                    return Err(CoreError::Forbidden(
                        "wallet is not owned by the caller".into(),
                    ));
                }
                Ok(())
            })
            .await
    }
}

/// Builds and settles the credit leg of a deposit for a brand-new record.
fn settle_credit_leg(
    tables: &mut Tables,
    tx_id: Uuid,
    user: Uuid,
    input: &DepositInput,
) -> Result<TransactionRecord> {
    let now = Utc::now();
    let record = TransactionRecord {
        id: tx_id,
        kind: TxKind::Deposit,
        status: TxStatus::Pending,
        source_wallet_id: None,
        destination_wallet_id: Some(input.wallet_id),
        amount: input.amount,
        currency: input.currency,
        description: input.description.clone(),
        external_reference: input.external_reference.clone(),
        parent_id: None,
        category: None,
        journal_entry_id: None,
        failure_reason: None,
        initiated_by: user,
        created_at: now,
        updated_at: now,
    };
    settle_credit_leg_onto(tables, record, input)
}

/// Applies the wallet credit and journal entry onto an existing record and
/// marks it completed.
fn settle_credit_leg_onto(
    tables: &mut Tables,
    mut record: TransactionRecord,
    input: &DepositInput,
) -> Result<TransactionRecord> {
    let wallet_account = tables.require_wallet(input.wallet_id)?.ledger_account_id;
    let cash_account = system_cash_account(tables)?;

    apply_credit(
        tables,
        input.wallet_id,
        input.amount,
        input.currency,
        &format!("txn-{}-credit", record.id),
    )?;
    let posted = post_entry(
        tables,
        EntryKind::Deposit,
        record
            .description
            .clone()
            .unwrap_or_else(|| format!("deposit {}", record.id)),
        vec![
            LineSpec::debit(cash_account, input.amount),
            LineSpec::credit(wallet_account, input.amount),
        ],
    )?;

    record.status = TxStatus::Completed;
    record.journal_entry_id = Some(posted.entry.id);
    record.updated_at = Utc::now();
    tables.transactions.insert(record.id, record.clone());
    Ok(record)
}

fn system_cash_account(tables: &Tables) -> Result<Uuid> {
    tables
        .account_by_code(SYSTEM_CASH_CODE)
        .map(|a| a.id)
        .ok_or_else(|| CoreError::internal("system chart not seeded"))
}
