use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use kosh_common::auth::Claims;
use kosh_common::model::{
    EntryKind, TransactionRecord, TxKind, TxStatus, VerificationOp, WalletStatus,
};
use kosh_common::{CoreError, Currency, Paise, Result};
use kosh_identity::stepup;
use kosh_ledger::entry::{post_entry, LineSpec};
use kosh_wallet::mutation::{apply_credit, apply_debit};

use crate::risk::RiskContext;
use crate::{idempotency, retry, Orchestrator, RiskDecision};

#[derive(Debug, Clone, Deserialize)]
pub struct TransferInput {
    pub source_wallet_id: Uuid,
    pub destination_wallet_id: Uuid,
    pub amount: Paise,
    pub currency: Currency,
    pub description: Option<String>,
    pub verification_token: Option<String>,
}

impl Orchestrator {
    /// Moves money between two wallets.
    ///
    /// Wallet locks are taken in ascending id order; the debit, credit,
    /// journal entry, and transaction record commit in one scope or not at
    /// all. Transfers at or above the high-value threshold must present a
    /// verification token, consumed inside the same scope.
    pub async fn transfer(
        &self,
        acting: &Claims,
        input: TransferInput,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        input.amount.require_positive()?;
        crate::validate_text(&input.description, "description")?;
        if input.source_wallet_id == input.destination_wallet_id {
            return Err(CoreError::Validation(
                "source and destination wallets must differ".into(),
            ));
        }

        if let Some(key) = idem_key {
            if let idempotency::Reservation::Replay(record) =
                idempotency::reserve(self.store(), key, acting.user_id).await?
            {
                return Ok(record);
            }
        }

        // Pre-flight reads: ownership, destination eligibility, currencies.
        let acting_user = acting.user_id;
        let source_id = input.source_wallet_id;
        let dest_id = input.destination_wallet_id;
        let declared = input.currency;
        self.store()
            .read(move |t| {
                let source = t.require_wallet(source_id)?;
                let dest = t.require_wallet(dest_id)?;
                if source.user_id != acting_user {
                    return Err(CoreError::Forbidden(
                        "source wallet is not owned by the caller".into(),
                    ));
                }
                if source.currency != declared || dest.currency != declared {
                    return Err(CoreError::Validation("currency mismatch".into()));
                }
                if !matches!(dest.status, WalletStatus::Active | WalletStatus::Frozen) {
                    return Err(CoreError::WalletStateInvalid {
                        operation: "credit",
                    });
                }
                Ok(())
            })
            .await?;

        // Step-up for high-value transfers.
        let needs_stepup = input.amount >= self.high_value_threshold();
        if needs_stepup && input.verification_token.is_none() {
            return Err(self
                .identity()
                .demand_verification(
                    acting.user_id,
                    VerificationOp::HighValueTransfer,
                    json!({
                        "amount": input.amount,
                        "destination_wallet_id": input.destination_wallet_id,
                    }),
                )
                .await);
        }

        // Risk consultation; blocked and outage-above-threshold reject here.
        let decision = self
            .consult_risk(&RiskContext {
                user_id: acting.user_id,
                kind: TxKind::Transfer,
                amount: input.amount,
                source_wallet_id: Some(input.source_wallet_id),
                destination_wallet_id: Some(input.destination_wallet_id),
            })
            .await?;
        let flagged = decision == RiskDecision::Flagged;

        let settled = retry::with_backoff("transfer.settle", || {
            self.settle_transfer(acting, &input, needs_stepup, flagged, idem_key)
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
                    TxKind::Transfer,
                    Some(input.source_wallet_id),
                    Some(input.destination_wallet_id),
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

    async fn settle_transfer(
        &self,
        acting: &Claims,
        input: &TransferInput,
        consume_stepup: bool,
        flagged: bool,
        idem_key: Option<&str>,
    ) -> Result<TransactionRecord> {
        let _guards = self
            .store()
            .wallet_locks()
            .acquire_ordered(&[input.source_wallet_id, input.destination_wallet_id])
            .await?;

        let tx_id = Uuid::new_v4();
        let user = acting.user_id;
        let input = input.clone();
        let key = idem_key.map(str::to_string);

        self.store()
            .write(move |t| {
                if consume_stepup {
                    let token = input
                        .verification_token
                        .as_deref()
                        .ok_or_else(|| CoreError::Forbidden("verification token required".into()))?;
                    stepup::consume_token(
                        t,
                        user,
                        VerificationOp::HighValueTransfer,
                        token,
                        Utc::now(),
                    )?;
                }

                let source_account = t.require_wallet(input.source_wallet_id)?.ledger_account_id;
                let dest_account = t
                    .require_wallet(input.destination_wallet_id)?
                    .ledger_account_id;

                apply_debit(
                    t,
                    input.source_wallet_id,
                    input.amount,
                    input.currency,
                    &format!("txn-{tx_id}-debit"),
                )?;
                apply_credit(
                    t,
                    input.destination_wallet_id,
                    input.amount,
                    input.currency,
                    &format!("txn-{tx_id}-credit"),
                )?;

                let posted = post_entry(
                    t,
                    EntryKind::Transfer,
                    input
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("transfer {tx_id}")),
                    vec![
                        LineSpec::debit(source_account, input.amount),
                        LineSpec::credit(dest_account, input.amount),
                    ],
                )?;

                let now = Utc::now();
                let record = TransactionRecord {
                    id: tx_id,
                    kind: TxKind::Transfer,
                    status: TxStatus::Completed,
                    source_wallet_id: Some(input.source_wallet_id),
                    destination_wallet_id: Some(input.destination_wallet_id),
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
                tracing::info!(transaction = %tx_id, amount = %record.amount, "transfer completed");
                Ok(record)
            })
            .await
    }
}
