//! Transaction orchestrator.
//!
//! Composes deposits, withdrawals, transfers, and reversals across the
//! wallet service and the ledger inside a single transactional scope, gated
//! by risk consultation and step-up verification. Business rejections are
//! typed and never retried; transient infrastructure failures retry with
//! bounded backoff inside the request.

pub mod completer;
pub mod flows;
pub mod idempotency;
pub mod listing;
pub mod retry;
pub mod reversal;
pub mod risk;
pub mod transfer;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use kosh_common::auth::Claims;
use kosh_common::model::{TransactionRecord, TxKind, TxStatus};
use kosh_common::{CoreError, Currency, Paise, Result};
use kosh_events::{EventHub, Topic};
use kosh_identity::IdentityService;
use kosh_store::{Store, Tables};

pub use listing::{ListFilter, TransactionPage};
pub use risk::{RiskDecision, RiskGate};

/// Permission letting a caller act across all wallets.
pub const ADMIN_PERMISSION: &str = "transaction:transaction:admin";

const MAX_TEXT_LEN: usize = 200;

#[derive(Clone)]
pub struct Orchestrator {
    store: Store,
    identity: IdentityService,
    events: EventHub,
    risk: Arc<dyn RiskGate>,
    high_value_threshold: Paise,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        identity: IdentityService,
        events: EventHub,
        risk: Arc<dyn RiskGate>,
        high_value_threshold: Paise,
    ) -> Self {
        Self {
            store,
            identity,
            events,
            risk,
            high_value_threshold,
        }
    }

    pub fn high_value_threshold(&self) -> Paise {
        self.high_value_threshold
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn identity(&self) -> &IdentityService {
        &self.identity
    }

    /// Fetches one transaction, enforcing visibility: admins see everything,
    /// everyone else only transactions touching a wallet they own.
    pub async fn get(&self, acting: &Claims, id: Uuid) -> Result<TransactionRecord> {
        let acting = acting.clone();
        self.store
            .read(move |t| {
                let record = t.require_transaction(id)?;
                if !acting.has_permission(ADMIN_PERMISSION) && !is_participant(t, &acting, record) {
                    return Err(CoreError::not_found("transaction"));
                }
                Ok(record.clone())
            })
            .await
    }

    /// Publishes a lifecycle event; failures never affect the transaction.
    pub(crate) fn publish(&self, event_type: &str, record: &TransactionRecord) {
        self.events.publish(
            event_type,
            Topic::Transactions,
            json!({
                "transaction_id": record.id,
                "kind": record.kind,
                "status": record.status,
                "amount": record.amount,
                "source_wallet_id": record.source_wallet_id,
                "destination_wallet_id": record.destination_wallet_id,
            }),
        );
    }

    /// Writes a failed attempt outside the rolled-back scope so it stays
    /// observable, and settles the idempotency reservation on it.
    pub(crate) async fn record_failure(
        &self,
        acting: &Claims,
        kind: TxKind,
        source_wallet_id: Option<Uuid>,
        destination_wallet_id: Option<Uuid>,
        amount: Paise,
        currency: Currency,
        description: Option<String>,
        error: &CoreError,
        idem_key: Option<&str>,
    ) {
        let now = Utc::now();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            kind,
            status: TxStatus::Failed,
            source_wallet_id,
            destination_wallet_id,
            amount,
            currency,
            description,
            external_reference: None,
            parent_id: None,
            category: None,
            journal_entry_id: None,
            failure_reason: Some(error.to_string()),
            initiated_by: acting.user_id,
            created_at: now,
            updated_at: now,
        };
        let key = idem_key.map(str::to_string);
        let written = self
            .store
            .write(move |t| {
                idempotency::fulfill(t, key.as_deref(), record.id);
                t.transactions.insert(record.id, record.clone());
                Ok(record)
            })
            .await;
        match written {
            Ok(record) => tracing::info!(transaction = %record.id, reason = ?record.failure_reason, "failed attempt recorded"),
            Err(e) => tracing::error!(error = %e, "could not record failed attempt"),
        }
    }

    /// Risk consultation with the outage posture applied: an unreachable
    /// risk service fails closed at or above the high-value threshold and
    /// open below it.
    pub(crate) async fn consult_risk(&self, ctx: &risk::RiskContext) -> Result<RiskDecision> {
        match self.risk.evaluate(ctx).await {
            Ok(RiskDecision::Blocked) => {
                self.events.publish(
                    "risk.blocked",
                    Topic::Risk,
                    json!({ "user_id": ctx.user_id, "amount": ctx.amount }),
                );
                Err(CoreError::RiskRejected)
            }
            Ok(decision) => Ok(decision),
            Err(e) if ctx.amount >= self.high_value_threshold => {
                tracing::warn!(error = %e, "risk service outage, failing closed above threshold");
                Err(CoreError::RiskRejected)
            }
            Err(e) => {
                tracing::warn!(error = %e, "risk service outage, allowing below threshold");
                Ok(RiskDecision::Allowed)
            }
        }
    }
}

/// True when the caller owns a wallet on either side of the record or
/// initiated it.
pub(crate) fn is_participant(tables: &Tables, acting: &Claims, record: &TransactionRecord) -> bool {
    if record.initiated_by == acting.user_id {
        return true;
    }
    [record.source_wallet_id, record.destination_wallet_id]
        .into_iter()
        .flatten()
        .any(|wallet_id| {
            tables
                .wallets
                .get(&wallet_id)
                .map_or(false, |w| w.user_id == acting.user_id)
        })
}

pub(crate) fn validate_text(value: &Option<String>, field: &str) -> Result<()> {
    match value {
        Some(s) if s.len() > MAX_TEXT_LEN => Err(CoreError::Validation(format!(
            "{field} must be at most {MAX_TEXT_LEN} characters"
        ))),
        _ => Ok(()),
    }
}
