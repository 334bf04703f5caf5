use std::sync::Arc;

use uuid::Uuid;

use kosh_authority::AuthorityService;
use kosh_common::auth::{Claims, TokenCodec};
use kosh_common::model::{TxKind, TxStatus, UserKind, UserStatus, VerificationOp};
use kosh_common::utils::time::epoch_secs;
use kosh_common::{CoreError, Currency, Paise};
use kosh_events::EventHub;
use kosh_identity::IdentityService;
use kosh_ledger::balance::derive_balance;
use kosh_orchestrator::flows::DepositInput;
use kosh_orchestrator::risk::{PermissiveRiskGate, RiskDecision, StaticRiskGate};
use kosh_orchestrator::transfer::TransferInput;
use kosh_orchestrator::{ListFilter, Orchestrator, RiskGate};
use kosh_store::Store;
use kosh_wallet::WalletService;

const THRESHOLD: Paise = Paise(50_000);

struct Harness {
    store: Store,
    identity: IdentityService,
    wallets: WalletService,
    orchestrator: Orchestrator,
}

async fn harness_with_risk(risk: Arc<dyn RiskGate>) -> Harness {
    let store = Store::new();
    store
        .write(|t| {
            kosh_ledger::chart::seed_chart(t, Currency::Inr)?;
            kosh_authority::seed::seed_builtin_roles(t)
        })
        .await
        .unwrap();

    let authority = AuthorityService::new(store.clone());
    let wallets = WalletService::new(store.clone());
    let codec = TokenCodec::new(b"integration-test-secret-32-bytes").unwrap();
    let identity = IdentityService::new(
        store.clone(),
        authority,
        wallets.clone(),
        codec,
        3600,
    );
    let orchestrator = Orchestrator::new(
        store.clone(),
        identity.clone(),
        EventHub::new(),
        risk,
        THRESHOLD,
    );
    Harness {
        store,
        identity,
        wallets,
        orchestrator,
    }
}

async fn harness() -> Harness {
    harness_with_risk(Arc::new(PermissiveRiskGate)).await
}

fn claims_for(user_id: Uuid) -> Claims {
    Claims {
        user_id,
        email: "test@kosh.in".into(),
        status: UserStatus::Active,
        account_kind: UserKind::User,
        roles: vec!["user".into()],
        permissions: vec![
            "wallet:wallet:read".into(),
            "wallet:wallet:write".into(),
            "transaction:transaction:read".into(),
            "transaction:transaction:write".into(),
        ],
        issued_at: epoch_secs(),
        expires_at: epoch_secs() + 3600,
    }
}

/// Active wallet with a seeded balance, owned by a fresh user id.
async fn funded_wallet(h: &Harness, balance: i64) -> (Claims, Uuid) {
    let user_id = Uuid::new_v4();
    let wallet = h.wallets.create(user_id, Currency::Inr).await.unwrap();
    h.wallets.activate(wallet.id).await.unwrap();
    if balance > 0 {
        h.wallets
            .credit(wallet.id, Paise(balance), Currency::Inr, "seed")
            .await
            .unwrap();
    }
    (claims_for(user_id), wallet.id)
}

#[tokio::test]
async fn test_transfer_happy_path() {
    let h = harness().await;
    let (u1, w1) = funded_wallet(&h, 5000).await;
    let (_u2, w2) = funded_wallet(&h, 0).await;

    let record = h
        .orchestrator
        .transfer(
            &u1,
            TransferInput {
                source_wallet_id: w1,
                destination_wallet_id: w2,
                amount: Paise(1500),
                currency: Currency::Inr,
                description: Some("lunch split".into()),
                verification_token: None,
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(record.status, TxStatus::Completed);
    assert_eq!(record.kind, TxKind::Transfer);

    let b1 = h.wallets.get_balance(w1).await.unwrap();
    let b2 = h.wallets.get_balance(w2).await.unwrap();
    assert_eq!(b1.balance, Paise(3500));
    assert_eq!(b2.balance, Paise(1500));

    // A matching balanced journal entry exists: debit source account,
    // credit destination account.
    let entry_id = record.journal_entry_id.unwrap();
    let (lines, w1_account, w2_account) = h
        .store
        .read(|t| {
            let lines: Vec<_> = t.lines_for_entry(entry_id).into_iter().cloned().collect();
            (
                lines,
                t.wallets[&w1].ledger_account_id,
                t.wallets[&w2].ledger_account_id,
            )
        })
        .await;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].account_id, w1_account);
    assert_eq!(lines[0].debit, Paise(1500));
    assert_eq!(lines[1].account_id, w2_account);
    assert_eq!(lines[1].credit, Paise(1500));

    // The wallet cache agrees with re-derivation from the journal alone.
    let derived = h.store.read(|t| derive_balance(t, w2_account, None)).await.unwrap();
    assert_eq!(derived, Paise(1500));
}

#[tokio::test]
async fn test_transfer_exact_balance_boundary() {
    let h = harness().await;
    let (u1, w1) = funded_wallet(&h, 1000).await;
    let (_u2, w2) = funded_wallet(&h, 0).await;

    // One unit more than available fails and changes nothing.
    let err = h
        .orchestrator
        .transfer(
            &u1,
            TransferInput {
                source_wallet_id: w1,
                destination_wallet_id: w2,
                amount: Paise(1001),
                currency: Currency::Inr,
                description: None,
                verification_token: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientFunds { .. }));
    assert_eq!(h.wallets.get_balance(w1).await.unwrap().balance, Paise(1000));
    assert_eq!(h.wallets.get_balance(w2).await.unwrap().balance, Paise(0));

    // The failed attempt stays observable.
    let page = h
        .orchestrator
        .list(
            &u1,
            ListFilter {
                status: Some(TxStatus::Failed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert!(page.transactions[0].failure_reason.is_some());

    // No journal entry was posted for the failure.
    let entries = h.store.read(|t| t.journal_entries.len()).await;
    let failed_entry = h
        .store
        .read(|t| t.transactions.values().any(|r| r.status == TxStatus::Failed && r.journal_entry_id.is_some()))
        .await;
    assert!(!failed_entry);

    // Exactly the full balance succeeds.
    h.orchestrator
        .transfer(
            &u1,
            TransferInput {
                source_wallet_id: w1,
                destination_wallet_id: w2,
                amount: Paise(1000),
                currency: Currency::Inr,
                description: None,
                verification_token: None,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.wallets.get_balance(w1).await.unwrap().balance, Paise(0));
    assert_eq!(h.store.read(|t| t.journal_entries.len()).await, entries + 1);
}

#[tokio::test]
async fn test_concurrent_transfers_linearize() {
    let h = harness().await;
    let (u1, w1) = funded_wallet(&h, 1000).await;
    let (_u2, w2) = funded_wallet(&h, 0).await;

    let mk = |h: &Harness, u1: Claims| {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .transfer(
                    &u1,
                    TransferInput {
                        source_wallet_id: w1,
                        destination_wallet_id: w2,
                        amount: Paise(700),
                        currency: Currency::Inr,
                        description: None,
                        verification_token: None,
                    },
                    None,
                )
                .await
        })
    };
    let t1 = mk(&h, u1.clone());
    let t2 = mk(&h, u1.clone());
    let r1 = t1.await.unwrap();
    let r2 = t2.await.unwrap();

    assert!(r1.is_ok() ^ r2.is_ok(), "exactly one concurrent debit wins");
    let loser = if r1.is_err() { r1.unwrap_err() } else { r2.unwrap_err() };
    assert!(matches!(loser, CoreError::InsufficientFunds { .. }));
    assert_eq!(h.wallets.get_balance(w1).await.unwrap().balance, Paise(300));
    assert_eq!(h.wallets.get_balance(w2).await.unwrap().balance, Paise(700));
}

#[tokio::test]
async fn test_step_up_enforced_for_high_value_transfer() {
    let h = harness().await;
    // Registered user so the paired admin channel exists.
    let reg = h
        .identity
        .register(
            "asha@kosh.in".into(),
            "9876543210".into(),
            "Asha".into(),
            "s3cret-pass".into(),
        )
        .await
        .unwrap();
    let w1 = reg.wallet.id;
    h.wallets.activate(w1).await.unwrap();
    h.wallets
        .credit(w1, Paise(100_000), Currency::Inr, "seed")
        .await
        .unwrap();
    let (_u2, w2) = funded_wallet(&h, 0).await;
    let u1 = claims_for(reg.user.id);

    let input = TransferInput {
        source_wallet_id: w1,
        destination_wallet_id: w2,
        amount: Paise(60_000),
        currency: Currency::Inr,
        description: None,
        verification_token: None,
    };

    // Without a token: 202-class VerificationRequired with a request id.
    let err = h.orchestrator.transfer(&u1, input.clone(), None).await.unwrap_err();
    let CoreError::VerificationRequired { request_id } = err else {
        panic!("expected VerificationRequired, got {err:?}");
    };

    // The paired user-admin reads the OTP out of band.
    let requests = h
        .identity
        .requests_for_admin(reg.admin.id, None)
        .await
        .unwrap();
    assert_eq!(requests[0].id, request_id);
    assert_eq!(requests[0].operation, VerificationOp::HighValueTransfer);
    let otp = requests[0].otp_code.clone();

    let (_, token) = h
        .identity
        .verify_otp(reg.user.id, request_id, &otp)
        .await
        .unwrap();

    // Retry with the token succeeds.
    let record = h
        .orchestrator
        .transfer(
            &u1,
            TransferInput {
                verification_token: Some(token.clone()),
                ..input.clone()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(record.status, TxStatus::Completed);
    assert_eq!(h.wallets.get_balance(w2).await.unwrap().balance, Paise(60_000));

    // The token is one-shot: reusing it fails.
    let err = h
        .orchestrator
        .transfer(
            &u1,
            TransferInput {
                verification_token: Some(token),
                ..input
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}

#[tokio::test]
async fn test_deposit_reversal_round_trip() {
    let h = harness().await;
    let (u1, w1) = funded_wallet(&h, 2500).await;

    let deposit = h
        .orchestrator
        .deposit(
            &u1,
            DepositInput {
                wallet_id: w1,
                amount: Paise(10_000),
                currency: Currency::Inr,
                description: Some("salary".into()),
                external_reference: Some("UTR-1001".into()),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.wallets.get_balance(w1).await.unwrap().balance, Paise(12_500));

    let reversal = h
        .orchestrator
        .reverse(&u1, deposit.id, None)
        .await
        .unwrap();
    assert_eq!(reversal.kind, TxKind::Reversal);
    assert_eq!(reversal.parent_id, Some(deposit.id));
    assert_eq!(reversal.status, TxStatus::Completed);

    // Balance returns to its pre-deposit value, the parent is reversed.
    assert_eq!(h.wallets.get_balance(w1).await.unwrap().balance, Paise(2500));
    let parent = h.orchestrator.get(&u1, deposit.id).await.unwrap();
    assert_eq!(parent.status, TxStatus::Reversed);

    // At most once.
    let err = h.orchestrator.reverse(&u1, deposit.id, None).await.unwrap_err();
    assert!(matches!(err, CoreError::AlreadyReversed));
}

#[tokio::test]
async fn test_idempotent_replay_returns_original_record() {
    let h = harness().await;
    let (u1, w1) = funded_wallet(&h, 0).await;

    let input = DepositInput {
        wallet_id: w1,
        amount: Paise(5_000),
        currency: Currency::Inr,
        description: None,
        external_reference: None,
    };
    let first = h
        .orchestrator
        .deposit(&u1, input.clone(), Some("dep-key-1"))
        .await
        .unwrap();
    let replay = h
        .orchestrator
        .deposit(&u1, input, Some("dep-key-1"))
        .await
        .unwrap();

    assert_eq!(first.id, replay.id);
    assert_eq!(first.journal_entry_id, replay.journal_entry_id);
    // Applied exactly once.
    assert_eq!(h.wallets.get_balance(w1).await.unwrap().balance, Paise(5_000));
    assert_eq!(h.store.read(|t| t.journal_entries.len()).await, 1);
}

#[tokio::test]
async fn test_risk_blocked_rejects_without_record() {
    let h = harness_with_risk(Arc::new(StaticRiskGate(Ok(RiskDecision::Blocked)))).await;
    let (u1, w1) = funded_wallet(&h, 1000).await;
    let (_u2, w2) = funded_wallet(&h, 0).await;

    let err = h
        .orchestrator
        .transfer(
            &u1,
            TransferInput {
                source_wallet_id: w1,
                destination_wallet_id: w2,
                amount: Paise(100),
                currency: Currency::Inr,
                description: None,
                verification_token: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::RiskRejected));
    assert_eq!(h.wallets.get_balance(w1).await.unwrap().balance, Paise(1000));
}

#[tokio::test]
async fn test_risk_outage_fails_open_below_threshold() {
    let h = harness_with_risk(Arc::new(StaticRiskGate(Err(CoreError::internal("down"))))).await;
    let (u1, w1) = funded_wallet(&h, 1000).await;
    let (_u2, w2) = funded_wallet(&h, 0).await;

    // Below the threshold the outage is permissive.
    let record = h
        .orchestrator
        .transfer(
            &u1,
            TransferInput {
                source_wallet_id: w1,
                destination_wallet_id: w2,
                amount: Paise(100),
                currency: Currency::Inr,
                description: None,
                verification_token: None,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(record.status, TxStatus::Completed);
}

#[tokio::test]
async fn test_simulated_deposit_completion_is_idempotent() {
    let h = harness().await;
    let (u1, w1) = funded_wallet(&h, 0).await;

    let pending = h
        .orchestrator
        .initiate_simulated_deposit(
            &u1,
            DepositInput {
                wallet_id: w1,
                amount: Paise(2_000),
                currency: Currency::Inr,
                description: None,
                external_reference: None,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(pending.status, TxStatus::Pending);

    // Drive completion directly (the scheduler is at-least-once; calling
    // repeatedly must apply the credit exactly once).
    let done = h
        .orchestrator
        .complete_simulated_deposit(pending.id)
        .await
        .unwrap();
    assert_eq!(done.status, TxStatus::Completed);
    let again = h
        .orchestrator
        .complete_simulated_deposit(pending.id)
        .await
        .unwrap();
    assert_eq!(again.status, TxStatus::Completed);
    assert_eq!(h.wallets.get_balance(w1).await.unwrap().balance, Paise(2_000));
}

#[tokio::test]
async fn test_listing_scope_and_filters() {
    let h = harness().await;
    let (u1, w1) = funded_wallet(&h, 10_000).await;
    let (u2, w2) = funded_wallet(&h, 0).await;

    h.orchestrator
        .transfer(
            &u1,
            TransferInput {
                source_wallet_id: w1,
                destination_wallet_id: w2,
                amount: Paise(1_000),
                currency: Currency::Inr,
                description: Some("rent".into()),
                verification_token: None,
            },
            None,
        )
        .await
        .unwrap();

    // Both participants see the transfer; a stranger does not.
    let page = h.orchestrator.list(&u2, ListFilter::default()).await.unwrap();
    assert_eq!(page.total_count, 1);
    let stranger = claims_for(Uuid::new_v4());
    let page = h
        .orchestrator
        .list(&stranger, ListFilter::default())
        .await
        .unwrap();
    assert_eq!(page.total_count, 0);

    // Search and amount filters.
    let page = h
        .orchestrator
        .list(
            &u1,
            ListFilter {
                search: Some("rent".into()),
                min_amount: Some(Paise(500)),
                max_amount: Some(Paise(2_000)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);

    // Admin scope with user filter.
    let mut admin = claims_for(Uuid::new_v4());
    admin.permissions.push("transaction:transaction:admin".into());
    let page = h
        .orchestrator
        .list(
            &admin,
            ListFilter {
                user_id: Some(u2.user_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
}

#[tokio::test]
async fn test_foreign_source_wallet_forbidden() {
    let h = harness().await;
    let (_u1, w1) = funded_wallet(&h, 1000).await;
    let (u2, w2) = funded_wallet(&h, 0).await;

    // u2 attempts to move money out of u1's wallet.
    let err = h
        .orchestrator
        .transfer(
            &u2,
            TransferInput {
                source_wallet_id: w1,
                destination_wallet_id: w2,
                amount: Paise(100),
                currency: Currency::Inr,
                description: None,
                verification_token: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}
