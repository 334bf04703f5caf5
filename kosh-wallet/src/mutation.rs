use chrono::Utc;
use uuid::Uuid;

use kosh_common::model::{
    Hold, HoldStatus, MutationKind, Wallet, WalletMutation, WalletStatus,
};
use kosh_common::{CoreError, Currency, Paise, Result};
use kosh_store::Tables;

/// Applies a debit inside an open store transaction.
///
/// The caller must already hold the wallet's row lock. A replayed
/// idempotency key returns the original mutation without touching the
/// balance.
pub fn apply_debit(
    tables: &mut Tables,
    wallet_id: Uuid,
    amount: Paise,
    currency: Currency,
    idem_key: &str,
) -> Result<WalletMutation> {
    if let Some(existing) = tables.mutation_by_key(wallet_id, idem_key) {
        return Ok(existing.clone());
    }
    let amount = amount.require_positive()?;

    let wallet = tables.require_wallet_mut(wallet_id)?;
    if wallet.currency != currency {
        return Err(CoreError::CurrencyMismatch);
    }
    match wallet.status {
        WalletStatus::Active => {}
        WalletStatus::Frozen => return Err(CoreError::AccountFrozen),
        _ => {
            return Err(CoreError::WalletStateInvalid { operation: "debit" });
        }
    }
    if amount > wallet.available_balance {
        return Err(CoreError::InsufficientFunds {
            available: wallet.available_balance,
            requested: amount,
        });
    }

    wallet.balance = wallet.balance.checked_sub(amount)?;
    wallet.available_balance = wallet.available_balance.checked_sub(amount)?;
    wallet.updated_at = Utc::now();
    let balance_after = wallet.balance;

    let mutation = record_mutation(
        tables,
        wallet_id,
        idem_key,
        MutationKind::Debit,
        amount,
        balance_after,
    );
    tracing::debug!(wallet = %wallet_id, amount = %amount, balance = %balance_after, "debit applied");
    Ok(mutation)
}

/// Applies a credit inside an open store transaction. Frozen wallets accept
/// credits; pending and closed ones do not.
pub fn apply_credit(
    tables: &mut Tables,
    wallet_id: Uuid,
    amount: Paise,
    currency: Currency,
    idem_key: &str,
) -> Result<WalletMutation> {
    if let Some(existing) = tables.mutation_by_key(wallet_id, idem_key) {
        return Ok(existing.clone());
    }
    let amount = amount.require_positive()?;

    let wallet = tables.require_wallet_mut(wallet_id)?;
    if wallet.currency != currency {
        return Err(CoreError::CurrencyMismatch);
    }
    if !matches!(wallet.status, WalletStatus::Active | WalletStatus::Frozen) {
        return Err(CoreError::WalletStateInvalid { operation: "credit" });
    }

    wallet.balance = wallet.balance.checked_add(amount)?;
    wallet.available_balance = wallet.available_balance.checked_add(amount)?;
    wallet.updated_at = Utc::now();
    let balance_after = wallet.balance;

    let mutation = record_mutation(
        tables,
        wallet_id,
        idem_key,
        MutationKind::Credit,
        amount,
        balance_after,
    );
    tracing::debug!(wallet = %wallet_id, amount = %amount, balance = %balance_after, "credit applied");
    Ok(mutation)
}

fn record_mutation(
    tables: &mut Tables,
    wallet_id: Uuid,
    idem_key: &str,
    kind: MutationKind,
    amount: Paise,
    balance_after: Paise,
) -> WalletMutation {
    let mutation = WalletMutation {
        id: Uuid::new_v4(),
        wallet_id,
        idem_key: idem_key.to_string(),
        kind,
        amount,
        balance_after,
        created_at: Utc::now(),
    };
    tables.wallet_mutations.insert(mutation.id, mutation.clone());
    mutation
}

/// Reserves part of the available balance without changing the balance.
pub fn place_hold(tables: &mut Tables, wallet_id: Uuid, amount: Paise) -> Result<Hold> {
    let amount = amount.require_positive()?;
    let wallet = tables.require_wallet_mut(wallet_id)?;
    if wallet.status != WalletStatus::Active {
        return Err(CoreError::WalletStateInvalid { operation: "hold" });
    }
    if amount > wallet.available_balance {
        return Err(CoreError::InsufficientFunds {
            available: wallet.available_balance,
            requested: amount,
        });
    }
    wallet.available_balance = wallet.available_balance.checked_sub(amount)?;
    wallet.updated_at = Utc::now();

    let hold = Hold {
        id: Uuid::new_v4(),
        wallet_id,
        amount,
        status: HoldStatus::Active,
        created_at: Utc::now(),
        resolved_at: None,
    };
    tables.wallet_holds.insert(hold.id, hold.clone());
    Ok(hold)
}

/// Returns a hold's reservation to the available balance.
pub fn release_hold(tables: &mut Tables, hold_id: Uuid) -> Result<Hold> {
    let hold = tables
        .wallet_holds
        .get(&hold_id)
        .cloned()
        .ok_or(CoreError::not_found("hold"))?;
    if hold.status != HoldStatus::Active {
        return Err(CoreError::WalletStateInvalid {
            operation: "hold release",
        });
    }
    let wallet = tables.require_wallet_mut(hold.wallet_id)?;
    wallet.available_balance = wallet.available_balance.checked_add(hold.amount)?;
    wallet.updated_at = Utc::now();

    let hold = tables.wallet_holds.get_mut(&hold_id).expect("hold exists");
    hold.status = HoldStatus::Released;
    hold.resolved_at = Some(Utc::now());
    Ok(hold.clone())
}

/// Converts an active hold into a committed debit.
pub fn capture_hold(tables: &mut Tables, hold_id: Uuid, idem_key: &str) -> Result<WalletMutation> {
    let hold = tables
        .wallet_holds
        .get(&hold_id)
        .cloned()
        .ok_or(CoreError::not_found("hold"))?;
    if hold.status != HoldStatus::Active {
        return Err(CoreError::WalletStateInvalid {
            operation: "hold capture",
        });
    }

    let wallet = tables.require_wallet_mut(hold.wallet_id)?;
    if wallet.status != WalletStatus::Active {
        return Err(CoreError::WalletStateInvalid { operation: "debit" });
    }
    // The reservation already left available_balance; only balance moves now.
    wallet.balance = wallet.balance.checked_sub(hold.amount)?;
    wallet.updated_at = Utc::now();
    let balance_after = wallet.balance;

    let marker = tables.wallet_holds.get_mut(&hold_id).expect("hold exists");
    marker.status = HoldStatus::Captured;
    marker.resolved_at = Some(Utc::now());

    Ok(record_mutation(
        tables,
        hold.wallet_id,
        idem_key,
        MutationKind::Debit,
        hold.amount,
        balance_after,
    ))
}

/// Invariant check used by tests and the re-derivation pass: the balance
/// equals the signed sum of committed mutations.
pub fn derived_balance(tables: &Tables, wallet_id: Uuid) -> i64 {
    tables
        .wallet_mutations
        .values()
        .filter(|m| m.wallet_id == wallet_id)
        .map(|m| m.signed_delta())
        .sum()
}

pub fn invariants_hold(wallet: &Wallet) -> bool {
    Paise::ZERO <= wallet.available_balance && wallet.available_balance <= wallet.balance
}
