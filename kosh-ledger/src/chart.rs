use chrono::Utc;
use uuid::Uuid;

use kosh_common::model::{Account, AccountKind, AccountStatus};
use kosh_common::{CoreError, Currency, Result};
use kosh_store::Tables;

/// System asset account holding cash backing customer deposits.
pub const SYSTEM_CASH_CODE: &str = "SYS-CASH";
/// Parent liability account for customer funds.
pub const CUSTOMER_FUNDS_CODE: &str = "SYS-CUSTOMER-FUNDS";

pub fn create_account(
    tables: &mut Tables,
    code: String,
    name: String,
    kind: AccountKind,
    currency: Currency,
) -> Result<Account> {
    if code.trim().is_empty() {
        return Err(CoreError::Validation("account code must not be empty".into()));
    }
    if name.trim().is_empty() {
        return Err(CoreError::Validation("account name must not be empty".into()));
    }
    let account = Account {
        id: Uuid::new_v4(),
        code,
        name,
        kind,
        currency,
        status: AccountStatus::Active,
        created_at: Utc::now(),
    };
    tables.insert_account(account.clone())?;
    tracing::info!(code = %account.code, kind = ?account.kind, "account created");
    Ok(account)
}

/// Provisions the liability account mirroring one wallet.
pub fn create_wallet_account(tables: &mut Tables, wallet_id: Uuid, currency: Currency) -> Result<Account> {
    let short = &wallet_id.simple().to_string()[..12];
    create_account(
        tables,
        format!("WAL-{short}"),
        format!("wallet {wallet_id}"),
        AccountKind::Liability,
        currency,
    )
}

/// Seeds the system chart at boot. Idempotent: existing codes are left
/// untouched.
pub fn seed_chart(tables: &mut Tables, currency: Currency) -> Result<()> {
    for (code, name, kind) in [
        (SYSTEM_CASH_CODE, "system cash holding", AccountKind::Asset),
        (
            CUSTOMER_FUNDS_CODE,
            "customer funds",
            AccountKind::Liability,
        ),
    ] {
        if tables.account_by_code(code).is_none() {
            create_account(tables, code.into(), name.into(), kind, currency)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_chart_is_idempotent() {
        let mut t = Tables::default();
        seed_chart(&mut t, Currency::Inr).unwrap();
        seed_chart(&mut t, Currency::Inr).unwrap();
        assert_eq!(t.accounts.len(), 2);
        assert!(t.account_by_code(SYSTEM_CASH_CODE).is_some());
    }

    #[test]
    fn test_empty_code_rejected() {
        let mut t = Tables::default();
        let res = create_account(
            &mut t,
            "  ".into(),
            "x".into(),
            AccountKind::Asset,
            Currency::Inr,
        );
        assert!(matches!(res, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_wallet_account_code_derived_from_id() {
        let mut t = Tables::default();
        let wallet_id = Uuid::new_v4();
        let acc = create_wallet_account(&mut t, wallet_id, Currency::Inr).unwrap();
        assert!(acc.code.starts_with("WAL-"));
        assert_eq!(acc.kind, AccountKind::Liability);
    }
}
