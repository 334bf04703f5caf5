use uuid::Uuid;

use kosh_common::{CoreError, Result};
use kosh_store::Tables;

/// Resolves the regular user paired to a user-admin account.
pub fn paired_user_for_admin(tables: &Tables, admin_id: Uuid) -> Result<Uuid> {
    tables
        .pair_for_admin(admin_id)
        .map(|p| p.user_id)
        .ok_or_else(|| CoreError::Forbidden("admin account has no paired user".into()))
}

/// Rewrites a user-admin's query scope to the paired user.
///
/// Any explicit target other than the paired user is refused; a user-admin
/// can never read across the pairing boundary.
pub fn admin_scope(tables: &Tables, admin_id: Uuid, requested: Option<Uuid>) -> Result<Uuid> {
    let paired = paired_user_for_admin(tables, admin_id)?;
    match requested {
        None => Ok(paired),
        Some(id) if id == paired => Ok(paired),
        Some(_) => Err(CoreError::Forbidden(
            "user-admin may only query its paired user".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kosh_common::model::UserAdminPair;

    fn tables_with_pair() -> (Tables, Uuid, Uuid) {
        let mut t = Tables::default();
        let user_id = Uuid::new_v4();
        let admin_id = Uuid::new_v4();
        t.insert_pair(UserAdminPair {
            id: Uuid::new_v4(),
            user_id,
            admin_id,
            created_at: Utc::now(),
        })
        .unwrap();
        (t, user_id, admin_id)
    }

    #[test]
    fn test_scope_rewritten_to_paired_user() {
        let (t, user_id, admin_id) = tables_with_pair();
        assert_eq!(admin_scope(&t, admin_id, None).unwrap(), user_id);
        assert_eq!(admin_scope(&t, admin_id, Some(user_id)).unwrap(), user_id);
    }

    #[test]
    fn test_foreign_target_forbidden() {
        let (t, _, admin_id) = tables_with_pair();
        assert!(matches!(
            admin_scope(&t, admin_id, Some(Uuid::new_v4())),
            Err(CoreError::Forbidden(_))
        ));
    }

    #[test]
    fn test_unpaired_admin_forbidden() {
        let t = Tables::default();
        assert!(admin_scope(&t, Uuid::new_v4(), None).is_err());
    }
}
