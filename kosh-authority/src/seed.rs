use chrono::Utc;
use uuid::Uuid;

use kosh_common::model::{Permission, Role, RolePermission};
use kosh_common::Result;
use kosh_store::Tables;

use crate::grammar::parse_permission_name;

/// Built-in role names. These are system-flagged and immutable.
pub const ROLE_USER: &str = "user";
pub const ROLE_USER_ADMIN: &str = "user_admin";
pub const ROLE_OPS_ADMIN: &str = "ops_admin";

const USER_PERMISSIONS: &[&str] = &[
    "wallet:wallet:read",
    "wallet:wallet:write",
    "transaction:transaction:read",
    "transaction:transaction:write",
    "identity:profile:read",
    "identity:profile:write",
];

const USER_ADMIN_PERMISSIONS: &[&str] = &["identity:verification:read"];

const OPS_ADMIN_PERMISSIONS: &[&str] = &[
    "ledger:account:read",
    "ledger:account:write",
    "ledger:entry:read",
    "ledger:entry:write",
    "wallet:wallet:manage",
    "transaction:transaction:admin",
    "identity:user:manage",
    "identity:kyc:review",
    "rbac:role:read",
    "rbac:role:write",
];

/// Seeds the built-in roles and their permission sets. Idempotent.
pub fn seed_builtin_roles(tables: &mut Tables) -> Result<()> {
    // ops_admin inherits the regular user surface.
    let user = ensure_role(tables, ROLE_USER, None)?;
    ensure_role(tables, ROLE_USER_ADMIN, None)?;
    ensure_role(tables, ROLE_OPS_ADMIN, Some(user))?;

    for (role_name, perms) in [
        (ROLE_USER, USER_PERMISSIONS),
        (ROLE_USER_ADMIN, USER_ADMIN_PERMISSIONS),
        (ROLE_OPS_ADMIN, OPS_ADMIN_PERMISSIONS),
    ] {
        let role_id = tables
            .role_by_name(role_name)
            .map(|r| r.id)
            .expect("role just ensured");
        for name in perms {
            let pid = ensure_permission(tables, name)?;
            let linked = tables
                .role_permissions
                .values()
                .any(|l| l.role_id == role_id && l.permission_id == pid);
            if !linked {
                tables.insert_role_permission(RolePermission {
                    id: Uuid::new_v4(),
                    role_id,
                    permission_id: pid,
                    created_at: Utc::now(),
                })?;
            }
        }
    }
    Ok(())
}

fn ensure_role(tables: &mut Tables, name: &str, parent: Option<Uuid>) -> Result<Uuid> {
    if let Some(existing) = tables.role_by_name(name) {
        return Ok(existing.id);
    }
    let role = Role {
        id: Uuid::new_v4(),
        name: name.into(),
        parent_role_id: parent,
        is_system: true,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let id = role.id;
    tables.insert_role(role)?;
    Ok(id)
}

fn ensure_permission(tables: &mut Tables, name: &str) -> Result<Uuid> {
    if let Some(existing) = tables.permission_by_name(name) {
        return Ok(existing.id);
    }
    let (service, resource, action) = parse_permission_name(name)?;
    let permission = Permission {
        id: Uuid::new_v4(),
        name: name.into(),
        service,
        resource,
        action,
        created_at: Utc::now(),
    };
    let id = permission.id;
    tables.insert_permission(permission)?;
    Ok(id)
}
