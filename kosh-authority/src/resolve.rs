use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use kosh_store::Tables;

/// Collects a role and every ancestor up its parent chain.
///
/// The visited set terminates the walk on re-entry, so a cycle that somehow
/// reached the store cannot hang resolution.
pub fn ancestor_closure(tables: &Tables, role_id: Uuid) -> Vec<Uuid> {
    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut chain = Vec::new();
    let mut cursor = Some(role_id);
    while let Some(id) = cursor {
        if !visited.insert(id) {
            tracing::warn!(role = %id, "cycle detected in role hierarchy, terminating walk");
            break;
        }
        chain.push(id);
        cursor = tables.roles.get(&id).and_then(|r| r.parent_role_id);
    }
    chain
}

/// True if `candidate` is `role` itself or one of its descendants; used to
/// reject reparenting that would introduce a cycle.
pub fn would_cycle(tables: &Tables, role: Uuid, candidate_parent: Uuid) -> bool {
    if role == candidate_parent {
        return true;
    }
    // Walking up from the candidate: if we meet `role`, the candidate is a
    // descendant.
    ancestor_closure(tables, candidate_parent).contains(&role)
}

/// Effective permission names for a user at `now`.
///
/// Union of direct permission sets over the ancestor closure of every
/// currently-active, non-expired role assignment. Inactive roles contribute
/// nothing.
pub fn effective_permissions(tables: &Tables, user_id: Uuid, now: DateTime<Utc>) -> BTreeSet<String> {
    let mut collected: HashSet<Uuid> = HashSet::new();
    for assignment in tables.user_roles.values() {
        if assignment.user_id != user_id || !assignment.is_effective(now) {
            continue;
        }
        for role_id in ancestor_closure(tables, assignment.role_id) {
            collected.insert(role_id);
        }
    }

    let mut names = BTreeSet::new();
    for role_id in collected {
        let active = tables.roles.get(&role_id).map_or(false, |r| r.is_active);
        if !active {
            continue;
        }
        for link in tables.role_permissions.values() {
            if link.role_id != role_id {
                continue;
            }
            if let Some(permission) = tables.permissions.get(&link.permission_id) {
                names.insert(permission.name.clone());
            }
        }
    }
    names
}

/// Role names of a user's effective assignments, for token claims.
pub fn effective_role_names(tables: &Tables, user_id: Uuid, now: DateTime<Utc>) -> Vec<String> {
    let mut names: Vec<String> = tables
        .user_roles
        .values()
        .filter(|a| a.user_id == user_id && a.is_effective(now))
        .filter_map(|a| tables.roles.get(&a.role_id))
        .filter(|r| r.is_active)
        .map(|r| r.name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kosh_common::model::{Permission, Role, RolePermission, UserRole};

    fn role(tables: &mut Tables, name: &str, parent: Option<Uuid>) -> Uuid {
        let r = Role {
            id: Uuid::new_v4(),
            name: name.into(),
            parent_role_id: parent,
            is_system: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = r.id;
        tables.roles.insert(id, r);
        id
    }

    fn grant(tables: &mut Tables, role_id: Uuid, name: &str) {
        let p = Permission {
            id: Uuid::new_v4(),
            name: name.into(),
            service: "x".into(),
            resource: "y".into(),
            action: "z".into(),
            created_at: Utc::now(),
        };
        let pid = p.id;
        tables.permissions.insert(pid, p);
        let link = RolePermission {
            id: Uuid::new_v4(),
            role_id,
            permission_id: pid,
            created_at: Utc::now(),
        };
        tables.role_permissions.insert(link.id, link);
    }

    fn assign(tables: &mut Tables, user: Uuid, role_id: Uuid, expires: Option<DateTime<Utc>>) {
        let a = UserRole {
            id: Uuid::new_v4(),
            user_id: user,
            role_id,
            expires_at: expires,
            is_active: true,
            created_at: Utc::now(),
        };
        tables.user_roles.insert(a.id, a);
    }

    #[test]
    fn test_hierarchy_union() {
        let mut t = Tables::default();
        let parent = role(&mut t, "parent", None);
        let child = role(&mut t, "child", Some(parent));
        grant(&mut t, parent, "ledger:account:read");
        grant(&mut t, child, "ledger:account:write");

        let user = Uuid::new_v4();
        assign(&mut t, user, child, None);

        let perms = effective_permissions(&t, user, Utc::now());
        assert!(perms.contains("ledger:account:read"));
        assert!(perms.contains("ledger:account:write"));
    }

    #[test]
    fn test_deactivated_parent_loses_inherited_permission() {
        let mut t = Tables::default();
        let parent = role(&mut t, "parent", None);
        let child = role(&mut t, "child", Some(parent));
        grant(&mut t, parent, "ledger:account:read");
        grant(&mut t, child, "ledger:account:write");

        let user = Uuid::new_v4();
        assign(&mut t, user, child, None);
        t.roles.get_mut(&parent).unwrap().is_active = false;

        let perms = effective_permissions(&t, user, Utc::now());
        assert!(!perms.contains("ledger:account:read"));
        assert!(perms.contains("ledger:account:write"));
    }

    #[test]
    fn test_expired_assignment_is_inactive() {
        let mut t = Tables::default();
        let r = role(&mut t, "r", None);
        grant(&mut t, r, "wallet:wallet:read");
        let user = Uuid::new_v4();
        assign(&mut t, user, r, Some(Utc::now() - Duration::minutes(1)));

        assert!(effective_permissions(&t, user, Utc::now()).is_empty());
    }

    #[test]
    fn test_cycle_walk_terminates() {
        let mut t = Tables::default();
        let a = role(&mut t, "a", None);
        let b = role(&mut t, "b", Some(a));
        // Introduce a cycle behind the API's back.
        t.roles.get_mut(&a).unwrap().parent_role_id = Some(b);
        grant(&mut t, a, "x:y:z");

        let user = Uuid::new_v4();
        assign(&mut t, user, b, None);
        let perms = effective_permissions(&t, user, Utc::now());
        assert!(perms.contains("x:y:z"));
    }

    #[test]
    fn test_would_cycle() {
        let mut t = Tables::default();
        let a = role(&mut t, "a", None);
        let b = role(&mut t, "b", Some(a));
        let c = role(&mut t, "c", Some(b));
        assert!(would_cycle(&t, a, a), "self-parent");
        assert!(would_cycle(&t, a, c), "descendant as parent");
        assert!(!would_cycle(&t, c, a), "ancestor as parent is fine");
    }
}
