//! Role/permission authority.
//!
//! Decisions are resolved here and embedded into bearer credentials at
//! sign-in; every boundary then enforces them from the claims. Roles form a
//! hierarchy through parent pointers; resolution walks the ancestor chain
//! with a cycle guard.

pub mod grammar;
pub mod resolve;
pub mod seed;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use kosh_common::model::{Permission, Role, RolePermission, UserRole};
use kosh_common::{CoreError, Result};
use kosh_store::Store;

#[derive(Clone)]
pub struct AuthorityService {
    store: Store,
}

impl AuthorityService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    // --- roles ---

    pub async fn create_role(&self, name: String, parent_role_id: Option<Uuid>) -> Result<Role> {
        self.store
            .write(|t| {
                if name.trim().is_empty() {
                    return Err(CoreError::Validation("role name must not be empty".into()));
                }
                if let Some(parent) = parent_role_id {
                    t.require_role(parent)?;
                }
                let role = Role {
                    id: Uuid::new_v4(),
                    name,
                    parent_role_id,
                    is_system: false,
                    is_active: true,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                t.insert_role(role.clone())?;
                tracing::info!(role = %role.name, "role created");
                Ok(role)
            })
            .await
    }

    pub async fn rename_role(&self, id: Uuid, name: String) -> Result<Role> {
        self.store
            .write(|t| {
                Self::require_mutable(t.require_role(id)?)?;
                if t.role_by_name(&name).map_or(false, |r| r.id != id) {
                    return Err(CoreError::Conflict(format!("role {name} already exists")));
                }
                let role = t.roles.get_mut(&id).expect("role exists");
                role.name = name;
                role.updated_at = Utc::now();
                Ok(role.clone())
            })
            .await
    }

    /// Reparents a role. Rejected if the proposed parent is the role itself
    /// or one of its descendants.
    pub async fn reparent_role(&self, id: Uuid, parent: Option<Uuid>) -> Result<Role> {
        self.store
            .write(|t| {
                Self::require_mutable(t.require_role(id)?)?;
                if let Some(parent_id) = parent {
                    t.require_role(parent_id)?;
                    if resolve::would_cycle(t, id, parent_id) {
                        return Err(CoreError::Validation(
                            "role may not be its own ancestor".into(),
                        ));
                    }
                }
                let role = t.roles.get_mut(&id).expect("role exists");
                role.parent_role_id = parent;
                role.updated_at = Utc::now();
                Ok(role.clone())
            })
            .await
    }

    pub async fn set_role_active(&self, id: Uuid, is_active: bool) -> Result<Role> {
        self.store
            .write(|t| {
                Self::require_mutable(t.require_role(id)?)?;
                let role = t.roles.get_mut(&id).expect("role exists");
                role.is_active = is_active;
                role.updated_at = Utc::now();
                Ok(role.clone())
            })
            .await
    }

    pub async fn get_role(&self, id: Uuid) -> Result<Role> {
        self.store.read(|t| t.require_role(id).cloned()).await
    }

    pub async fn list_roles(&self) -> Vec<Role> {
        self.store
            .read(|t| {
                let mut roles: Vec<Role> = t.roles.values().cloned().collect();
                roles.sort_by(|a, b| a.name.cmp(&b.name));
                roles
            })
            .await
    }

    fn require_mutable(role: &Role) -> Result<()> {
        if role.is_system {
            Err(CoreError::Forbidden("system roles are immutable".into()))
        } else {
            Ok(())
        }
    }

    // --- permissions ---

    pub async fn create_permission(&self, name: String) -> Result<Permission> {
        self.store
            .write(|t| {
                let (service, resource, action) = grammar::parse_permission_name(&name)?;
                let permission = Permission {
                    id: Uuid::new_v4(),
                    name,
                    service,
                    resource,
                    action,
                    created_at: Utc::now(),
                };
                t.insert_permission(permission.clone())?;
                Ok(permission)
            })
            .await
    }

    pub async fn list_permissions(&self) -> Vec<Permission> {
        self.store
            .read(|t| {
                let mut permissions: Vec<Permission> = t.permissions.values().cloned().collect();
                permissions.sort_by(|a, b| a.name.cmp(&b.name));
                permissions
            })
            .await
    }

    // --- assignments ---

    pub async fn assign_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        self.store
            .write(|t| {
                Self::require_mutable(t.require_role(role_id)?)?;
                if !t.permissions.contains_key(&permission_id) {
                    return Err(CoreError::not_found("permission"));
                }
                t.insert_role_permission(RolePermission {
                    id: Uuid::new_v4(),
                    role_id,
                    permission_id,
                    created_at: Utc::now(),
                })
            })
            .await
    }

    pub async fn revoke_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        self.store
            .write(|t| {
                Self::require_mutable(t.require_role(role_id)?)?;
                let link = t
                    .role_permissions
                    .values()
                    .find(|l| l.role_id == role_id && l.permission_id == permission_id)
                    .map(|l| l.id)
                    .ok_or(CoreError::not_found("role permission"))?;
                t.role_permissions.remove(&link);
                Ok(())
            })
            .await
    }

    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<UserRole> {
        self.store
            .write(|t| {
                t.require_user(user_id)?;
                t.require_role(role_id)?;
                let assignment = UserRole {
                    id: Uuid::new_v4(),
                    user_id,
                    role_id,
                    expires_at,
                    is_active: true,
                    created_at: Utc::now(),
                };
                t.insert_user_role(assignment.clone())?;
                Ok(assignment)
            })
            .await
    }

    pub async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<()> {
        self.store
            .write(|t| {
                let id = t
                    .user_roles
                    .values()
                    .find(|a| a.user_id == user_id && a.role_id == role_id)
                    .map(|a| a.id)
                    .ok_or(CoreError::not_found("role assignment"))?;
                t.user_roles.remove(&id);
                Ok(())
            })
            .await
    }

    // --- resolution ---

    pub async fn get_user_permissions(&self, user_id: Uuid) -> Vec<String> {
        self.store
            .read(|t| {
                resolve::effective_permissions(t, user_id, Utc::now())
                    .into_iter()
                    .collect()
            })
            .await
    }

    pub async fn get_user_roles(&self, user_id: Uuid) -> Vec<String> {
        self.store
            .read(|t| resolve::effective_role_names(t, user_id, Utc::now()))
            .await
    }

    pub async fn check(&self, user_id: Uuid, permission: &str) -> bool {
        self.store
            .read(|t| {
                resolve::effective_permissions(t, user_id, Utc::now()).contains(permission)
            })
            .await
    }

    pub async fn check_many(
        &self,
        user_id: Uuid,
        permissions: &[String],
    ) -> HashMap<String, bool> {
        self.store
            .read(|t| {
                let effective = resolve::effective_permissions(t, user_id, Utc::now());
                permissions
                    .iter()
                    .map(|p| (p.clone(), effective.contains(p)))
                    .collect()
            })
            .await
    }
}
