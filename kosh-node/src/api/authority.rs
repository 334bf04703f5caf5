use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use kosh_common::api;
use kosh_common::{CoreError, Result};
use kosh_identity::extract::AuthContext;

use crate::bootstrap::AppContext;

const READ: &str = "rbac:role:read";
const WRITE: &str = "rbac:role:write";

pub fn router() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/roles", get(list_roles).post(create_role))
        .route("/api/v1/roles/{id}/rename", post(rename_role))
        .route("/api/v1/roles/{id}/reparent", post(reparent_role))
        .route("/api/v1/roles/{id}/activate", post(activate_role))
        .route("/api/v1/roles/{id}/deactivate", post(deactivate_role))
        .route("/api/v1/roles/{id}/permissions", post(assign_permission))
        .route(
            "/api/v1/roles/{id}/permissions/{permission_id}",
            delete(revoke_permission),
        )
        .route("/api/v1/permissions", get(list_permissions).post(create_permission))
        .route("/api/v1/permissions/check", post(check))
        .route("/api/v1/permissions/check-many", post(check_many))
        .route("/api/v1/users/{id}/roles", post(assign_role))
        .route("/api/v1/users/{id}/roles/{role_id}", delete(revoke_role))
        .route("/api/v1/users/{id}/permissions", get(user_permissions))
}

async fn list_roles(State(ctx): State<AppContext>, auth: AuthContext) -> Result<Response> {
    auth.require_permission(READ)?;
    Ok(api::ok(ctx.authority.list_roles().await))
}

#[derive(Deserialize)]
struct CreateRoleBody {
    name: String,
    parent_role_id: Option<Uuid>,
}

async fn create_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<CreateRoleBody>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    let role = ctx
        .authority
        .create_role(body.name, body.parent_role_id)
        .await?;
    Ok(api::created(role))
}

#[derive(Deserialize)]
struct RenameBody {
    name: String,
}

async fn rename_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<RenameBody>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    Ok(api::ok(ctx.authority.rename_role(id, body.name).await?))
}

#[derive(Deserialize)]
struct ReparentBody {
    parent_role_id: Option<Uuid>,
}

async fn reparent_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<ReparentBody>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    Ok(api::ok(
        ctx.authority.reparent_role(id, body.parent_role_id).await?,
    ))
}

async fn activate_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    Ok(api::ok(ctx.authority.set_role_active(id, true).await?))
}

async fn deactivate_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    Ok(api::ok(ctx.authority.set_role_active(id, false).await?))
}

async fn list_permissions(State(ctx): State<AppContext>, auth: AuthContext) -> Result<Response> {
    auth.require_permission(READ)?;
    Ok(api::ok(ctx.authority.list_permissions().await))
}

#[derive(Deserialize)]
struct CreatePermissionBody {
    name: String,
}

async fn create_permission(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<CreatePermissionBody>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    Ok(api::created(ctx.authority.create_permission(body.name).await?))
}

#[derive(Deserialize)]
struct AssignPermissionBody {
    permission_id: Uuid,
}

async fn assign_permission(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignPermissionBody>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    ctx.authority.assign_permission(id, body.permission_id).await?;
    Ok(api::no_content())
}

async fn revoke_permission(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    ctx.authority.revoke_permission(id, permission_id).await?;
    Ok(api::no_content())
}

#[derive(Deserialize)]
struct AssignRoleBody {
    role_id: Uuid,
    expires_at: Option<DateTime<Utc>>,
}

async fn assign_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(body): Json<AssignRoleBody>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    let assignment = ctx
        .authority
        .assign_role(user_id, body.role_id, body.expires_at)
        .await?;
    Ok(api::created(assignment))
}

async fn revoke_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    ctx.authority.revoke_role(user_id, role_id).await?;
    Ok(api::no_content())
}

/// Effective permissions for a user: self-service, or admin read.
async fn user_permissions(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Response> {
    if user_id != auth.user_id() && auth.require_permission(READ).is_err() {
        return Err(CoreError::Forbidden(
            "reading another user's permissions requires admin scope".into(),
        ));
    }
    Ok(api::ok(ctx.authority.get_user_permissions(user_id).await))
}

#[derive(Deserialize)]
struct CheckBody {
    permission: String,
}

async fn check(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<CheckBody>,
) -> Result<Response> {
    let allowed = ctx.authority.check(auth.user_id(), &body.permission).await;
    Ok(api::ok(serde_json::json!({ "allowed": allowed })))
}

#[derive(Deserialize)]
struct CheckManyBody {
    permissions: Vec<String>,
}

async fn check_many(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<CheckManyBody>,
) -> Result<Response> {
    let result = ctx
        .authority
        .check_many(auth.user_id(), &body.permissions)
        .await;
    Ok(api::ok(result))
}
