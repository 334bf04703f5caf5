use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use kosh_common::api;
use kosh_common::model::Wallet;
use kosh_common::{CoreError, Currency, Paise, Result};
use kosh_identity::extract::AuthContext;

use crate::bootstrap::AppContext;

const MANAGE: &str = "wallet:wallet:manage";

pub fn router() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/wallets", get(list_own).post(create))
        .route("/api/v1/wallets/{id}", get(get_wallet))
        .route("/api/v1/wallets/{id}/balance", get(get_balance))
        .route("/api/v1/wallets/{id}/activate", post(activate))
        .route("/api/v1/wallets/{id}/freeze", post(freeze))
        .route("/api/v1/wallets/{id}/unfreeze", post(unfreeze))
        .route("/api/v1/wallets/{id}/close", post(close))
        .route("/api/v1/wallets/{id}/holds", post(place_hold))
        .route("/api/v1/wallets/{id}/holds/{hold_id}/release", post(release_hold))
}

/// Owner or an operator with the manage permission.
fn authorize(auth: &AuthContext, wallet: &Wallet) -> Result<()> {
    if wallet.user_id == auth.user_id() || auth.claims.has_permission(MANAGE) {
        Ok(())
    } else {
        Err(CoreError::not_found("wallet"))
    }
}

async fn list_own(State(ctx): State<AppContext>, auth: AuthContext) -> Result<Response> {
    auth.require_permission("wallet:wallet:read")?;
    let wallets = ctx.wallets.wallets_for_user(auth.user_id()).await;
    Ok(api::ok(wallets))
}

async fn create(State(ctx): State<AppContext>, auth: AuthContext) -> Result<Response> {
    auth.require_permission("wallet:wallet:write")?;
    let wallet = ctx.wallets.create(auth.user_id(), Currency::Inr).await?;
    Ok(api::created(wallet))
}

async fn get_wallet(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let wallet = ctx.wallets.get(id).await?;
    authorize(&auth, &wallet)?;
    Ok(api::ok(wallet))
}

async fn get_balance(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let wallet = ctx.wallets.get(id).await?;
    authorize(&auth, &wallet)?;
    Ok(api::ok(ctx.wallets.get_balance(id).await?))
}

async fn activate(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    auth.require_permission(MANAGE)?;
    Ok(api::ok(ctx.wallets.activate(id).await?))
}

#[derive(Deserialize)]
struct ReasonBody {
    reason: String,
}

async fn freeze(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Response> {
    auth.require_permission(MANAGE)?;
    Ok(api::ok(ctx.wallets.freeze(id, body.reason).await?))
}

async fn unfreeze(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    auth.require_permission(MANAGE)?;
    Ok(api::ok(ctx.wallets.unfreeze(id).await?))
}

async fn close(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Response> {
    auth.require_permission(MANAGE)?;
    Ok(api::ok(ctx.wallets.close(id, body.reason).await?))
}

#[derive(Deserialize)]
struct HoldBody {
    amount: Paise,
}

async fn place_hold(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<HoldBody>,
) -> Result<Response> {
    let wallet = ctx.wallets.get(id).await?;
    authorize(&auth, &wallet)?;
    Ok(api::created(ctx.wallets.hold(id, body.amount).await?))
}

async fn release_hold(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((id, hold_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    let wallet = ctx.wallets.get(id).await?;
    authorize(&auth, &wallet)?;
    Ok(api::ok(ctx.wallets.release(id, hold_id).await?))
}
