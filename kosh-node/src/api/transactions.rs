use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use kosh_common::api;
use kosh_common::Result;
use kosh_identity::extract::AuthContext;
use kosh_orchestrator::flows::{DepositInput, WithdrawalInput};
use kosh_orchestrator::transfer::TransferInput;
use kosh_orchestrator::ListFilter;

use crate::bootstrap::AppContext;

const WRITE: &str = "transaction:transaction:write";
const READ: &str = "transaction:transaction:read";

pub fn router() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/deposits", post(deposit))
        .route("/api/v1/withdrawals", post(withdrawal))
        .route("/api/v1/transfers", post(transfer))
        .route("/api/v1/simulated-deposits", post(simulated_deposit))
        .route("/api/v1/transactions", get(list))
        .route("/api/v1/transactions/{id}", get(get_transaction))
        .route("/api/v1/transactions/{id}/reverse", post(reverse))
}

async fn deposit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    headers: HeaderMap,
    Json(input): Json<DepositInput>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    let key = super::idem_key(&headers);
    let record = ctx
        .orchestrator
        .deposit(&auth.claims, input, key.as_deref())
        .await?;
    Ok(api::created(record))
}

async fn withdrawal(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    headers: HeaderMap,
    Json(input): Json<WithdrawalInput>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    let key = super::idem_key(&headers);
    let record = ctx
        .orchestrator
        .withdrawal(&auth.claims, input, key.as_deref())
        .await?;
    Ok(api::created(record))
}

async fn transfer(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    headers: HeaderMap,
    Json(input): Json<TransferInput>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    let key = super::idem_key(&headers);
    let record = ctx
        .orchestrator
        .transfer(&auth.claims, input, key.as_deref())
        .await?;
    Ok(api::created(record))
}

async fn simulated_deposit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    headers: HeaderMap,
    Json(input): Json<DepositInput>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    let key = super::idem_key(&headers);
    let record = ctx
        .orchestrator
        .initiate_simulated_deposit(&auth.claims, input, key.as_deref())
        .await?;
    Ok(api::created(record))
}

async fn list(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(filter): Query<ListFilter>,
) -> Result<Response> {
    auth.require_permission(READ)?;
    Ok(api::ok(ctx.orchestrator.list(&auth.claims, filter).await?))
}

async fn get_transaction(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    auth.require_permission(READ)?;
    Ok(api::ok(ctx.orchestrator.get(&auth.claims, id).await?))
}

async fn reverse(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    auth.require_permission(WRITE)?;
    let key = super::idem_key(&headers);
    let record = ctx
        .orchestrator
        .reverse(&auth.claims, id, key.as_deref())
        .await?;
    Ok(api::created(record))
}
