use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use kosh_common::api;
use kosh_common::model::{AccountKind, EntryKind};
use kosh_common::{Currency, Result};
use kosh_identity::extract::AuthContext;
use kosh_ledger::LineSpec;

use crate::bootstrap::AppContext;

pub fn router() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/accounts", post(create_account))
        .route("/api/v1/accounts/{id}", get(get_account))
        .route("/api/v1/accounts/{id}/balance", get(get_balance))
        .route("/api/v1/accounts/{id}/entries", get(list_entries))
        .route("/api/v1/entries", post(post_entry))
}

#[derive(Deserialize)]
struct CreateAccountBody {
    code: String,
    name: String,
    kind: AccountKind,
    currency: Currency,
}

async fn create_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<CreateAccountBody>,
) -> Result<Response> {
    auth.require_permission("ledger:account:write")?;
    let account = ctx
        .ledger
        .create_account(body.code, body.name, body.kind, body.currency)
        .await?;
    Ok(api::created(account))
}

async fn get_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    auth.require_permission("ledger:account:read")?;
    Ok(api::ok(ctx.ledger.get_account(id).await?))
}

#[derive(Deserialize)]
struct BalanceQuery {
    as_of: Option<DateTime<Utc>>,
}

async fn get_balance(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Query(query): Query<BalanceQuery>,
) -> Result<Response> {
    auth.require_permission("ledger:account:read")?;
    let balance = ctx.ledger.get_balance(id, query.as_of).await?;
    Ok(api::ok(serde_json::json!({ "account_id": id, "balance": balance })))
}

#[derive(Deserialize)]
struct EntriesQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

async fn list_entries(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Query(query): Query<EntriesQuery>,
) -> Result<Response> {
    auth.require_permission("ledger:entry:read")?;
    Ok(api::ok(ctx.ledger.list_entries(id, query.from, query.to).await?))
}

#[derive(Deserialize)]
struct PostEntryBody {
    kind: EntryKind,
    description: String,
    lines: Vec<LineSpec>,
}

async fn post_entry(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<PostEntryBody>,
) -> Result<Response> {
    auth.require_permission("ledger:entry:write")?;
    let posted = ctx
        .ledger
        .post_entry(body.kind, body.description, body.lines)
        .await?;
    Ok(api::created(posted))
}
