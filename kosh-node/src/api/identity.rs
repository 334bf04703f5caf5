use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kosh_common::api;
use kosh_common::model::{PostalAddress, User, UserKind, UserStatus};
use kosh_common::{CoreError, Result};
use kosh_identity::extract::AuthContext;

use crate::bootstrap::AppContext;

pub fn router() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/register", post(register))
        .route("/api/v1/login", post(login))
        .route("/api/v1/logout", post(logout))
        .route("/api/v1/logout-all", post(logout_all))
        .route("/api/v1/me", get(me))
        .route("/api/v1/password", post(change_password))
        .route("/api/v1/password-reset", post(initiate_reset))
        .route("/api/v1/password-reset/complete", post(complete_reset))
        .route("/api/v1/verifications", get(list_verifications))
        .route("/api/v1/verifications/{id}/verify", post(verify_otp))
        .route("/api/v1/verifications/{id}/cancel", post(cancel_verification))
        .route("/api/v1/kyc", get(get_kyc).post(submit_kyc))
        .route("/api/v1/kyc/{user_id}/approve", post(approve_kyc))
        .route("/api/v1/kyc/{user_id}/reject", post(reject_kyc))
        .route("/api/v1/users/{id}/status", post(set_user_status))
}

/// Public view of a user; the password hash never leaves the service.
#[derive(Debug, Serialize)]
struct UserView {
    id: Uuid,
    email: String,
    phone: Option<String>,
    display_name: String,
    status: UserStatus,
    kind: UserKind,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            phone: u.phone,
            display_name: u.display_name,
            status: u.status,
            kind: u.kind,
        }
    }
}

#[derive(Deserialize)]
struct RegisterBody {
    email: String,
    phone: String,
    display_name: String,
    password: String,
}

async fn register(
    State(ctx): State<AppContext>,
    Json(body): Json<RegisterBody>,
) -> Result<Response> {
    let registration = ctx
        .identity
        .register(body.email, body.phone, body.display_name, body.password)
        .await?;
    Ok(api::created(serde_json::json!({
        "user": UserView::from(registration.user),
        "admin": UserView::from(registration.admin),
        "wallet": registration.wallet,
    })))
}

#[derive(Deserialize)]
struct LoginBody {
    identifier: String,
    password: String,
    #[serde(default = "default_kind")]
    account_kind: UserKind,
}

fn default_kind() -> UserKind {
    UserKind::User
}

async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Result<Response> {
    let signed = ctx
        .identity
        .sign_in(
            &body.identifier,
            &body.password,
            body.account_kind,
            super::client_ip(&headers),
            super::user_agent(&headers),
        )
        .await?;
    Ok(api::ok(serde_json::json!({
        "token": signed.token,
        "user": UserView::from(signed.user),
        "roles": signed.roles,
        "permissions": signed.permissions,
        "expires_at": signed.expires_at,
    })))
}

async fn logout(State(ctx): State<AppContext>, auth: AuthContext) -> Result<Response> {
    ctx.identity.logout(&auth.token).await?;
    Ok(api::no_content())
}

async fn logout_all(State(ctx): State<AppContext>, auth: AuthContext) -> Result<Response> {
    ctx.identity.logout_all(auth.user_id()).await?;
    Ok(api::no_content())
}

async fn me(State(ctx): State<AppContext>, auth: AuthContext) -> Result<Response> {
    let user = ctx.identity.get_user(auth.user_id()).await?;
    Ok(api::ok(serde_json::json!({
        "user": UserView::from(user),
        "roles": auth.claims.roles,
        "permissions": auth.claims.permissions,
    })))
}

#[derive(Deserialize)]
struct ChangePasswordBody {
    current_password: String,
    new_password: String,
    verification_token: Option<String>,
}

async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<ChangePasswordBody>,
) -> Result<Response> {
    ctx.identity
        .change_password(
            auth.user_id(),
            &body.current_password,
            &body.new_password,
            body.verification_token.as_deref(),
        )
        .await?;
    Ok(api::no_content())
}

#[derive(Deserialize)]
struct InitiateResetBody {
    identifier: String,
}

/// Unauthenticated: a locked-out user starts here. Always answers with a
/// verification-required envelope.
async fn initiate_reset(
    State(ctx): State<AppContext>,
    Json(body): Json<InitiateResetBody>,
) -> Result<Response> {
    Err(ctx.identity.initiate_password_reset(&body.identifier).await)
}

#[derive(Deserialize)]
struct CompleteResetBody {
    identifier: String,
    request_id: Uuid,
    otp: String,
    new_password: String,
}

async fn complete_reset(
    State(ctx): State<AppContext>,
    Json(body): Json<CompleteResetBody>,
) -> Result<Response> {
    ctx.identity
        .complete_password_reset(&body.identifier, body.request_id, &body.otp, &body.new_password)
        .await?;
    Ok(api::no_content())
}

#[derive(Deserialize)]
struct VerificationQuery {
    user_id: Option<Uuid>,
}

/// The paired-admin OTP read. Only user-admin accounts may call this, and
/// only for their paired user.
async fn list_verifications(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<VerificationQuery>,
) -> Result<Response> {
    if !auth.is_user_admin() {
        return Err(CoreError::Forbidden(
            "verification codes are readable only by user-admin accounts".into(),
        ));
    }
    auth.require_permission("identity:verification:read")?;
    let requests = ctx
        .identity
        .requests_for_admin(auth.user_id(), query.user_id)
        .await?;
    Ok(api::ok(requests))
}

#[derive(Deserialize)]
struct VerifyBody {
    otp: String,
}

async fn verify_otp(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<VerifyBody>,
) -> Result<Response> {
    let (request, verification_token) =
        ctx.identity.verify_otp(auth.user_id(), id, &body.otp).await?;
    Ok(api::ok(serde_json::json!({
        "request_id": request.id,
        "status": request.status,
        "verification_token": verification_token,
    })))
}

async fn cancel_verification(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let request = ctx.identity.cancel_verification(auth.user_id(), id).await?;
    Ok(api::ok(serde_json::json!({
        "request_id": request.id,
        "status": request.status,
    })))
}

async fn get_kyc(State(ctx): State<AppContext>, auth: AuthContext) -> Result<Response> {
    let record = ctx.identity.get_kyc(auth.user_id()).await?;
    Ok(api::ok(record))
}

#[derive(Deserialize)]
struct KycBody {
    pan: String,
    aadhaar: String,
    date_of_birth: NaiveDate,
    address: PostalAddress,
}

async fn submit_kyc(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<KycBody>,
) -> Result<Response> {
    let record = ctx
        .identity
        .submit_kyc(
            auth.user_id(),
            body.pan,
            body.aadhaar,
            body.date_of_birth,
            body.address,
        )
        .await?;
    Ok(api::ok(record))
}

async fn approve_kyc(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Response> {
    auth.require_permission("identity:kyc:review")?;
    let record = ctx.identity.approve_kyc(user_id).await?;
    Ok(api::ok(record))
}

#[derive(Deserialize)]
struct RejectBody {
    reason: String,
}

async fn reject_kyc(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(body): Json<RejectBody>,
) -> Result<Response> {
    auth.require_permission("identity:kyc:review")?;
    let record = ctx.identity.reject_kyc(user_id, body.reason).await?;
    Ok(api::ok(record))
}

#[derive(Deserialize)]
struct StatusBody {
    status: UserStatus,
}

async fn set_user_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Response> {
    auth.require_permission("identity:user:manage")?;
    let user = ctx.identity.set_user_status(id, body.status).await?;
    Ok(api::ok(UserView::from(user)))
}
