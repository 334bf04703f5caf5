//! Identity and verification core.
//!
//! Issues bearer credentials, tracks sessions by token hash, and enforces
//! out-of-band step-up approval for sensitive operations. The step-up OTP is
//! never sent anywhere; it is readable only by the paired user-admin
//! account.

pub mod extract;
pub mod kyc;
pub mod pairing;
pub mod password;
pub mod stepup;

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use kosh_authority::{seed, AuthorityService};
use kosh_common::auth::{token_hash, Claims, TokenCodec};
use kosh_common::model::{
    KycRecord, PostalAddress, Session, User, UserAdminPair, UserKind, UserStatus,
    VerificationOp, VerificationRequest, Wallet, WalletStatus,
};
use kosh_common::utils::time::epoch_secs;
use kosh_common::{CoreError, Currency, Result};
use kosh_store::Store;
use kosh_wallet::WalletService;

#[derive(Clone)]
pub struct IdentityService {
    store: Store,
    authority: AuthorityService,
    wallets: WalletService,
    codec: TokenCodec,
    token_ttl_secs: i64,
}

/// Result of a registration: the user, their companion admin account, and
/// the pending wallet awaiting KYC.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: User,
    pub admin: User,
    pub wallet: Wallet,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedIn {
    pub token: String,
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub expires_at: i64,
}

impl IdentityService {
    pub fn new(
        store: Store,
        authority: AuthorityService,
        wallets: WalletService,
        codec: TokenCodec,
        token_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            authority,
            wallets,
            codec,
            token_ttl_secs,
        }
    }

    // --- registration & profile ---

    /// Creates a user, their paired user-admin account, a pending KYC
    /// record, and a pending wallet.
    pub async fn register(
        &self,
        email: String,
        phone: String,
        display_name: String,
        secret: String,
    ) -> Result<Registration> {
        let email = email.trim().to_ascii_lowercase();
        if !email.contains('@') {
            return Err(CoreError::Validation("invalid email address".into()));
        }
        if secret.len() < 8 {
            return Err(CoreError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }
        let phone = normalize_phone(&phone)?;
        let password_hash = password::hash_password(&secret)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.clone(),
            phone: Some(phone),
            display_name: display_name.clone(),
            password_hash: password_hash.clone(),
            status: UserStatus::Active,
            kind: UserKind::User,
            created_at: now,
            updated_at: now,
        };
        let admin = User {
            id: Uuid::new_v4(),
            email,
            phone: None,
            display_name: format!("{display_name} (approver)"),
            password_hash,
            status: UserStatus::Active,
            kind: UserKind::UserAdmin,
            created_at: now,
            updated_at: now,
        };

        let (user, admin) = self
            .store
            .write(|t| {
                t.insert_user(user.clone())?;
                t.insert_user(admin.clone())?;
                t.insert_pair(UserAdminPair {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    admin_id: admin.id,
                    created_at: now,
                })?;
                kyc::create_pending(t, user.id)?;
                Ok((user.clone(), admin.clone()))
            })
            .await?;

        if let Some(role) = self.role_id(seed::ROLE_USER).await {
            self.authority.assign_role(user.id, role, None).await?;
        }
        if let Some(role) = self.role_id(seed::ROLE_USER_ADMIN).await {
            self.authority.assign_role(admin.id, role, None).await?;
        }

        let wallet = self.wallets.create(user.id, Currency::Inr).await?;
        tracing::info!(user = %user.id, admin = %admin.id, wallet = %wallet.id, "user registered");
        Ok(Registration {
            user,
            admin,
            wallet,
        })
    }

    async fn role_id(&self, name: &str) -> Option<Uuid> {
        self.store
            .read(|t| t.role_by_name(name).map(|r| r.id))
            .await
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        self.store.read(|t| t.require_user(id).cloned()).await
    }

    /// Administrative status change (suspend, close, reinstate).
    pub async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<User> {
        let user = self
            .store
            .write(|t| {
                let user = t
                    .users
                    .get_mut(&id)
                    .ok_or(CoreError::not_found("user"))?;
                user.status = status;
                user.updated_at = Utc::now();
                Ok(user.clone())
            })
            .await?;
        if matches!(status, UserStatus::Suspended | UserStatus::Closed) {
            self.logout_all(id).await?;
        }
        Ok(user)
    }

    // --- credential issuance & validation ---

    /// Sign-in with `(identifier, secret, account-kind)`.
    ///
    /// Unknown identifier, wrong secret, and mismatched kind are all the
    /// same `Unauthorized`; the unknown-identifier path burns an equivalent
    /// hash verification so timing does not enumerate accounts.
    pub async fn sign_in(
        &self,
        identifier: &str,
        secret: &str,
        kind: UserKind,
        ip: String,
        user_agent: String,
    ) -> Result<SignedIn> {
        let identifier = normalize_identifier(identifier);
        let user = self
            .store
            .read(|t| t.user_by_identifier(&identifier, kind).cloned())
            .await;

        let Some(user) = user else {
            password::verify_dummy(secret);
            return Err(CoreError::Unauthorized);
        };
        if !password::verify_password(secret, &user.password_hash) {
            return Err(CoreError::Unauthorized);
        }
        match user.status {
            UserStatus::Active => {}
            UserStatus::Suspended => {
                return Err(CoreError::Forbidden("account is suspended".into()))
            }
            UserStatus::Closed => return Err(CoreError::Forbidden("account is closed".into())),
            UserStatus::Pending => {
                return Err(CoreError::Forbidden("account is pending activation".into()))
            }
        }

        let roles = self.authority.get_user_roles(user.id).await;
        let permissions = self.authority.get_user_permissions(user.id).await;
        let issued_at = epoch_secs();
        let expires_at = issued_at + self.token_ttl_secs;
        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            status: user.status,
            account_kind: user.kind,
            roles: roles.clone(),
            permissions: permissions.clone(),
            issued_at,
            expires_at,
        };
        let token = self.codec.sign(&claims)?;

        let session = Session {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: token_hash(&token),
            ip,
            user_agent,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::seconds(self.token_ttl_secs),
        };
        self.store.write(|t| t.insert_session(session)).await?;

        tracing::info!(user = %user.id, kind = ?user.kind, "sign-in");
        Ok(SignedIn {
            token,
            user,
            roles,
            permissions,
            expires_at,
        })
    }

    /// Validates a bearer: signature, then the session row looked up by
    /// hash, then session expiry. Each failure is the same `Unauthorized`.
    pub async fn validate_token(&self, token: &str) -> Result<Claims> {
        let claims = self.codec.verify(token)?;
        let hash = token_hash(token);
        let session = self
            .store
            .read(|t| t.session_by_hash(&hash).cloned())
            .await
            .ok_or(CoreError::Unauthorized)?;
        if Utc::now() >= session.expires_at {
            return Err(CoreError::Unauthorized);
        }
        Ok(claims)
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        let hash = token_hash(token);
        self.store
            .write(|t| {
                if let Some(id) = t.session_by_hash(&hash).map(|s| s.id) {
                    t.sessions.remove(&id);
                }
                Ok(())
            })
            .await
    }

    pub async fn logout_all(&self, user_id: Uuid) -> Result<usize> {
        self.store
            .write(|t| {
                let ids: Vec<Uuid> = t
                    .sessions
                    .values()
                    .filter(|s| s.user_id == user_id)
                    .map(|s| s.id)
                    .collect();
                let count = ids.len();
                for id in ids {
                    t.sessions.remove(&id);
                }
                Ok(count)
            })
            .await
    }

    /// Background sweep for expired sessions.
    pub async fn sweep_expired_sessions(&self) -> Result<usize> {
        let now = Utc::now();
        self.store
            .write(|t| {
                let ids: Vec<Uuid> = t
                    .sessions
                    .values()
                    .filter(|s| now >= s.expires_at)
                    .map(|s| s.id)
                    .collect();
                let count = ids.len();
                for id in ids {
                    t.sessions.remove(&id);
                }
                Ok(count)
            })
            .await
    }

    // --- step-up verification ---

    /// Entry point for sensitive operations arriving without a verification
    /// token: creates the request and surfaces `VerificationRequired`.
    pub async fn demand_verification(
        &self,
        user_id: Uuid,
        operation: VerificationOp,
        metadata: serde_json::Value,
    ) -> CoreError {
        let created = self
            .store
            .write(|t| stepup::create_request(t, user_id, operation, metadata, Utc::now()))
            .await;
        match created {
            Ok(request) => CoreError::VerificationRequired {
                request_id: request.id,
            },
            Err(e) => e,
        }
    }

    pub async fn verify_otp(
        &self,
        user_id: Uuid,
        request_id: Uuid,
        otp: &str,
    ) -> Result<(VerificationRequest, String)> {
        self.store
            .write(|t| stepup::verify_otp(t, user_id, request_id, otp, Utc::now()))
            .await
    }

    pub async fn cancel_verification(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<VerificationRequest> {
        self.store
            .write(|t| stepup::cancel_request(t, user_id, request_id))
            .await
    }

    /// Consumes a one-shot verification token for `operation`.
    pub async fn consume_verification(
        &self,
        user_id: Uuid,
        operation: VerificationOp,
        token: &str,
    ) -> Result<()> {
        self.store
            .write(|t| stepup::consume_token(t, user_id, operation, token, Utc::now()))
            .await
    }

    /// The paired-admin read path: requests (including OTP codes) for the
    /// admin's paired user. An explicit foreign user id is refused.
    pub async fn requests_for_admin(
        &self,
        admin_id: Uuid,
        requested_user: Option<Uuid>,
    ) -> Result<Vec<VerificationRequest>> {
        self.store
            .read(|t| {
                let scoped = pairing::admin_scope(t, admin_id, requested_user)?;
                Ok(stepup::pending_requests_for_user(t, scoped, Utc::now()))
            })
            .await
    }

    pub async fn sweep_expired_verifications(&self) -> Result<usize> {
        self.store
            .write(|t| Ok(stepup::expire_overdue(t, Utc::now())))
            .await
    }

    // --- password change ---

    /// Changes the password. Requires a consumed `password_change`
    /// verification token; without one the step-up flow is initiated.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &str,
        new: &str,
        verification_token: Option<&str>,
    ) -> Result<()> {
        let Some(token) = verification_token else {
            return Err(self
                .demand_verification(
                    user_id,
                    VerificationOp::PasswordChange,
                    serde_json::json!({}),
                )
                .await);
        };
        if new.len() < 8 {
            return Err(CoreError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }

        let user = self.get_user(user_id).await?;
        if !password::verify_password(current, &user.password_hash) {
            return Err(CoreError::Unauthorized);
        }
        let new_hash = password::hash_password(new)?;

        self.store
            .write(|t| {
                stepup::consume_token(
                    t,
                    user_id,
                    VerificationOp::PasswordChange,
                    token,
                    Utc::now(),
                )?;
                let user = t
                    .users
                    .get_mut(&user_id)
                    .ok_or(CoreError::not_found("user"))?;
                user.password_hash = new_hash;
                user.updated_at = Utc::now();
                Ok(())
            })
            .await?;

        // Every outstanding credential is revoked on a password change.
        self.logout_all(user_id).await?;
        Ok(())
    }

    // --- password reset (no bearer credential) ---

    /// Starts a password reset for a locked-out user.
    ///
    /// Always answers `VerificationRequired`: an unknown identifier receives
    /// a request id that verifies nowhere, so the endpoint does not
    /// enumerate accounts. The OTP is readable only through the paired
    /// admin, like every other step-up.
    pub async fn initiate_password_reset(&self, identifier: &str) -> CoreError {
        let identifier = normalize_identifier(identifier);
        let user = self
            .store
            .read(move |t| t.user_by_identifier(&identifier, UserKind::User).cloned())
            .await;
        match user {
            Some(user) => {
                self.demand_verification(user.id, VerificationOp::PasswordReset, serde_json::json!({}))
                    .await
            }
            None => CoreError::VerificationRequired {
                request_id: Uuid::new_v4(),
            },
        }
    }

    /// Completes a reset: verifies the OTP against the request, consumes the
    /// minted token, replaces the password, and revokes every session.
    pub async fn complete_password_reset(
        &self,
        identifier: &str,
        request_id: Uuid,
        otp: &str,
        new_password: &str,
    ) -> Result<()> {
        if new_password.len() < 8 {
            return Err(CoreError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }
        let identifier = normalize_identifier(identifier);
        let user = self
            .store
            .read(move |t| t.user_by_identifier(&identifier, UserKind::User).cloned())
            .await
            .ok_or(CoreError::InvalidOtp)?;

        let (_, token) = self.verify_otp(user.id, request_id, otp).await?;
        let new_hash = password::hash_password(new_password)?;
        let user_id = user.id;
        self.store
            .write(move |t| {
                stepup::consume_token(
                    t,
                    user_id,
                    VerificationOp::PasswordReset,
                    &token,
                    Utc::now(),
                )?;
                let user = t
                    .users
                    .get_mut(&user_id)
                    .ok_or(CoreError::not_found("user"))?;
                user.password_hash = new_hash;
                user.updated_at = Utc::now();
                Ok(())
            })
            .await?;
        self.logout_all(user_id).await?;
        tracing::info!(user = %user_id, "password reset completed");
        Ok(())
    }

    // --- KYC ---

    pub async fn get_kyc(&self, user_id: Uuid) -> Result<KycRecord> {
        self.store
            .read(|t| {
                t.user_kyc
                    .get(&user_id)
                    .cloned()
                    .ok_or(CoreError::not_found("kyc record"))
            })
            .await
    }

    pub async fn submit_kyc(
        &self,
        user_id: Uuid,
        pan: String,
        aadhaar: String,
        date_of_birth: NaiveDate,
        address: PostalAddress,
    ) -> Result<KycRecord> {
        self.store
            .write(|t| kyc::submit(t, user_id, pan, aadhaar, date_of_birth, address))
            .await
    }

    /// Approving KYC activates the user's pending wallets.
    pub async fn approve_kyc(&self, user_id: Uuid) -> Result<KycRecord> {
        let record = self.store.write(|t| kyc::approve(t, user_id)).await?;
        for wallet in self.wallets.wallets_for_user(user_id).await {
            if wallet.status == WalletStatus::Pending {
                self.wallets.activate(wallet.id).await?;
            }
        }
        Ok(record)
    }

    pub async fn reject_kyc(&self, user_id: Uuid, reason: String) -> Result<KycRecord> {
        self.store
            .write(|t| kyc::reject(t, user_id, reason))
            .await
    }
}

fn normalize_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if trimmed.contains('@') {
        trimmed.to_ascii_lowercase()
    } else {
        normalize_phone(trimmed).unwrap_or_else(|_| trimmed.to_string())
    }
}

/// Normalizes an Indian phone number to `+91XXXXXXXXXX`.
fn normalize_phone(raw: &str) -> Result<String> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let national = match digits.len() {
        10 => digits,
        12 if digits.starts_with("91") => digits[2..].to_string(),
        _ => {
            return Err(CoreError::Validation(format!(
                "invalid phone number: {raw}"
            )))
        }
    };
    Ok(format!("+91{national}"))
}
