use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use uuid::Uuid;

use kosh_common::auth::Claims;
use kosh_common::model::UserKind;
use kosh_common::{CoreError, Result};

use crate::IdentityService;

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
///
/// Extraction validates the token signature and the backing session row;
/// handlers then enforce permissions from the embedded claims.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub token: String,
}

impl AuthContext {
    pub fn user_id(&self) -> Uuid {
        self.claims.user_id
    }

    pub fn is_user_admin(&self) -> bool {
        self.claims.account_kind == UserKind::UserAdmin
    }

    pub fn require_permission(&self, name: &str) -> Result<()> {
        if self.claims.has_permission(name) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!("missing permission {name}")))
        }
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let identity = parts
            .extensions
            .get::<IdentityService>()
            .cloned()
            .ok_or_else(|| CoreError::internal("identity service not installed"))?;

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(CoreError::Unauthorized)?
            .to_string();

        let claims = identity.validate_token(&token).await?;
        Ok(AuthContext { claims, token })
    }
}
