use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::money::Paise;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Stable symbolic error codes carried on the wire.
///
/// Every failure the core surfaces maps to exactly one of these codes; the
/// code never changes even when the human-readable message does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    InsufficientFunds,
    AccountFrozen,
    WalletStateInvalid,
    LimitExceeded,
    VerificationRequired,
    VerificationExpired,
    InvalidOtp,
    RateLimited,
    RiskRejected,
    UnbalancedEntry,
    CurrencyMismatch,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorCode::AccountFrozen => "ACCOUNT_FROZEN",
            ErrorCode::WalletStateInvalid => "WALLET_STATE_INVALID",
            ErrorCode::LimitExceeded => "LIMIT_EXCEEDED",
            ErrorCode::VerificationRequired => "VERIFICATION_REQUIRED",
            ErrorCode::VerificationExpired => "VERIFICATION_EXPIRED",
            ErrorCode::InvalidOtp => "INVALID_OTP",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::RiskRejected => "RISK_REJECTED",
            ErrorCode::UnbalancedEntry => "UNBALANCED_ENTRY",
            ErrorCode::CurrencyMismatch => "CURRENCY_MISMATCH",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// HTTP status carried by responses bearing this code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError | ErrorCode::InsufficientFunds => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::VerificationExpired => 410,
            ErrorCode::AccountFrozen
            | ErrorCode::WalletStateInvalid
            | ErrorCode::LimitExceeded => 412,
            ErrorCode::VerificationRequired => 202,
            ErrorCode::InvalidOtp => 400,
            ErrorCode::RateLimited => 429,
            ErrorCode::RiskRejected => 403,
            ErrorCode::UnbalancedEntry
            | ErrorCode::CurrencyMismatch
            | ErrorCode::Internal => 500,
        }
    }
}

/// Typed failures shared by every core component.
///
/// Business rejections carry enough context for the caller to act on;
/// infrastructure faults are wrapped as `Internal` before they cross the
/// request boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    /// Deliberately uniform: never distinguishes unknown identifier from a
    /// wrong secret.
    #[error("invalid or missing credentials")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{0}")]
    Conflict(String),

    #[error("transaction has already been reversed")]
    AlreadyReversed,

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Paise, requested: Paise },

    #[error("wallet is frozen")]
    AccountFrozen,

    #[error("wallet state does not permit {operation}")]
    WalletStateInvalid { operation: &'static str },

    #[error("{0}")]
    LimitExceeded(String),

    #[error("out-of-band verification required")]
    VerificationRequired { request_id: Uuid },

    #[error("verification request has expired")]
    VerificationExpired,

    #[error("verification code rejected")]
    InvalidOtp,

    #[error("{0}")]
    RateLimited(String),

    #[error("transaction rejected by risk policy")]
    RiskRejected,

    #[error("unbalanced journal entry: debits {debits}, credits {credits}")]
    UnbalancedEntry { debits: Paise, credits: Paise },

    #[error("currency mismatch")]
    CurrencyMismatch,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error")]
    Internal(String),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) => ErrorCode::ValidationError,
            CoreError::Unauthorized => ErrorCode::Unauthorized,
            CoreError::Forbidden(_) => ErrorCode::Forbidden,
            CoreError::NotFound { .. } => ErrorCode::NotFound,
            CoreError::Conflict(_) | CoreError::AlreadyReversed => ErrorCode::Conflict,
            CoreError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            CoreError::AccountFrozen => ErrorCode::AccountFrozen,
            CoreError::WalletStateInvalid { .. } => ErrorCode::WalletStateInvalid,
            CoreError::LimitExceeded(_) => ErrorCode::LimitExceeded,
            CoreError::VerificationRequired { .. } => ErrorCode::VerificationRequired,
            CoreError::VerificationExpired => ErrorCode::VerificationExpired,
            CoreError::InvalidOtp => ErrorCode::InvalidOtp,
            CoreError::RateLimited(_) => ErrorCode::RateLimited,
            CoreError::RiskRejected => ErrorCode::RiskRejected,
            CoreError::UnbalancedEntry { .. } => ErrorCode::UnbalancedEntry,
            CoreError::CurrencyMismatch => ErrorCode::CurrencyMismatch,
            CoreError::Config(_) | CoreError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// True for failures caused by infrastructure rather than the request
    /// itself; only these are eligible for retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Internal(_))
    }

    pub fn not_found(entity: &'static str) -> Self {
        CoreError::NotFound { entity }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings_are_stable() {
        assert_eq!(ErrorCode::InsufficientFunds.as_str(), "INSUFFICIENT_FUNDS");
        assert_eq!(ErrorCode::VerificationRequired.as_str(), "VERIFICATION_REQUIRED");
        assert_eq!(ErrorCode::UnbalancedEntry.as_str(), "UNBALANCED_ENTRY");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::VerificationRequired.http_status(), 202);
        assert_eq!(ErrorCode::VerificationExpired.http_status(), 410);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
        assert_eq!(ErrorCode::WalletStateInvalid.http_status(), 412);
    }

    #[test]
    fn test_unauthorized_message_is_uniform() {
        let e = CoreError::Unauthorized;
        assert_eq!(e.to_string(), "invalid or missing credentials");
    }

    #[test]
    fn test_internal_message_never_leaks() {
        let e = CoreError::Internal("connection pool exhausted".into());
        assert_eq!(e.to_string(), "internal error");
    }
}
