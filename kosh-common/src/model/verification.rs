use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operations that must not succeed on the bearer credential alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOp {
    PasswordChange,
    BeneficiaryAdd,
    HighValueTransfer,
    PasswordReset,
}

impl VerificationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOp::PasswordChange => "password_change",
            VerificationOp::BeneficiaryAdd => "beneficiary_add",
            VerificationOp::HighValueTransfer => "high_value_transfer",
            VerificationOp::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Expired,
    Cancelled,
}

/// A step-up approval request.
///
/// The OTP is retrievable only by the paired user-admin; it is never sent
/// over an external channel. A pending request past its expiry is treated as
/// expired regardless of the stored status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub operation: VerificationOp,
    pub otp_code: String,
    pub status: VerificationStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl VerificationRequest {
    pub const MAX_ATTEMPTS: u32 = 5;

    /// A request at `now == expires_at` is already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One-shot token minted by a successful verification, bound to the request
/// and its operation kind. Consumed exactly once by the retried operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationToken {
    pub token_hash: String,
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub operation: VerificationOp,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
