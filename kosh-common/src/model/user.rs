use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
    Closed,
}

/// Regular users hold wallets; user-admin accounts exist only to read
/// step-up codes for their paired user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    User,
    UserAdmin,
}

/// An account holder. `(email, kind)` is unique; email alone is not, so a
/// user and their companion admin may share an address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Optional for admin accounts.
    pub phone: Option<String>,
    pub display_name: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub kind: UserKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One-to-one pairing between a regular user and the companion user-admin
/// account that can read their verification codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAdminPair {
    pub id: Uuid,
    pub user_id: Uuid,
    pub admin_id: Uuid,
    pub created_at: DateTime<Utc>,
}
