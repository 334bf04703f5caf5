//! Persisted row types shared by the store and every service crate.
//!
//! Each struct maps to one store table and carries a textual UUID id. The
//! services own the logic; these are the shapes the transactional map holds.

pub mod kyc;
pub mod ledger;
pub mod rbac;
pub mod session;
pub mod transaction;
pub mod user;
pub mod verification;
pub mod wallet;

pub use kyc::{KycRecord, KycStatus, PostalAddress};
pub use ledger::{Account, AccountKind, AccountStatus, EntryKind, JournalEntry, JournalLine};
pub use rbac::{Permission, Role, RolePermission, UserRole};
pub use session::Session;
pub use transaction::{IdempotencyReservation, TransactionRecord, TxKind, TxStatus};
pub use user::{User, UserAdminPair, UserKind, UserStatus};
pub use verification::{
    VerificationOp, VerificationRequest, VerificationStatus, VerificationToken,
};
pub use wallet::{Hold, HoldStatus, MutationKind, Wallet, WalletMutation, WalletStatus};
