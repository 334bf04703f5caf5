use std::collections::HashMap;

use uuid::Uuid;

use kosh_common::model::{
    Account, Hold, IdempotencyReservation, JournalEntry, JournalLine, KycRecord, Permission, Role,
    RolePermission, Session, TransactionRecord, User, UserAdminPair, UserKind, UserRole,
    VerificationRequest, VerificationToken, Wallet, WalletMutation,
};
use kosh_common::{CoreError, Result};

/// The committed relational state: one map per table, keyed by row id.
///
/// Insert helpers enforce the unique constraints the schema would; reads go
/// straight at the maps. Everything is `Clone` so a write scope can operate
/// on a scratch copy and commit by swap.
#[derive(Clone, Default)]
pub struct Tables {
    pub users: HashMap<Uuid, User>,
    pub user_admin_pairs: HashMap<Uuid, UserAdminPair>,
    pub user_kyc: HashMap<Uuid, KycRecord>,
    pub sessions: HashMap<Uuid, Session>,
    pub verification_requests: HashMap<Uuid, VerificationRequest>,
    pub verification_tokens: HashMap<String, VerificationToken>,
    pub roles: HashMap<Uuid, Role>,
    pub permissions: HashMap<Uuid, Permission>,
    pub role_permissions: HashMap<Uuid, RolePermission>,
    pub user_roles: HashMap<Uuid, UserRole>,
    pub accounts: HashMap<Uuid, Account>,
    pub journal_entries: HashMap<Uuid, JournalEntry>,
    pub journal_lines: HashMap<Uuid, JournalLine>,
    pub wallets: HashMap<Uuid, Wallet>,
    pub wallet_mutations: HashMap<Uuid, WalletMutation>,
    pub wallet_holds: HashMap<Uuid, Hold>,
    pub transactions: HashMap<Uuid, TransactionRecord>,
    pub idempotency_keys: HashMap<String, IdempotencyReservation>,
}

impl Tables {
    // --- users ---

    /// Unique constraint: `(email, kind)`.
    pub fn insert_user(&mut self, user: User) -> Result<()> {
        if self
            .users
            .values()
            .any(|u| u.email == user.email && u.kind == user.kind)
        {
            return Err(CoreError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }
        self.users.insert(user.id, user);
        Ok(())
    }

    /// Resolves `(identifier, kind)` to at most one user. The identifier is
    /// an email or a normalized phone number.
    pub fn user_by_identifier(&self, identifier: &str, kind: UserKind) -> Option<&User> {
        self.users.values().find(|u| {
            u.kind == kind
                && (u.email == identifier || u.phone.as_deref() == Some(identifier))
        })
    }

    pub fn require_user(&self, id: Uuid) -> Result<&User> {
        self.users.get(&id).ok_or(CoreError::not_found("user"))
    }

    // --- user-admin pairing ---

    /// One pairing per user and per admin.
    pub fn insert_pair(&mut self, pair: UserAdminPair) -> Result<()> {
        if self
            .user_admin_pairs
            .values()
            .any(|p| p.user_id == pair.user_id || p.admin_id == pair.admin_id)
        {
            return Err(CoreError::Conflict("pairing already exists".into()));
        }
        self.user_admin_pairs.insert(pair.id, pair);
        Ok(())
    }

    pub fn pair_for_admin(&self, admin_id: Uuid) -> Option<&UserAdminPair> {
        self.user_admin_pairs
            .values()
            .find(|p| p.admin_id == admin_id)
    }

    pub fn pair_for_user(&self, user_id: Uuid) -> Option<&UserAdminPair> {
        self.user_admin_pairs
            .values()
            .find(|p| p.user_id == user_id)
    }

    // --- sessions ---

    /// Unique constraint: token hash.
    pub fn insert_session(&mut self, session: Session) -> Result<()> {
        if self
            .sessions
            .values()
            .any(|s| s.token_hash == session.token_hash)
        {
            return Err(CoreError::Conflict("session already exists".into()));
        }
        self.sessions.insert(session.id, session);
        Ok(())
    }

    pub fn session_by_hash(&self, token_hash: &str) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.token_hash == token_hash)
    }

    // --- rbac ---

    pub fn insert_role(&mut self, role: Role) -> Result<()> {
        if self.roles.values().any(|r| r.name == role.name) {
            return Err(CoreError::Conflict(format!(
                "role {} already exists",
                role.name
            )));
        }
        self.roles.insert(role.id, role);
        Ok(())
    }

    pub fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.name == name)
    }

    pub fn require_role(&self, id: Uuid) -> Result<&Role> {
        self.roles.get(&id).ok_or(CoreError::not_found("role"))
    }

    pub fn insert_permission(&mut self, permission: Permission) -> Result<()> {
        if self
            .permissions
            .values()
            .any(|p| p.name == permission.name)
        {
            return Err(CoreError::Conflict(format!(
                "permission {} already exists",
                permission.name
            )));
        }
        self.permissions.insert(permission.id, permission);
        Ok(())
    }

    pub fn permission_by_name(&self, name: &str) -> Option<&Permission> {
        self.permissions.values().find(|p| p.name == name)
    }

    /// Unique constraint: `(role_id, permission_id)`.
    pub fn insert_role_permission(&mut self, link: RolePermission) -> Result<()> {
        if self
            .role_permissions
            .values()
            .any(|l| l.role_id == link.role_id && l.permission_id == link.permission_id)
        {
            return Err(CoreError::Conflict("permission already assigned".into()));
        }
        self.role_permissions.insert(link.id, link);
        Ok(())
    }

    /// Unique constraint: `(user_id, role_id)`.
    pub fn insert_user_role(&mut self, assignment: UserRole) -> Result<()> {
        if self
            .user_roles
            .values()
            .any(|a| a.user_id == assignment.user_id && a.role_id == assignment.role_id)
        {
            return Err(CoreError::Conflict("role already assigned".into()));
        }
        self.user_roles.insert(assignment.id, assignment);
        Ok(())
    }

    // --- ledger ---

    /// Unique constraint: account code.
    pub fn insert_account(&mut self, account: Account) -> Result<()> {
        if self.accounts.values().any(|a| a.code == account.code) {
            return Err(CoreError::Conflict(format!(
                "account code {} already exists",
                account.code
            )));
        }
        self.accounts.insert(account.id, account);
        Ok(())
    }

    pub fn account_by_code(&self, code: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.code == code)
    }

    pub fn require_account(&self, id: Uuid) -> Result<&Account> {
        self.accounts
            .get(&id)
            .ok_or(CoreError::not_found("account"))
    }

    pub fn lines_for_entry(&self, entry_id: Uuid) -> Vec<&JournalLine> {
        let mut lines: Vec<&JournalLine> = self
            .journal_lines
            .values()
            .filter(|l| l.entry_id == entry_id)
            .collect();
        lines.sort_by_key(|l| l.position);
        lines
    }

    pub fn lines_for_account(&self, account_id: Uuid) -> Vec<&JournalLine> {
        self.journal_lines
            .values()
            .filter(|l| l.account_id == account_id)
            .collect()
    }

    pub fn insert_entry(&mut self, entry: JournalEntry, lines: Vec<JournalLine>) {
        for line in lines {
            self.journal_lines.insert(line.id, line);
        }
        self.journal_entries.insert(entry.id, entry);
    }

    // --- wallets ---

    pub fn require_wallet(&self, id: Uuid) -> Result<&Wallet> {
        self.wallets.get(&id).ok_or(CoreError::not_found("wallet"))
    }

    pub fn require_wallet_mut(&mut self, id: Uuid) -> Result<&mut Wallet> {
        self.wallets
            .get_mut(&id)
            .ok_or(CoreError::not_found("wallet"))
    }

    /// Idempotency lookup: `(wallet_id, idem_key)`.
    pub fn mutation_by_key(&self, wallet_id: Uuid, idem_key: &str) -> Option<&WalletMutation> {
        self.wallet_mutations
            .values()
            .find(|m| m.wallet_id == wallet_id && m.idem_key == idem_key)
    }

    // --- transactions ---

    pub fn require_transaction(&self, id: Uuid) -> Result<&TransactionRecord> {
        self.transactions
            .get(&id)
            .ok_or(CoreError::not_found("transaction"))
    }
}
