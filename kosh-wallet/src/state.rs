use kosh_common::model::WalletStatus;
use kosh_common::{CoreError, Result};

/// Legal lifecycle transitions: `pending → active ↔ frozen → closed`.
/// `closed` is terminal.
pub fn ensure_transition(from: WalletStatus, to: WalletStatus) -> Result<()> {
    use WalletStatus::*;
    let legal = matches!(
        (from, to),
        (Pending, Active) | (Active, Frozen) | (Frozen, Active) | (Active, Closed) | (Frozen, Closed)
    );
    if legal {
        Ok(())
    } else {
        Err(CoreError::WalletStateInvalid {
            operation: "status transition",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WalletStatus::*;

    #[test]
    fn test_legal_transitions() {
        assert!(ensure_transition(Pending, Active).is_ok());
        assert!(ensure_transition(Active, Frozen).is_ok());
        assert!(ensure_transition(Frozen, Active).is_ok());
        assert!(ensure_transition(Active, Closed).is_ok());
        assert!(ensure_transition(Frozen, Closed).is_ok());
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(ensure_transition(Closed, Active).is_err());
        assert!(ensure_transition(Closed, Frozen).is_err());
        assert!(ensure_transition(Closed, Pending).is_err());
    }

    #[test]
    fn test_pending_cannot_skip_or_close() {
        assert!(ensure_transition(Pending, Frozen).is_err());
        assert!(ensure_transition(Pending, Closed).is_err());
    }
}
