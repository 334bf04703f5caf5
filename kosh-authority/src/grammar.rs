use kosh_common::{CoreError, Result};

/// Parses a canonical permission name `service:resource:action`.
///
/// All three components must be non-empty, lowercase `[a-z0-9_-]+`.
pub fn parse_permission_name(name: &str) -> Result<(String, String, String)> {
    let parts: Vec<&str> = name.split(':').collect();
    if parts.len() != 3 {
        return Err(CoreError::Validation(format!(
            "permission name must be service:resource:action, got {name}"
        )));
    }
    for part in &parts {
        if part.is_empty()
            || !part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(CoreError::Validation(format!(
                "invalid permission component {part:?} in {name}"
            )));
        }
    }
    Ok((parts[0].into(), parts[1].into(), parts[2].into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(parse_permission_name("ledger:account:read").is_ok());
        assert!(parse_permission_name("wallet:wallet_v2:re-ad").is_ok());
        assert!(parse_permission_name("a1:b2:c3").is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(parse_permission_name("ledger:account").is_err());
        assert!(parse_permission_name("ledger:account:read:extra").is_err());
        assert!(parse_permission_name("Ledger:account:read").is_err());
        assert!(parse_permission_name("ledger::read").is_err());
        assert!(parse_permission_name("ledger:acc ount:read").is_err());
        assert!(parse_permission_name("").is_err());
    }
}
