use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current UNIX timestamp in seconds.
///
/// Used where compact epoch claims are needed (bearer tokens); persisted
/// rows use `chrono::DateTime<Utc>` instead.
///
/// # Panics
///
/// Panics if the system clock is set before the UNIX epoch.
pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before UNIX EPOCH")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_secs_non_zero() {
        assert!(epoch_secs() > 0);
    }

    #[test]
    fn test_epoch_secs_monotonic() {
        let t1 = epoch_secs();
        let t2 = epoch_secs();
        assert!(t2 >= t1);
    }
}
