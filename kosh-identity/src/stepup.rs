use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use kosh_common::auth::token_hash;
use kosh_common::model::{
    VerificationOp, VerificationRequest, VerificationStatus, VerificationToken,
};
use kosh_common::utils::security::{constant_time_eq, generate_otp, generate_token_material};
use kosh_common::{CoreError, Result};
use kosh_store::Tables;

/// Requests expire ten minutes after creation.
const REQUEST_TTL_MINUTES: i64 = 10;
/// Minted verification tokens are short-lived.
const TOKEN_TTL_MINUTES: i64 = 5;
/// Sliding window for the one-pending-request-per-kind rate limit.
const RATE_WINDOW_SECS: i64 = 60;

/// Creates a step-up request for a sensitive operation.
///
/// At most one pending request of the same operation kind may be created per
/// user within a sliding one-minute window.
pub fn create_request(
    tables: &mut Tables,
    user_id: Uuid,
    operation: VerificationOp,
    metadata: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<VerificationRequest> {
    let window_start = now - Duration::seconds(RATE_WINDOW_SECS);
    let recent_pending = tables.verification_requests.values().any(|r| {
        r.user_id == user_id
            && r.operation == operation
            && r.status == VerificationStatus::Pending
            && r.created_at > window_start
    });
    if recent_pending {
        return Err(CoreError::RateLimited(format!(
            "a {} verification is already pending",
            operation.as_str()
        )));
    }

    let request = VerificationRequest {
        id: Uuid::new_v4(),
        user_id,
        operation,
        otp_code: generate_otp(),
        status: VerificationStatus::Pending,
        metadata,
        created_at: now,
        expires_at: now + Duration::minutes(REQUEST_TTL_MINUTES),
        verified_at: None,
        attempt_count: 0,
        last_attempt_at: None,
    };
    tables
        .verification_requests
        .insert(request.id, request.clone());
    tracing::info!(request = %request.id, user = %user_id, operation = operation.as_str(), "verification request created");
    Ok(request)
}

/// Verifies a submitted OTP.
///
/// Rejects expired, cancelled, and already-verified requests; caps attempts
/// at five (the sixth and later attempts fail without incrementing); compares
/// the code in constant time. Success transitions the request to verified
/// and mints a one-shot token bound to the request.
pub fn verify_otp(
    tables: &mut Tables,
    user_id: Uuid,
    request_id: Uuid,
    submitted: &str,
    now: DateTime<Utc>,
) -> Result<(VerificationRequest, String)> {
    let snapshot = tables
        .verification_requests
        .get(&request_id)
        .cloned()
        .ok_or(CoreError::not_found("verification request"))?;
    if snapshot.user_id != user_id {
        return Err(CoreError::Forbidden(
            "verification request belongs to another user".into(),
        ));
    }
    match snapshot.status {
        VerificationStatus::Pending => {}
        VerificationStatus::Expired
        | VerificationStatus::Cancelled
        | VerificationStatus::Verified => return Err(CoreError::VerificationExpired),
    }
    if snapshot.is_expired(now) {
        let request = tables
            .verification_requests
            .get_mut(&request_id)
            .expect("request exists");
        request.status = VerificationStatus::Expired;
        return Err(CoreError::VerificationExpired);
    }
    if snapshot.attempt_count >= VerificationRequest::MAX_ATTEMPTS {
        return Err(CoreError::InvalidOtp);
    }

    let request = tables
        .verification_requests
        .get_mut(&request_id)
        .expect("request exists");
    request.attempt_count += 1;
    request.last_attempt_at = Some(now);

    if !constant_time_eq(request.otp_code.as_bytes(), submitted.as_bytes()) {
        return Err(CoreError::InvalidOtp);
    }

    request.status = VerificationStatus::Verified;
    request.verified_at = Some(now);
    let request = request.clone();

    let plain = URL_SAFE_NO_PAD.encode(generate_token_material());
    let token = VerificationToken {
        token_hash: token_hash(&plain),
        request_id,
        user_id,
        operation: request.operation,
        used: false,
        created_at: now,
        expires_at: now + Duration::minutes(TOKEN_TTL_MINUTES),
    };
    tables
        .verification_tokens
        .insert(token.token_hash.clone(), token);

    tracing::info!(request = %request_id, user = %user_id, "verification request verified");
    Ok((request, plain))
}

/// Consumes a one-shot verification token for an operation.
///
/// The token must be unused, unexpired, bound to the same user, and bound to
/// the same operation kind. Consumption marks it used; a second consumption
/// fails.
pub fn consume_token(
    tables: &mut Tables,
    user_id: Uuid,
    operation: VerificationOp,
    plain: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let hash = token_hash(plain);
    let token = tables
        .verification_tokens
        .get_mut(&hash)
        .ok_or_else(|| CoreError::Forbidden("invalid verification token".into()))?;
    if token.used
        || token.user_id != user_id
        || token.operation != operation
        || now >= token.expires_at
    {
        return Err(CoreError::Forbidden("invalid verification token".into()));
    }
    token.used = true;
    Ok(())
}

/// Pending requests for one user, newest first. Used by the paired-admin
/// read endpoint; this is the only place OTP codes leave the store.
pub fn pending_requests_for_user(
    tables: &Tables,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Vec<VerificationRequest> {
    let mut requests: Vec<VerificationRequest> = tables
        .verification_requests
        .values()
        .filter(|r| {
            r.user_id == user_id && r.status == VerificationStatus::Pending && !r.is_expired(now)
        })
        .cloned()
        .collect();
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    requests
}

pub fn cancel_request(
    tables: &mut Tables,
    user_id: Uuid,
    request_id: Uuid,
) -> Result<VerificationRequest> {
    let request = tables
        .verification_requests
        .get_mut(&request_id)
        .ok_or(CoreError::not_found("verification request"))?;
    if request.user_id != user_id {
        return Err(CoreError::Forbidden(
            "verification request belongs to another user".into(),
        ));
    }
    if request.status != VerificationStatus::Pending {
        return Err(CoreError::VerificationExpired);
    }
    request.status = VerificationStatus::Cancelled;
    Ok(request.clone())
}

/// Background sweep: transitions pending requests past expiry.
pub fn expire_overdue(tables: &mut Tables, now: DateTime<Utc>) -> usize {
    let mut swept = 0;
    for request in tables.verification_requests.values_mut() {
        if request.status == VerificationStatus::Pending && now >= request.expires_at {
            request.status = VerificationStatus::Expired;
            swept += 1;
        }
    }
    swept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Tables, Uuid) {
        (Tables::default(), Uuid::new_v4())
    }

    #[test]
    fn test_happy_path_mints_one_shot_token() {
        let (mut t, user) = setup();
        let now = Utc::now();
        let req = create_request(
            &mut t,
            user,
            VerificationOp::HighValueTransfer,
            serde_json::json!({}),
            now,
        )
        .unwrap();
        let otp = req.otp_code.clone();
        let (verified, token) = verify_otp(&mut t, user, req.id, &otp, now).unwrap();
        assert_eq!(verified.status, VerificationStatus::Verified);

        consume_token(&mut t, user, VerificationOp::HighValueTransfer, &token, now).unwrap();
        // One-shot: second consumption fails.
        assert!(consume_token(&mut t, user, VerificationOp::HighValueTransfer, &token, now).is_err());
    }

    #[test]
    fn test_token_bound_to_operation_kind() {
        let (mut t, user) = setup();
        let now = Utc::now();
        let req = create_request(&mut t, user, VerificationOp::PasswordChange, serde_json::json!({}), now)
            .unwrap();
        let otp = req.otp_code.clone();
        let (_, token) = verify_otp(&mut t, user, req.id, &otp, now).unwrap();
        assert!(consume_token(&mut t, user, VerificationOp::HighValueTransfer, &token, now).is_err());
    }

    #[test]
    fn test_rate_limit_same_kind_within_window() {
        let (mut t, user) = setup();
        let now = Utc::now();
        create_request(&mut t, user, VerificationOp::BeneficiaryAdd, serde_json::json!({}), now)
            .unwrap();
        assert!(matches!(
            create_request(&mut t, user, VerificationOp::BeneficiaryAdd, serde_json::json!({}), now),
            Err(CoreError::RateLimited(_))
        ));
        // A different kind is allowed.
        assert!(create_request(
            &mut t,
            user,
            VerificationOp::PasswordChange,
            serde_json::json!({}),
            now
        )
        .is_ok());
        // Outside the window it is allowed again.
        assert!(create_request(
            &mut t,
            user,
            VerificationOp::BeneficiaryAdd,
            serde_json::json!({}),
            now + Duration::seconds(RATE_WINDOW_SECS + 1)
        )
        .is_ok());
    }

    #[test]
    fn test_request_at_expiry_is_expired() {
        let (mut t, user) = setup();
        let now = Utc::now();
        let req = create_request(&mut t, user, VerificationOp::PasswordReset, serde_json::json!({}), now)
            .unwrap();
        let otp = req.otp_code.clone();
        let at_expiry = req.expires_at;
        assert!(matches!(
            verify_otp(&mut t, user, req.id, &otp, at_expiry),
            Err(CoreError::VerificationExpired)
        ));
    }

    #[test]
    fn test_five_failures_lock_sixth_does_not_increment() {
        let (mut t, user) = setup();
        let now = Utc::now();
        let req = create_request(
            &mut t,
            user,
            VerificationOp::HighValueTransfer,
            serde_json::json!({}),
            now,
        )
        .unwrap();
        // OTP digits never collide with this.
        for _ in 0..5 {
            assert!(matches!(
                verify_otp(&mut t, user, req.id, "no-code", now),
                Err(CoreError::InvalidOtp)
            ));
        }
        assert_eq!(t.verification_requests[&req.id].attempt_count, 5);
        assert!(matches!(
            verify_otp(&mut t, user, req.id, "no-code", now),
            Err(CoreError::InvalidOtp)
        ));
        assert_eq!(
            t.verification_requests[&req.id].attempt_count, 5,
            "sixth attempt must not increment"
        );
        // Even the right code is refused once locked.
        let otp = t.verification_requests[&req.id].otp_code.clone();
        assert!(verify_otp(&mut t, user, req.id, &otp, now).is_err());
    }

    #[test]
    fn test_foreign_request_forbidden() {
        let (mut t, user) = setup();
        let now = Utc::now();
        let req = create_request(&mut t, user, VerificationOp::PasswordChange, serde_json::json!({}), now)
            .unwrap();
        let stranger = Uuid::new_v4();
        assert!(matches!(
            verify_otp(&mut t, stranger, req.id, "000000", now),
            Err(CoreError::Forbidden(_))
        ));
    }

    #[test]
    fn test_expire_sweep() {
        let (mut t, user) = setup();
        let now = Utc::now();
        let req = create_request(&mut t, user, VerificationOp::PasswordChange, serde_json::json!({}), now)
            .unwrap();
        assert_eq!(expire_overdue(&mut t, now + Duration::minutes(11)), 1);
        assert_eq!(
            t.verification_requests[&req.id].status,
            VerificationStatus::Expired
        );
    }
}
