use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use kosh_common::model::{KycRecord, KycStatus, PostalAddress};
use kosh_common::{CoreError, Result};
use kosh_store::Tables;

/// Creates the empty pending record at registration.
pub fn create_pending(tables: &mut Tables, user_id: Uuid) -> Result<()> {
    if tables.user_kyc.contains_key(&user_id) {
        return Err(CoreError::Conflict("kyc record already exists".into()));
    }
    let now = Utc::now();
    tables.user_kyc.insert(
        user_id,
        KycRecord {
            user_id,
            status: KycStatus::Pending,
            pan: None,
            aadhaar: None,
            date_of_birth: None,
            address: None,
            rejection_reason: None,
            submitted_at: None,
            verified_at: None,
            rejected_at: None,
            created_at: now,
            updated_at: now,
        },
    );
    Ok(())
}

/// Fills the user's documents. Allowed while pending or after a rejection;
/// resubmission clears the rejection.
pub fn submit(
    tables: &mut Tables,
    user_id: Uuid,
    pan: String,
    aadhaar: String,
    date_of_birth: NaiveDate,
    address: PostalAddress,
) -> Result<KycRecord> {
    if pan.len() != 10 || !pan.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::Validation("PAN must be 10 alphanumeric characters".into()));
    }
    if aadhaar.len() != 12 || !aadhaar.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::Validation("Aadhaar must be 12 digits".into()));
    }

    let record = tables
        .user_kyc
        .get_mut(&user_id)
        .ok_or(CoreError::not_found("kyc record"))?;
    if record.status == KycStatus::Verified {
        return Err(CoreError::Conflict("kyc already verified".into()));
    }
    record.pan = Some(pan.to_ascii_uppercase());
    record.aadhaar = Some(aadhaar);
    record.date_of_birth = Some(date_of_birth);
    record.address = Some(address);
    record.status = KycStatus::Pending;
    record.rejection_reason = None;
    record.submitted_at = Some(Utc::now());
    record.updated_at = Utc::now();
    Ok(record.clone())
}

pub fn approve(tables: &mut Tables, user_id: Uuid) -> Result<KycRecord> {
    let record = tables
        .user_kyc
        .get_mut(&user_id)
        .ok_or(CoreError::not_found("kyc record"))?;
    if record.status != KycStatus::Pending || record.submitted_at.is_none() {
        return Err(CoreError::Conflict("kyc record is not awaiting review".into()));
    }
    record.status = KycStatus::Verified;
    record.verified_at = Some(Utc::now());
    record.updated_at = Utc::now();
    Ok(record.clone())
}

pub fn reject(tables: &mut Tables, user_id: Uuid, reason: String) -> Result<KycRecord> {
    let record = tables
        .user_kyc
        .get_mut(&user_id)
        .ok_or(CoreError::not_found("kyc record"))?;
    if record.status != KycStatus::Pending {
        return Err(CoreError::Conflict("kyc record is not awaiting review".into()));
    }
    record.status = KycStatus::Rejected;
    record.rejection_reason = Some(reason);
    record.rejected_at = Some(Utc::now());
    record.updated_at = Utc::now();
    Ok(record.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> PostalAddress {
        PostalAddress {
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            postal_code: "560001".into(),
        }
    }

    fn dob() -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 4, 12).unwrap()
    }

    #[test]
    fn test_lifecycle_pending_submit_approve() {
        let mut t = Tables::default();
        let user = Uuid::new_v4();
        create_pending(&mut t, user).unwrap();
        submit(&mut t, user, "abcde1234f".into(), "123456789012".into(), dob(), address()).unwrap();
        let record = approve(&mut t, user).unwrap();
        assert_eq!(record.status, KycStatus::Verified);
        assert_eq!(record.pan.as_deref(), Some("ABCDE1234F"));
    }

    #[test]
    fn test_approve_without_submission_rejected() {
        let mut t = Tables::default();
        let user = Uuid::new_v4();
        create_pending(&mut t, user).unwrap();
        assert!(approve(&mut t, user).is_err());
    }

    #[test]
    fn test_resubmit_after_rejection() {
        let mut t = Tables::default();
        let user = Uuid::new_v4();
        create_pending(&mut t, user).unwrap();
        submit(&mut t, user, "ABCDE1234F".into(), "123456789012".into(), dob(), address()).unwrap();
        reject(&mut t, user, "address illegible".into()).unwrap();
        let record =
            submit(&mut t, user, "ABCDE1234F".into(), "123456789012".into(), dob(), address())
                .unwrap();
        assert_eq!(record.status, KycStatus::Pending);
        assert!(record.rejection_reason.is_none());
    }

    #[test]
    fn test_document_validation() {
        let mut t = Tables::default();
        let user = Uuid::new_v4();
        create_pending(&mut t, user).unwrap();
        assert!(submit(&mut t, user, "short".into(), "123456789012".into(), dob(), address()).is_err());
        assert!(submit(&mut t, user, "ABCDE1234F".into(), "12345".into(), dob(), address()).is_err());
    }
}
