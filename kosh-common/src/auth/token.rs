use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{UserKind, UserStatus};
use crate::utils::time::epoch_secs;

type HmacSha256 = Hmac<Sha256>;

/// Tolerated clock drift between issuer and validator, in seconds.
pub const CLOCK_SKEW_SECS: i64 = 60;

/// Claims carried by a bearer credential.
///
/// Roles and resolved permission names are embedded at issue time so every
/// boundary can authorize without a round trip to the authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub status: UserStatus,
    pub account_kind: UserKind,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl Claims {
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p == name)
    }
}

/// Signs and verifies bearer tokens with HMAC-SHA256 over the serialized
/// claims. Tampering with either half invalidates the token.
#[derive(Clone)]
pub struct TokenCodec {
    key: Vec<u8>,
}

impl TokenCodec {
    /// The signing secret must be at least 32 bytes; shorter secrets are a
    /// boot-time configuration error.
    pub fn new(secret: &[u8]) -> Result<Self, CoreError> {
        if secret.len() < 32 {
            return Err(CoreError::Config(
                "JWT_SECRET must be at least 32 bytes".into(),
            ));
        }
        Ok(Self {
            key: secret.to_vec(),
        })
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, CoreError> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| CoreError::internal(format!("claims serialization: {e}")))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
        let sig = self.mac(payload_b64.as_bytes())?;
        Ok(format!("{}.{}", payload_b64, URL_SAFE_NO_PAD.encode(sig)))
    }

    /// Checks the signature in constant time, then the expiry with skew
    /// tolerance. Any failure is the same `Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<Claims, CoreError> {
        let (payload_b64, sig_b64) = token.split_once('.').ok_or(CoreError::Unauthorized)?;
        let given_sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| CoreError::Unauthorized)?;
        let expected_sig = self.mac(payload_b64.as_bytes())?;
        if given_sig.len() != expected_sig.len()
            || !bool::from(expected_sig.as_slice().ct_eq(&given_sig))
        {
            return Err(CoreError::Unauthorized);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| CoreError::Unauthorized)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| CoreError::Unauthorized)?;

        if epoch_secs() > claims.expires_at + CLOCK_SKEW_SECS {
            return Err(CoreError::Unauthorized);
        }
        Ok(claims)
    }

    fn mac(&self, data: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| CoreError::internal(format!("hmac key: {e}")))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Opaque digest of a bearer token, used as the session lookup key so the
/// plain token is never persisted.
pub fn token_hash(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"0123456789abcdef0123456789abcdef").unwrap()
    }

    fn claims(expires_at: i64) -> Claims {
        Claims {
            user_id: Uuid::new_v4(),
            email: "user@example.com".into(),
            status: UserStatus::Active,
            account_kind: UserKind::User,
            roles: vec!["user".into()],
            permissions: vec!["wallet:wallet:read".into()],
            issued_at: epoch_secs(),
            expires_at,
        }
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let codec = codec();
        let claims = claims(epoch_secs() + 3600);
        let token = codec.sign(&claims).unwrap();
        let decoded = codec.verify(&token).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = codec();
        let token = codec.sign(&claims(epoch_secs() + 3600)).unwrap();
        let (payload, sig) = token.split_once('.').unwrap();
        let mut forged = payload.to_string();
        forged.push('A');
        let forged = format!("{forged}.{sig}");
        assert!(matches!(
            codec.verify(&forged),
            Err(CoreError::Unauthorized)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = codec().sign(&claims(epoch_secs() + 3600)).unwrap();
        let other = TokenCodec::new(b"another-secret-key-of-32-bytes!!").unwrap();
        assert!(matches!(other.verify(&token), Err(CoreError::Unauthorized)));
    }

    #[test]
    fn test_expired_token_rejected_past_skew() {
        let codec = codec();
        let token = codec
            .sign(&claims(epoch_secs() - CLOCK_SKEW_SECS - 5))
            .unwrap();
        assert!(matches!(codec.verify(&token), Err(CoreError::Unauthorized)));
    }

    #[test]
    fn test_expired_within_skew_accepted() {
        let codec = codec();
        let token = codec.sign(&claims(epoch_secs() - 10)).unwrap();
        assert!(codec.verify(&token).is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TokenCodec::new(b"too-short").is_err());
    }

    #[test]
    fn test_token_hash_is_stable_and_opaque() {
        let h1 = token_hash("abc");
        let h2 = token_hash("abc");
        assert_eq!(h1, h2);
        assert_ne!(h1, token_hash("abd"));
        assert!(!h1.contains("abc"));
    }
}
