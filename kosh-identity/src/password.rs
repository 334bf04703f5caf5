use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use kosh_common::{CoreError, Result};

// Argon2id with memory hardness well above a bcrypt-12 work factor.
const MEMORY_KIB: u32 = 65536;
const ITERATIONS: u32 = 3;
const PARALLELISM: u32 = 1;

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, None)
        .map_err(|_| CoreError::internal("invalid argon2 parameters"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password into a self-describing PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| CoreError::internal("argon2 hashing failed"))?;
    Ok(hash.to_string())
}

/// Verifies a password against a stored hash. Returns false on mismatch and
/// on a malformed hash; the caller folds both into the uniform credential
/// failure.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    let Ok(argon2) = hasher() else {
        return false;
    };
    argon2.verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Burns the same hashing work as a real verification, so the sign-in path
/// takes indistinguishable time when the identifier resolves to no user.
pub fn verify_dummy(password: &str) {
    // Fixed salt: the output is discarded, only the timing matters.
    let salt = SaltString::encode_b64(b"kosh-dummy-salt!").expect("static salt encodes");
    if let Ok(argon2) = hasher() {
        let _ = argon2.hash_password(password.as_bytes(), &salt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verify_round_trip() {
        let hash = hash_password("hunter2-but-long").unwrap();
        assert!(verify_password("hunter2-but-long", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let h1 = hash_password("same-password").unwrap();
        let h2 = hash_password("same-password").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_malformed_hash_rejected() {
        assert!(!verify_password("x", "not-a-phc-string"));
    }
}
