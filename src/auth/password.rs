use crate::error::{Result, ServiceError};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use std::sync::OnceLock;

static DECOY_HASH: OnceLock<Option<String>> = OnceLock::new();

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServiceError::Internal(format!("failed to hash password: {e}")))?;

    Ok(hash.to_string())
}

/// Check `password` against a stored PHC hash string.
///
/// An unparseable stored hash never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Run a full Argon2 verification against a throwaway hash and fail.
/// Used for unknown user names at login.
pub fn verify_decoy(password: &str) -> bool {
    let decoy = DECOY_HASH.get_or_init(|| hash_password("decoy-password").ok());
    if let Some(hash) = decoy {
        let _ = verify_password(password, hash);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("mypassword").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("mypassword", &hash));
        assert!(!verify_password("wrong_password", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("same").unwrap();
        let second = hash_password("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_decoy_never_verifies() {
        assert!(!verify_decoy("decoy-password"));
        assert!(!verify_decoy("anything"));
        assert!(DECOY_HASH.get().is_some_and(|hash| hash.is_some()));
    }
}
