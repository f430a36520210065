//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$...`), so parameters
//! travel with each hash.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use once_cell::sync::Lazy;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Hashes a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| format!("failed to hash password: {err}"))
}

/// Checks a password against a stored PHC hash.
///
/// `Ok(false)` is a mismatch; `Err` means the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed =
        PasswordHash::new(hash).map_err(|err| format!("invalid password hash: {err}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

static DECOY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("archivo-decoy-credential").ok());

/// Verifies against a fixed hash so an unknown account costs the same as a
/// wrong password. Always `false`.
pub fn verify_decoy(password: &str) -> bool {
    if let Some(hash) = DECOY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

/// Password strength rule applied at sign-up and on every change.
pub fn is_acceptable_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

#[cfg(test)]
mod tests {
    use super::{hash_password, is_acceptable_password, verify_decoy, verify_password, DECOY_HASH};

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn decoy_runs_a_real_verification_and_never_matches() {
        let hash = DECOY_HASH.as_deref().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!verify_decoy("archivo-decoy-credential"));
        assert!(!verify_decoy(""));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("whatever", "not-a-hash").is_err());
    }

    #[test]
    fn length_rule_counts_characters() {
        assert!(!is_acceptable_password("short"));
        assert!(is_acceptable_password("ñandúñandú"));
        assert!(!is_acceptable_password("ñandú"));
    }
}
