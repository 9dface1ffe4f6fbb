//! Password hashing and the account password policy.

use crate::error::{AppError, AppResult};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

/// Hashes a password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| AppError::internal("rng", e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::internal("password_hash", e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("password_hash", e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Verifies a password against a stored PHC string. An unparseable hash
/// verifies as false rather than erroring.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

/// Account password policy: at least 8 characters, one uppercase letter, one
/// lowercase letter and one digit.
pub fn check_password_policy(password: &str) -> AppResult<()> {
    if password.chars().count() < 8 {
        return Err(weak("password must be at least 8 characters long"));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(weak("password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(weak("password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(weak("password must contain at least one number"));
    }
    Ok(())
}

fn weak(message: &str) -> AppError {
    AppError::validation("weak_password", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let phc = hash_password("Correct1Horse").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(verify_password(&phc, "Correct1Horse"));
        assert!(!verify_password(&phc, "wrong1Horse"));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("not-a-phc-string", "anything"));
        assert!(!verify_password("", "anything"));
    }

    #[test]
    fn policy_requires_each_character_class() {
        assert!(check_password_policy("Abcdef12").is_ok());
        assert!(check_password_policy("Ab1").is_err()); // too short
        assert!(check_password_policy("abcdef12").is_err()); // no uppercase
        assert!(check_password_policy("ABCDEF12").is_err()); // no lowercase
        assert!(check_password_policy("Abcdefgh").is_err()); // no digit
    }
}
