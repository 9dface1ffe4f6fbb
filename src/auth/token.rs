//! Password-reset tokens
//! ---------------------
//! Stateless, time-limited capability tokens. A token is
//! `b64(email).b64(issued_at).b64(hmac)` where the HMAC-SHA256 covers the salt
//! and both payload parts. Nothing is persisted server-side: verification is
//! the signature check plus an age check against the embedded timestamp.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Tokens older than this are rejected unless the caller widens the window.
pub const DEFAULT_RESET_MAX_AGE_SECS: i64 = 3600;

/// Domain separation from anything else the server secret might sign.
const RESET_SALT: &str = "alcove.password-reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Wrong shape, bad encoding or signature mismatch.
    #[error("reset token is invalid")]
    Invalid,
    /// Genuine signature, but issued too long ago.
    #[error("reset token has expired")]
    Expired,
}

#[derive(Clone)]
pub struct ResetTokenSigner {
    secret: String,
    salt: String,
}

impl ResetTokenSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        ResetTokenSigner { secret: secret.into(), salt: RESET_SALT.to_string() }
    }

    /// Signs a token for `email` issued now.
    pub fn issue(&self, email: &str) -> String {
        self.issue_at(email, crate::now_epoch())
    }

    /// Signs a token with an explicit issuance time. Tests use this to age
    /// tokens without sleeping.
    pub fn issue_at(&self, email: &str, issued_at: i64) -> String {
        let email_part = URL_SAFE_NO_PAD.encode(email.as_bytes());
        let ts_part = URL_SAFE_NO_PAD.encode(issued_at.to_string().as_bytes());
        let sig = self.mac_for(&email_part, &ts_part).finalize().into_bytes();
        format!("{email_part}.{ts_part}.{}", URL_SAFE_NO_PAD.encode(sig))
    }

    /// Verifies signature and age, returning the embedded email.
    pub fn verify(&self, token: &str, max_age_secs: i64) -> Result<String, TokenError> {
        self.verify_at(token, max_age_secs, crate::now_epoch())
    }

    pub fn verify_at(
        &self,
        token: &str,
        max_age_secs: i64,
        now: i64,
    ) -> Result<String, TokenError> {
        let mut parts = token.split('.');
        let (Some(email_part), Some(ts_part), Some(sig_part), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Invalid);
        };

        let sig = URL_SAFE_NO_PAD.decode(sig_part).map_err(|_| TokenError::Invalid)?;
        self.mac_for(email_part, ts_part)
            .verify_slice(&sig)
            .map_err(|_| TokenError::Invalid)?;

        // Signature is genuine from here on; only age can fail.
        let ts_bytes = URL_SAFE_NO_PAD.decode(ts_part).map_err(|_| TokenError::Invalid)?;
        let issued_at = std::str::from_utf8(&ts_bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(TokenError::Invalid)?;
        if now - issued_at > max_age_secs {
            return Err(TokenError::Expired);
        }

        let email_bytes = URL_SAFE_NO_PAD.decode(email_part).map_err(|_| TokenError::Invalid)?;
        String::from_utf8(email_bytes).map_err(|_| TokenError::Invalid)
    }

    fn mac_for(&self, email_part: &str, ts_part: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(self.salt.as_bytes());
        mac.update(b".");
        mac.update(email_part.as_bytes());
        mac.update(b".");
        mac.update(ts_part.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> ResetTokenSigner {
        ResetTokenSigner::new("unit-test-secret")
    }

    #[test]
    fn roundtrip_returns_embedded_email() {
        let token = signer().issue("user@example.com");
        let email = signer().verify(&token, DEFAULT_RESET_MAX_AGE_SECS).unwrap();
        assert_eq!(email, "user@example.com");
    }

    #[test]
    fn tampering_with_any_part_invalidates() {
        let token = signer().issue("user@example.com");
        let mut parts: Vec<&str> = token.split('.').collect();
        let other = URL_SAFE_NO_PAD.encode(b"evil@example.com");
        parts[0] = &other;
        let forged = parts.join(".");
        assert_eq!(
            signer().verify(&forged, DEFAULT_RESET_MAX_AGE_SECS),
            Err(TokenError::Invalid)
        );
        assert_eq!(signer().verify("nonsense", 3600), Err(TokenError::Invalid));
        assert_eq!(signer().verify("a.b", 3600), Err(TokenError::Invalid));
    }

    #[test]
    fn different_secret_means_invalid() {
        let token = signer().issue("user@example.com");
        let other = ResetTokenSigner::new("another-secret");
        assert_eq!(other.verify(&token, 3600), Err(TokenError::Invalid));
    }

    #[test]
    fn age_window_is_caller_controlled() {
        let now = 1_700_000_000;
        let token = signer().issue_at("user@example.com", now - 7200);
        // Two hours old: expired under the default hour, fine under two hours.
        assert_eq!(
            signer().verify_at(&token, DEFAULT_RESET_MAX_AGE_SECS, now),
            Err(TokenError::Expired)
        );
        assert_eq!(
            signer().verify_at(&token, 7200, now).as_deref(),
            Ok("user@example.com")
        );
    }
}
