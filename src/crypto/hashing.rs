//! Two hashing strengths, never interchangeable.
//!
//! Authorization codes and access/refresh tokens are high-volume, short-lived
//! secrets with full-entropy input: a fast SHA-256 digest is both sufficient
//! and required (the store looks rows up by digest). Vendor key secrets are
//! long-lived and must survive an offline dump, so they get Argon2id with a
//! per-secret salt. The two functions produce incompatible formats (hex digest
//! vs PHC string), so a mixup fails verification instead of silently weakening
//! storage.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Fast one-way digest for tokens and authorization codes. Deterministic so
/// the store can resolve a presented credential by hash lookup.
pub fn digest_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Constant-time comparison of two digests.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Slow, salted hash for vendor key secrets (Argon2id, PHC string output).
pub fn hash_vendor_secret(secret: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a presented vendor secret against its stored PHC string.
/// Returns false for malformed stored hashes rather than erroring, so a
/// corrupted row reads as an invalid credential.
pub fn verify_vendor_secret(secret: &str, stored_phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_digest_is_deterministic_hex() {
        let d1 = digest_token("oaat_example");
        let d2 = digest_token("oaat_example");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert!(d1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn vendor_secret_roundtrip() {
        let phc = hash_vendor_secret("s3cret-material").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_vendor_secret("s3cret-material", &phc));
        assert!(!verify_vendor_secret("wrong", &phc));
    }

    #[test]
    fn vendor_secret_hashes_are_salted() {
        let a = hash_vendor_secret("same-input").unwrap();
        let b = hash_vendor_secret("same-input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn formats_are_not_interchangeable() {
        // A fast digest is not a valid PHC string, so verifying a vendor
        // secret against it fails closed.
        let digest = digest_token("same-input");
        assert!(!verify_vendor_secret("same-input", &digest));
    }

    #[test]
    fn digest_comparison() {
        let d = digest_token("x");
        assert!(digests_match(&d, &d));
        assert!(!digests_match(&d, &digest_token("y")));
    }
}
