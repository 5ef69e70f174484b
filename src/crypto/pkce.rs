//! PKCE (RFC 7636), S256 only.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The only supported challenge method. `plain` is rejected at the
/// authorization endpoint.
pub const METHOD_S256: &str = "S256";

const MIN_VERIFIER_LENGTH: usize = 43;
const MAX_VERIFIER_LENGTH: usize = 128;

/// Compute the S256 challenge for a verifier: BASE64URL(SHA256(verifier)).
pub fn compute_s256_challenge(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Validate a presented verifier against the stored challenge.
///
/// Length/charset violations and challenge mismatches are indistinguishable
/// to the caller: all of them are simply "not verified". The comparison is
/// constant-time.
pub fn verify(code_verifier: &str, code_challenge: &str) -> bool {
    if code_verifier.len() < MIN_VERIFIER_LENGTH || code_verifier.len() > MAX_VERIFIER_LENGTH {
        return false;
    }

    // RFC 7636 unreserved set
    if !code_verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    {
        return false;
    }

    let computed = compute_s256_challenge(code_verifier);
    computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_matching_pair() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = compute_s256_challenge(verifier);
        assert!(verify(verifier, &challenge));
    }

    #[test]
    fn verify_rfc7636_appendix_b_vector() {
        // Appendix B of RFC 7636 pins this exact pair.
        assert!(verify(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
        ));
    }

    #[test]
    fn verify_rejects_mismatch() {
        let challenge = compute_s256_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert!(!verify(
            "aDifferentVerifierValue_thats-long-enough-0123",
            &challenge
        ));
    }

    #[test]
    fn verify_rejects_short_verifier() {
        let challenge = compute_s256_challenge("tooshort");
        assert!(!verify("tooshort", &challenge));
    }

    #[test]
    fn verify_rejects_invalid_charset() {
        let verifier = "has spaces and @symbols which are not unreserved!!";
        let challenge = compute_s256_challenge(verifier);
        assert!(!verify(verifier, &challenge));
    }

    #[test]
    fn verify_rejects_empty_verifier() {
        assert!(!verify("", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"));
    }
}
