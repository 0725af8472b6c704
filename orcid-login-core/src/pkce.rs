use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{distr::Alphanumeric, rng, Rng};
use sha2::{Digest, Sha256};

/// Proof Key for Code Exchange (PKCE) parameters.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// High-entropy cryptographic random string
    pub code_verifier: String,
    /// BASE64URL-ENCODE(SHA256(ASCII(code_verifier)))
    pub code_challenge: String,
}

impl Pkce {
    /// Generates a new PKCE verifier and challenge.
    pub fn new() -> Self {
        Self::from_verifier(random_token(64))
    }

    /// Derives the S256 challenge for an existing verifier.
    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
        Self {
            code_verifier,
            code_challenge,
        }
    }
}

impl Default for Pkce {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates an alphanumeric token from the thread-local CSPRNG.
///
/// Each character carries log2(62) ≈ 5.95 bits, so 43 characters exceed 256 bits.
pub fn random_token(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A short, non-reversible fingerprint of a secret value, safe to log.
pub fn fingerprint(value: &str) -> String {
    let hash = Sha256::digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&hash[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_vector() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(
            pkce.code_challenge,
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_random_tokens_differ() {
        let a = random_token(43);
        let b = random_token(43);
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_does_not_leak_value() {
        let fp = fingerprint("state-token-value");
        assert_eq!(fp.len(), 8);
        assert_eq!(fp, fingerprint("state-token-value"));
    }
}
