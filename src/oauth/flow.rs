use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::random::url_safe_token;

/// Per-login secrets kept in the flow cookies until the provider calls back.
pub(crate) struct FlowSecrets {
    /// CSRF `state`: 16 random bytes, 22 characters.
    pub(crate) state: String,
    /// PKCE verifier: 48 random bytes, 64 characters (RFC 7636 allows 43-128).
    pub(crate) code_verifier: String,
}

impl FlowSecrets {
    pub(crate) fn generate() -> Result<Self, Error> {
        Ok(Self {
            state: url_safe_token::<16>()?,
            code_verifier: url_safe_token::<48>()?,
        })
    }

    pub(crate) fn code_challenge(&self) -> String {
        code_challenge(&self.code_verifier)
    }
}

/// S256 challenge: `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_have_expected_lengths() {
        let secrets = FlowSecrets::generate().unwrap();
        assert_eq!(secrets.state.len(), 22);
        assert_eq!(secrets.code_verifier.len(), 64);
    }

    #[test]
    fn secrets_differ_per_login() {
        let a = FlowSecrets::generate().unwrap();
        let b = FlowSecrets::generate().unwrap();
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_verifier, b.code_verifier);
    }

    #[test]
    fn challenge_matches_rfc7636_example() {
        // RFC 7636, Appendix B.
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}
