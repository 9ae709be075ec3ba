//! PKCE S256 challenges and anti-forgery state tokens
//!
//! Every authorization request carries a fresh `state` token (checked on the
//! redirect callback) and a PKCE `S256` challenge (RFC 7636) whose verifier
//! is presented again at the token endpoint. Both are built from
//! cryptographically random bytes encoded as base64url without padding.

use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest, Sha256};

/// Number of random bytes behind a PKCE verifier (43 base64url characters).
const VERIFIER_BYTES: usize = 32;

/// Number of random bytes behind an anti-forgery state token.
const STATE_BYTES: usize = 16;

/// A PKCE verifier and the `S256` challenge derived from it.
///
/// # Examples
///
/// ```
/// use autoclerk::auth::pkce::PkceChallenge;
///
/// let pkce = PkceChallenge::generate();
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(PkceChallenge::METHOD, "S256");
/// ```
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Sent to the token endpoint as `code_verifier`.
    pub verifier: String,

    /// `BASE64URL(SHA256(verifier))`, sent to the authorization endpoint as
    /// `code_challenge`.
    pub challenge: String,
}

impl PkceChallenge {
    /// The only challenge method this crate emits.
    pub const METHOD: &'static str = "S256";

    /// Generates a fresh verifier/challenge pair.
    pub fn generate() -> Self {
        let verifier = random_urlsafe(VERIFIER_BYTES);
        let challenge = s256_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Computes the RFC 7636 `S256` challenge for a verifier.
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Generates a random anti-forgery `state` token for one authorization
/// attempt.
pub fn generate_state() -> String {
    random_urlsafe(STATE_BYTES)
}

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
