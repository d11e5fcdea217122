//! Client fingerprint derivation.

use axum::http::{HeaderMap, header::USER_AGENT};
use sha2::{Digest, Sha256};

/// Derives the binding fingerprint for a client from its raw `User-Agent`
/// bytes.
///
/// The raw header never ends up inside a token; only its SHA-256 digest does.
/// Non-ASCII bytes are hashed as-is, so two clients differing only there get
/// different fingerprints.
#[must_use]
pub fn client_fingerprint(user_agent: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(user_agent.as_ref()))
}

/// Fingerprint of the client that sent `headers`.
///
/// Used both when issuing a token at login and when checking one. A missing
/// header is fingerprinted as the empty string.
#[must_use]
pub fn request_fingerprint(headers: &HeaderMap) -> String {
    let user_agent = headers
        .get(USER_AGENT)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    client_fingerprint(user_agent)
}
