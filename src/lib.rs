// Production modules
pub mod error;
pub mod config;
pub mod schema;
pub mod guard;
pub mod critics;
pub mod oracle;
pub mod context;
pub mod embedding;
pub mod ledger;
pub mod engine;
pub mod metrics;
pub mod api;

/// Crate version, surfaced by the status endpoint and the health probe.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compute a SHA-256 digest and render it as 64 lowercase hex characters.
///
/// This is the CETI standard for all certification-facing hashing: context
/// hashes, transcript hashes and certification ids are all SHA-256 so that
/// clients can re-derive and verify them with stock tooling.
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_is_64_lowercase_hex_chars() {
        let digest = sha256_hex(b"ceti");
        assert_eq!(digest.len(), 64);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        // SHA-256 of the empty string is a published constant.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_hex_differs_on_input() {
        assert_ne!(sha256_hex(b"query a"), sha256_hex(b"query b"));
    }
}
