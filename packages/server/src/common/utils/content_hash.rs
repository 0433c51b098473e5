use sha2::{Digest, Sha256};

/// SHA-256 hex digest of raw bytes.
///
/// Used for deploy upload entries, where the provider dedupes files by hash.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Deterministic ownership token for a domain.
///
/// Derived from the normalized name, the record id and a server secret so a
/// token cannot be predicted without the secret and never changes for a
/// given domain row.
pub fn domain_verification_token(name: &str, id: &str, secret: &str) -> String {
    let digest = sha256_hex(format!("{}:{}:{}", name, id, secret).as_bytes());
    digest[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_token_is_stable_and_secret_dependent() {
        let a = domain_verification_token("example.com", "id-1", "secret");
        let b = domain_verification_token("example.com", "id-1", "secret");
        let c = domain_verification_token("example.com", "id-1", "other");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }
}
