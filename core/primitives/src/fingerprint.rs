// sentinel/core/primitives/src/fingerprint.rs

/// Salted, truncated hash of a client fingerprint.
///
/// Diagnostics travel between operators, so raw client identifiers must not
/// leave the aggregator. The salt is deployment-local, which keeps hashes
/// comparable within one operator's records but meaningless across them.
pub fn fingerprint_hash(fingerprint: &str, salt: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(b"|");
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    format!("fphash:{}", hex::encode(&digest.as_bytes()[..6]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_hash_deterministic() {
        let a = fingerprint_hash("203.0.113.7", "salt");
        let b = fingerprint_hash("203.0.113.7", "salt");
        assert_eq!(a, b);
        assert!(a.starts_with("fphash:"));
        assert_eq!(a.len(), "fphash:".len() + 12);
    }

    #[test]
    fn test_fingerprint_hash_salt_sensitive() {
        let a = fingerprint_hash("203.0.113.7", "salt-a");
        let b = fingerprint_hash("203.0.113.7", "salt-b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_hash_input_sensitive() {
        let a = fingerprint_hash("203.0.113.7", "salt");
        let b = fingerprint_hash("203.0.113.8", "salt");
        assert_ne!(a, b);
    }
}
