use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::strip_hex_prefix;

/// SHA-256 hex digest of the canonical JSON form of `data`.
///
/// Struct fields serialize in declaration order, so equal values always hash
/// equally.
pub fn sha256_hex<T: Serialize + ?Sized>(data: &T) -> String {
    let bytes = serde_json::to_vec(data).expect("Hashed values serialize to JSON");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// `hash < ceiling`, both read as hex magnitudes. The shorter string is
/// left-padded with zeros so lengths match before comparing.
pub fn is_hash_below_ceiling(hash: &str, ceiling: &str) -> bool {
    let hash = strip_hex_prefix(hash).to_ascii_lowercase();
    let ceiling = strip_hex_prefix(ceiling).to_ascii_lowercase();
    let width = hash.len().max(ceiling.len());
    let hash = format!("{hash:0>width$}");
    let ceiling = format!("{ceiling:0>width$}");
    hash < ceiling
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = sha256_hex(&serde_json::json!({ "k": [1, 2, 3] }));
        let b = sha256_hex(&serde_json::json!({ "k": [1, 2, 3] }));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, sha256_hex(&serde_json::json!({ "k": [1, 2] })));
    }

    #[test]
    fn equal_length_comparison() {
        assert!(is_hash_below_ceiling("0001", "0002"));
        assert!(!is_hash_below_ceiling("0002", "0002"));
        assert!(!is_hash_below_ceiling("0003", "0002"));
    }

    #[test]
    fn pads_shorter_operand() {
        assert!(is_hash_below_ceiling("ff", "0100"));
        assert!(!is_hash_below_ceiling("0100", "ff"));
        assert!(is_hash_below_ceiling("0x00ff", "0x100"));
    }

    #[test]
    fn case_insensitive() {
        assert!(is_hash_below_ceiling("00AB", "00ac"));
    }
}
