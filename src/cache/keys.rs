//! Fingerprints and content digests.
//!
//! Fingerprints are SHA-256 over length-prefixed fields so that field boundaries are part of
//! the key: `["ab", "c"]` and `["a", "bc"]` never collide.

use sha2::{Digest, Sha256};

const SUMMARY_MAX_CHARS: usize = 120;

/// Deterministic, order-sensitive digest of the given input fields, hex encoded.
pub fn fingerprint(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Plain SHA-256 hex digest of one text value.
pub fn digest_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short human-readable rendition of the key inputs, stored next to an entry for audits.
pub fn input_summary(fields: &[&str]) -> String {
    let joined = fields
        .iter()
        .map(|field| field.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(" | ");
    match joined.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((index, _)) => format!("{}…", &joined[..index]),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let first = fingerprint(&["https://example.com/a", "Title", "gen-1"]);
        let second = fingerprint(&["https://example.com/a", "Title", "gen-1"]);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        assert_ne!(fingerprint(&["a", "b"]), fingerprint(&["b", "a"]));
    }

    #[test]
    fn fingerprint_keeps_field_boundaries() {
        assert_ne!(fingerprint(&["ab", "c"]), fingerprint(&["a", "bc"]));
        assert_ne!(fingerprint(&["a|b"]), fingerprint(&["a", "b"]));
    }

    #[test]
    fn digest_matches_known_vector() {
        assert_eq!(
            digest_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn input_summary_is_bounded() {
        let long = "word ".repeat(100);
        let summary = input_summary(&[&long, "tail"]);
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS + 1);
        assert!(summary.ends_with('…'));
        assert_eq!(input_summary(&["a  b", "c"]), "a b | c");
    }
}
