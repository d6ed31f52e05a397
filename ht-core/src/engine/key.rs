//! Label key normalization
//!
//! Device-derived identifiers (WWNs, serial numbers) have arbitrary length
//! and charset. Label stores cap the name segment of a key at 63 characters
//! drawn from `[A-Za-z0-9_.-]`. Long names are shortened to 57 characters
//! plus a dash and a 5 character hash of the full name, so two different
//! long names stay distinct.

use sha1::{Digest, Sha1};
use tracing::info;

use crate::constants::labels::{HASH_SUFFIX_LEN, MAX_NAME_LEN};

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Map a raw "<namespace>/<name>" key to a store-legal key
///
/// Deterministic and total. A key without a `/` is treated as a bare name.
pub fn normalize_key(raw: &str) -> String {
    match raw.split_once('/') {
        Some((namespace, name)) => format!("{}/{}", namespace, normalize_name(name)),
        None => normalize_name(raw),
    }
}

/// Normalize only the name segment of a key
pub fn normalize_name(name: &str) -> String {
    let name = if name.len() > MAX_NAME_LEN {
        let truncated = format!(
            "{}-{}",
            truncate_at_boundary(name, MAX_NAME_LEN - HASH_SUFFIX_LEN - 1),
            hash_suffix(name)
        );
        info!("Truncating name {} to {}", name, truncated);
        truncated
    } else {
        name.to_string()
    };

    name.chars()
        .map(|c| if is_label_char(c) { c } else { '-' })
        .collect()
}

/// Whether a character may appear in a label name segment
pub fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// First characters of the base32 (RFC 4648) encoded SHA-1 digest, lowercased
fn hash_suffix(name: &str) -> String {
    let digest = Sha1::digest(name.as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (0..HASH_SUFFIX_LEN)
        .map(|i| {
            let index = (head >> (27 - 5 * i)) & 0x1f;
            (BASE32_ALPHABET[index as usize] as char).to_ascii_lowercase()
        })
        .collect()
}

/// Longest prefix of at most `max` bytes ending on a char boundary
fn truncate_at_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_segment(key: &str) -> &str {
        key.split_once('/').map(|(_, n)| n).unwrap_or(key)
    }

    #[test]
    fn test_short_key_unchanged() {
        assert_eq!(
            normalize_key("node-devices.alpha.kubernetes.io/block-disk-wwn-0x5000c500a1b2c3d4"),
            "node-devices.alpha.kubernetes.io/block-disk-wwn-0x5000c500a1b2c3d4"
        );
    }

    #[test]
    fn test_invalid_chars_replaced() {
        assert_eq!(
            normalize_key("example.com/block-disk-sn-WD Blue:1TB/2"),
            "example.com/block-disk-sn-WD-Blue-1TB-2"
        );
        assert_eq!(normalize_key("example.com/naïve"), "example.com/na-ve");
    }

    #[test]
    fn test_long_name_truncated_with_hash() {
        let raw = format!("example.com/block-disk-sn-{}", "S".repeat(70));
        let key = normalize_key(&raw);
        let name = name_segment(&key);

        assert_eq!(name.len(), MAX_NAME_LEN);
        assert_eq!(&name[..57], &raw["example.com/".len().."example.com/".len() + 57]);
        assert_eq!(&name[57..58], "-");
        let suffix = &name[58..];
        assert_eq!(suffix.len(), 5);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn test_hash_suffix_matches_reference_encoding() {
        // sha1("abc") = a9993e36..., base32 "VGMT4NSH..."
        assert_eq!(hash_suffix("abc"), "vgmt4");
    }

    #[test]
    fn test_distinct_long_names_do_not_collide() {
        let common = "x".repeat(60);
        let a = normalize_key(&format!("ns/{}-first", common));
        let b = normalize_key(&format!("ns/{}-second", common));
        assert_ne!(a, b);
    }

    #[test]
    fn test_deterministic() {
        let raw = format!("ns/{}", "0123456789".repeat(9));
        assert_eq!(normalize_key(&raw), normalize_key(&raw));
    }

    #[test]
    fn test_length_and_charset_bounds() {
        let inputs = [
            String::new(),
            "a".repeat(63),
            "a".repeat(64),
            "é".repeat(40),
            "💾".repeat(30),
            "a b\tc\n/d:e".repeat(20),
        ];
        for input in &inputs {
            let key = normalize_key(&format!("ns/{}", input));
            let name = name_segment(&key);
            assert!(name.len() <= MAX_NAME_LEN, "{:?} -> {:?}", input, name);
            assert!(name.chars().all(is_label_char), "{:?} -> {:?}", input, name);
        }
    }

    #[test]
    fn test_only_first_slash_splits() {
        assert_eq!(normalize_key("ns/a/b"), "ns/a-b");
        assert_eq!(normalize_key("bare name"), "bare-name");
    }
}
