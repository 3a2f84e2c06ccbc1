//! Key layout and encoding utilities for Fjall partitions
//!
//! Partition structure:
//! - `control`: control:singleton -> RunControl (JSON)
//! - `activity`: act:{seq:020} -> ActivityEntry (JSON)
//!
//! Activity sequence numbers are zero-padded so lexical key order matches
//! append order.

/// Fixed id of the run control record
pub const CONTROL_ID: &str = "singleton";

/// Encode the control key: control:{id}
pub fn encode_control_key(id: &str) -> Vec<u8> {
    format!("control:{}", id).into_bytes()
}

/// Encode an activity key: act:{seq:020}
pub fn encode_activity_key(seq: u64) -> Vec<u8> {
    format!("act:{:020}", seq).into_bytes()
}

/// Decode an activity key: act:{seq:020} -> seq
pub fn decode_activity_key(key: &[u8]) -> Option<u64> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("act:")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_key_encoding() {
        assert_eq!(encode_control_key(CONTROL_ID), b"control:singleton");
    }

    #[test]
    fn test_activity_key_encoding() {
        let key = encode_activity_key(42);
        assert_eq!(key, b"act:00000000000000000042");
        assert_eq!(decode_activity_key(&key), Some(42));
    }

    #[test]
    fn test_activity_keys_sort_by_sequence() {
        assert!(encode_activity_key(9) < encode_activity_key(10));
        assert!(encode_activity_key(99) < encode_activity_key(1_000));
    }

    #[test]
    fn test_decode_rejects_foreign_keys() {
        assert_eq!(decode_activity_key(b"control:singleton"), None);
        assert_eq!(decode_activity_key(b"act:abc"), None);
    }
}
