//! Node address / identity string conversions.
//!
//! Mesh nodes carry two identities: a stable user-id string and a 32-bit
//! radio address. By convention the user-id encodes the address as
//! `!<8-hex-digit-lowercase>`, but nothing enforces that, so the parse
//! direction is fallible and the string remains the primary key.

/// Format a numeric node address as the conventional `!<8-hex>` identity.
pub fn node_id_to_user_id(node_id: u64) -> String {
    format!("!{:08x}", node_id)
}

/// Parse a `!<hex>` identity string back to a numeric address.
///
/// Returns `None` for identities that do not follow the convention; callers
/// must treat the address as unknown in that case, not as an error.
pub fn node_id_from_user_id(user_id: &str) -> Option<u64> {
    let hex_part = user_id.strip_prefix('!')?;
    u64::from_str_radix(hex_part, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        assert_eq!(node_id_to_user_id(0x7fce1234), "!7fce1234");
        assert_eq!(node_id_from_user_id("!7fce1234"), Some(0x7fce1234));
    }

    #[test]
    fn test_zero_pads() {
        assert_eq!(node_id_to_user_id(0x2a), "!0000002a");
    }

    #[test]
    fn test_rejects_unconventional_ids() {
        assert_eq!(node_id_from_user_id("station-7"), None);
        assert_eq!(node_id_from_user_id("!zzzz"), None);
        assert_eq!(node_id_from_user_id(""), None);
    }
}
