//! Wire encoding of the mute flag: `"1"` muted, `"0"` unmuted.

pub const MUTED: &str = "1";
pub const UNMUTED: &str = "0";

pub fn encode_mute(muted: bool) -> &'static str {
    if muted {
        MUTED
    } else {
        UNMUTED
    }
}

/// Exact match only; whitespace or any other value yields `None`.
pub fn decode_mute(payload: &[u8]) -> Option<bool> {
    match payload {
        b"1" => Some(true),
        b"0" => Some(false),
        _ => None,
    }
}
