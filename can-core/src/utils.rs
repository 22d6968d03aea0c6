use std::time::{SystemTime, UNIX_EPOCH};
use chrono::{DateTime, Local};

#[inline]
pub fn system_timestamp() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(v) => v.as_millis() as u64,
        Err(e) => {
            log::warn!("CAN-PANEL - SystemTimeError: {0} when conversion failed!", e);
            0
        }
    }
}

/// Format a millisecond epoch timestamp as local `HH:MM:SS.mmm`.
pub fn format_time_of_day(timestamp: u64) -> String {
    match i64::try_from(timestamp).ok().and_then(DateTime::from_timestamp_millis) {
        Some(v) => v.with_timezone(&Local).format("%H:%M:%S%.3f").to_string(),
        None => {
            log::warn!("CAN-PANEL - timestamp {} out of range", timestamp);
            "--:--:--.---".into()
        }
    }
}

/// Parse a hex identifier with an optional `0x`/`0X` prefix.
pub fn parse_can_id(text: &str) -> Option<u32> {
    let text = text.trim();
    let text = text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    u32::from_str_radix(text, 16).ok()
}

/// Decode a hex payload. Whitespace is ignored and an odd count of digits
/// is left-padded with a `0` nibble.
pub fn decode_hex_payload(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let mut digits: String = text.chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        digits.insert(0, '0');
    }

    hex::decode(digits)
}

/// Upper-case hex digits separated by spaces, as shown in the frame log.
pub fn hex_spaced(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
