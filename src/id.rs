//! ID generation utilities
//!
//! Session identifiers handed out by the event-stream endpoint.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique session ID
///
/// Format: `{timestamp_ms:x}{random_hex}`, URL-safe, 28 hex chars max.
/// Example: `1950d1c2a4b9f3e1c07a2d4b8c`
pub fn generate_session_id() -> String {
    let timestamp = now_ms();
    let random: u64 = rand::rng().random();
    format!("{:x}{:016x}", timestamp, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_session_id_is_hex() {
        let id = generate_session_id();
        assert!(id.len() > 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_session_id_uniqueness() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(generate_session_id()), "Generated duplicate ID");
        }
    }
}
