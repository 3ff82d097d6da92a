//! ID generation utilities for Wiggum
//!
//! Provides functions for generating unique identifiers for loops and sessions.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Current wall-clock time as a UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Generate a unique loop ID
///
/// Format: `{timestamp_ms}-{random_hex}`
/// Example: `1738300800123-a1b2`
pub fn generate_loop_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("{}-{:04x}", timestamp, random)
}

/// Generate a session ID for an iteration
///
/// Format: `session-{iteration:03}-{random_hex}`
/// Example: `session-007-9f3c21ab`
///
/// The zero-padded iteration keeps session directories sorted by iteration.
pub fn generate_session_id(iteration: u32) -> String {
    let random: u32 = rand::rng().random();
    format!("session-{:03}-{:08x}", iteration, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000);
        assert!(ts < 4102444800000);
    }

    #[test]
    fn test_generate_loop_id_format() {
        let id = generate_loop_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 4);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_loop_id_uniqueness() {
        let id1 = generate_loop_id();
        let id2 = generate_loop_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generate_session_id_format() {
        let id = generate_session_id(7);
        assert!(id.starts_with("session-007-"));
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_session_id_sorts_by_iteration() {
        let mut ids = vec![generate_session_id(10), generate_session_id(2), generate_session_id(1)];
        ids.sort();
        assert!(ids[0].starts_with("session-001-"));
        assert!(ids[1].starts_with("session-002-"));
        assert!(ids[2].starts_with("session-010-"));
    }
}
