//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol_constants::LIVE_STREAM_SCHEMES;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Converts a filesystem timestamp to Unix milliseconds (0 if unavailable).
#[must_use]
pub fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Source Classification
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the lowercase URL scheme of `source`, if it has one.
///
/// Only `scheme://` forms count; Windows-style `C:\` paths and bare file
/// names return `None`.
#[must_use]
pub fn url_scheme(source: &str) -> Option<String> {
    let (scheme, _) = source.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}

/// Returns true if the source is a network URL rather than a local file name.
#[must_use]
pub fn is_network_source(source: &str) -> bool {
    url_scheme(source).is_some()
}

/// Returns true if the source is a live stream the watchdog should supervise.
#[must_use]
pub fn is_live_stream(source: &str) -> bool {
    url_scheme(source).is_some_and(|s| LIVE_STREAM_SCHEMES.contains(&s.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtsp_urls_are_live_streams() {
        assert!(is_live_stream("rtsp://10.0.0.8:554/stream1"));
        assert!(is_live_stream("RTSP://camera/main"));
        assert!(is_live_stream("srt://relay:9000"));
    }

    #[test]
    fn http_urls_are_network_but_not_live() {
        assert!(is_network_source("https://cdn.example.com/promo.mp4"));
        assert!(!is_live_stream("https://cdn.example.com/promo.mp4"));
    }

    #[test]
    fn plain_file_names_have_no_scheme() {
        assert_eq!(url_scheme("promo.mp4"), None);
        assert_eq!(url_scheme("weird name://x.mp4"), None);
        assert!(!is_network_source("clips/intro.mkv"));
    }
}
