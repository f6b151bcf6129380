//! Default configuration constants for callguard.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

/// Sentinel marker terminating the identity header and each audio clip.
///
/// The capturing device writes `<identity>EOF<clip>EOF<clip>EOF...` on a
/// single raw TCP stream. The marker is matched as bytes, not as a line.
pub const SENTINEL: &[u8] = b"EOF";

/// Maximum number of stream bytes scanned for the identity header.
///
/// Historically the header had to fit in the device's first 1024-byte write.
/// A stream that produces this many bytes without a sentinel is malformed.
pub const HEADER_SCAN_LIMIT: usize = 1024;

/// Socket read chunk size in bytes.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Default TCP listen port for device connections.
pub const DEFAULT_PORT: u16 = 8000;

/// Default listen address.
///
/// Devices connect over the network, so bind all interfaces.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default cap on simultaneous device sessions.
///
/// Connections beyond the cap are closed immediately rather than queued.
pub const MAX_CONNECTIONS: usize = 256;

/// Default analysis service endpoint.
pub const ANALYSIS_ENDPOINT: &str = "https://peeper-ai.dev-lr.com/wavAnalysis";

/// Default timeout for one analysis request, in seconds.
///
/// There is exactly one outbound request per clip and no retry, so this is
/// the longest a session can stall on a single clip.
pub const ANALYSIS_TIMEOUT_SECS: u64 = 30;

/// Default push gateway endpoint (topic-addressed send).
pub const PUSH_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// Fixed notification title: "voice phishing detected".
pub const PUSH_TITLE: &str = "보이스피싱이 탐지되었습니다!";

/// Risk labels that produce the milder advisory body.
///
/// Stage 1 "suspected" and stage 2 "caution". Matched exactly; every other
/// label gets the strong warning.
pub const CAUTION_LABELS: [&str; 2] = ["1단계 의심", "2단계 주의"];

/// Advisory body for the two caution labels: "watch what you say on this call".
pub const CAUTION_BODY: &str = "통화 내용에 유의해주세요.";

/// Warning body for all other labels: "guard personal/financial data and hang up".
pub const WARNING_BODY: &str = "개인정보 및 금전 탈취에 주의하고 통화를 끊어주세요.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_three_bytes() {
        assert_eq!(SENTINEL.len(), 3);
        assert_eq!(SENTINEL, b"EOF");
    }

    #[test]
    fn header_limit_smaller_than_chunk() {
        // The header must be resolvable before clip streaming begins.
        assert!(HEADER_SCAN_LIMIT < READ_CHUNK_SIZE);
    }
}
