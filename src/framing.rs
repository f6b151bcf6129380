//! Sentinel-delimited stream framing.
//!
//! Splits one connection's byte stream into an identity header followed by
//! audio clips. The wire format is:
//!
//! ```text
//! <identity> EOF <clip bytes> EOF <clip bytes> EOF ...
//! ```
//!
//! The scanner is incremental: bytes arrive in arbitrary read-sized pushes
//! and a sentinel may straddle any push boundary. The accumulator keeps the
//! unconsumed tail between pushes, so split sentinels are detected and bytes
//! following a sentinel seed the next clip instead of being dropped. Earlier
//! firmware relied on each read chunk being scanned independently, which
//! silently lost both cases; the stream scan replaces that behavior.
//!
//! No partial clip is ever emitted: whatever is left unterminated when the
//! stream ends is discarded by [`FrameScanner::finish`].

use crate::defaults;
use crate::error::{CallguardError, Result};

/// One framing unit recovered from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    /// The per-connection identity parsed from the stream header.
    Identity(String),
    /// One complete audio clip: exactly the bytes between two sentinels.
    Clip(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Still scanning for the header sentinel.
    Header,
    /// Identity parsed; every further sentinel terminates a clip.
    Clips,
    /// Header was malformed; the scanner ignores all further input.
    Failed,
}

/// Incremental sentinel scanner for one connection.
///
/// The accumulator is scoped to a single connection and is cleared each time
/// a clip is emitted. Feed it with [`push`](Self::push) as bytes arrive and
/// call [`finish`](Self::finish) when the stream ends.
pub struct FrameScanner {
    phase: Phase,
    /// Bytes accumulated since the last sentinel (or stream start).
    accumulator: Vec<u8>,
    /// Total bytes ever pushed, used to distinguish an empty stream from a
    /// headerless one.
    total_in: u64,
    header_limit: usize,
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScanner {
    /// Creates a scanner with the standard header scan limit.
    pub fn new() -> Self {
        Self::with_header_limit(defaults::HEADER_SCAN_LIMIT)
    }

    /// Creates a scanner with a custom header scan limit.
    pub fn with_header_limit(header_limit: usize) -> Self {
        Self {
            phase: Phase::Header,
            accumulator: Vec::new(),
            total_in: 0,
            header_limit,
        }
    }

    /// Returns true if the identity header has been parsed.
    pub fn has_identity(&self) -> bool {
        self.phase == Phase::Clips
    }

    /// Feeds bytes into the scanner, returning completed framing units in
    /// stream order.
    ///
    /// Errors are terminal for the connection: a stream whose header never
    /// terminates within the scan limit, or whose identity is not UTF-8,
    /// produces an error once and the scanner ignores everything afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<FrameEvent>> {
        if self.phase == Phase::Failed {
            return Ok(Vec::new());
        }

        self.total_in += data.len() as u64;

        // A sentinel may straddle the push boundary; rescan the last
        // len-1 bytes of the retained tail.
        let mut from = self
            .accumulator
            .len()
            .saturating_sub(defaults::SENTINEL.len() - 1);
        self.accumulator.extend_from_slice(data);

        let mut events = Vec::new();
        while let Some(idx) = find_sentinel(&self.accumulator, from) {
            // The header sentinel must complete within the scan limit even
            // when the whole header arrives in a single oversized push.
            if self.phase == Phase::Header && idx + defaults::SENTINEL.len() > self.header_limit {
                self.phase = Phase::Failed;
                return Err(CallguardError::MissingIdentity {
                    limit: self.header_limit,
                });
            }

            let consumed: Vec<u8> = self
                .accumulator
                .drain(..idx + defaults::SENTINEL.len())
                .collect();
            let unit = &consumed[..idx];

            match self.phase {
                Phase::Header => match std::str::from_utf8(unit) {
                    Ok(identity) => {
                        events.push(FrameEvent::Identity(identity.to_string()));
                        self.phase = Phase::Clips;
                    }
                    Err(_) => {
                        self.phase = Phase::Failed;
                        return Err(CallguardError::HeaderNotUtf8);
                    }
                },
                Phase::Clips => events.push(FrameEvent::Clip(unit.to_vec())),
                Phase::Failed => unreachable!("failed scanner returns early"),
            }
            from = 0;
        }

        if self.phase == Phase::Header && self.accumulator.len() > self.header_limit {
            self.phase = Phase::Failed;
            return Err(CallguardError::MissingIdentity {
                limit: self.header_limit,
            });
        }

        Ok(events)
    }

    /// Signals end of stream.
    ///
    /// Returns the number of unterminated bytes that were discarded (no
    /// partial clip is ever processed). Errors if the stream carried bytes
    /// but ended before the identity header was terminated. An empty stream
    /// finishes cleanly with nothing parsed.
    pub fn finish(&mut self) -> Result<usize> {
        let discarded = self.accumulator.len();
        self.accumulator.clear();

        match self.phase {
            Phase::Header if self.total_in > 0 => {
                self.phase = Phase::Failed;
                Err(CallguardError::MissingIdentity {
                    limit: self.header_limit,
                })
            }
            _ => Ok(discarded),
        }
    }
}

/// Finds the sentinel in `buf` starting no earlier than `from`.
fn find_sentinel(buf: &[u8], from: usize) -> Option<usize> {
    if buf.len() < from + defaults::SENTINEL.len() {
        return None;
    }
    buf[from..]
        .windows(defaults::SENTINEL.len())
        .position(|w| w == defaults::SENTINEL)
        .map(|i| i + from)
}
