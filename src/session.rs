//! Per-connection processing pipeline.
//!
//! Each accepted connection gets one session that owns the socket for its
//! whole lifetime. The session reads chunks, feeds the frame scanner, and
//! runs the full analyze → notify cycle inline for each completed clip. The
//! next chunk is not read until the previous clip's cycle has finished, so
//! at most one clip per connection is ever in flight; a slow analysis call
//! stalls only its own connection.
//!
//! Failures are contained at the smallest scope: a failed clip never aborts
//! the connection, and a failed connection never reaches the listener. The
//! originating device is never signaled about failures.

use crate::analysis::Analyzer;
use crate::defaults;
use crate::framing::{FrameEvent, FrameScanner};
use crate::push::{Notifier, PushMessage, compose_body};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// Shared collaborators handed to every session.
pub struct SessionContext {
    pub analyzer: Arc<dyn Analyzer>,
    pub notifier: Arc<dyn Notifier>,
    /// Fixed notification title from config.
    pub push_title: String,
}

/// Drives one connection from first byte to stream end.
///
/// The stream is dropped (and the socket closed) when this returns, whether
/// the session ended normally, with a malformed header, or on a read error.
pub async fn run_session<S>(mut stream: S, peer: String, ctx: Arc<SessionContext>)
where
    S: AsyncRead + Unpin,
{
    let mut scanner = FrameScanner::new();
    let mut identity: Option<String> = None;
    let mut chunk = vec![0u8; defaults::READ_CHUNK_SIZE];

    loop {
        let read = match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(peer = %peer, "read failed: {e}");
                break;
            }
        };

        let events = match scanner.push(&chunk[..read]) {
            Ok(events) => events,
            Err(e) => {
                warn!(peer = %peer, "malformed stream, dropping connection: {e}");
                return;
            }
        };

        for event in events {
            match event {
                FrameEvent::Identity(uid) => {
                    info!(peer = %peer, uid = %uid, "identity received");
                    identity = Some(uid);
                }
                FrameEvent::Clip(clip) => {
                    // The scanner only emits clips after the identity event.
                    if let Some(uid) = identity.as_deref() {
                        process_clip(&ctx, uid, &clip).await;
                    }
                }
            }
        }
    }

    match scanner.finish() {
        Ok(0) => {}
        Ok(discarded) => {
            debug!(peer = %peer, discarded, "unterminated bytes dropped at stream end");
        }
        Err(e) => warn!(peer = %peer, "session ended without identity: {e}"),
    }
}

/// Runs one clip through analysis and conditional notification.
async fn process_clip(ctx: &SessionContext, uid: &str, clip: &[u8]) {
    info!(uid, bytes = clip.len(), "clip received");

    let verdict = match ctx.analyzer.analyze(uid, clip).await {
        Ok(verdict) => verdict,
        Err(e) => {
            // Analysis unavailable: the device hears silence, not an error.
            warn!(uid, "analysis failed, no notification: {e}");
            return;
        }
    };

    if !verdict.should_notify {
        debug!(uid, risk = %verdict.risk_level, "verdict did not request notification");
        return;
    }

    info!(uid, risk = %verdict.risk_level, "verdict flagged, publishing notification");
    let message = PushMessage {
        title: ctx.push_title.clone(),
        body: compose_body(&verdict.risk_level),
    };
    if let Err(e) = ctx.notifier.publish(uid, &message).await {
        warn!(uid, "publish failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{MockAnalyzer, Verdict};
    use crate::push::MockNotifier;
    use tokio::io::AsyncWriteExt;

    fn ctx(analyzer: MockAnalyzer, notifier: MockNotifier) -> Arc<SessionContext> {
        Arc::new(SessionContext {
            analyzer: Arc::new(analyzer),
            notifier: Arc::new(notifier),
            push_title: defaults::PUSH_TITLE.to_string(),
        })
    }

    async fn run_with_stream(data: &[u8], ctx: Arc<SessionContext>) {
        let (mut tx, rx) = tokio::io::duplex(64 * 1024);
        tx.write_all(data).await.unwrap();
        tx.shutdown().await.unwrap();
        run_session(rx, "test-peer".to_string(), ctx).await;
    }

    #[tokio::test]
    async fn flagged_clip_publishes_to_identity_topic() {
        let analyzer = MockAnalyzer::new().with_verdict(Verdict {
            should_notify: true,
            risk_level: "3단계 경고".to_string(),
        });
        let notifier = MockNotifier::new();
        let ctx = ctx(analyzer.clone(), notifier.clone());

        run_with_stream(b"user-42EOFsome-audioEOF", ctx).await;

        assert_eq!(analyzer.calls().len(), 1);
        let published = notifier.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "user-42");
        assert_eq!(published[0].1.title, defaults::PUSH_TITLE);
        assert!(published[0].1.body.ends_with(defaults::WARNING_BODY));
    }

    #[tokio::test]
    async fn unflagged_verdict_publishes_nothing() {
        let analyzer = MockAnalyzer::new().with_verdict(Verdict {
            should_notify: false,
            risk_level: "정상".to_string(),
        });
        let notifier = MockNotifier::new();
        let ctx = ctx(analyzer.clone(), notifier.clone());

        run_with_stream(b"uEOFaudioEOF", ctx).await;

        assert_eq!(analyzer.calls().len(), 1);
        assert!(notifier.published().is_empty());
    }

    #[tokio::test]
    async fn analysis_failure_is_absorbed_and_session_continues() {
        let analyzer = MockAnalyzer::new().with_failure();
        let notifier = MockNotifier::new();
        let ctx = ctx(analyzer.clone(), notifier.clone());

        // Two clips; the first failure must not stop the second analysis.
        run_with_stream(b"uEOFoneEOFtwoEOF", ctx).await;

        assert_eq!(analyzer.calls().len(), 2);
        assert!(notifier.published().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_does_not_stop_later_clips() {
        let analyzer = MockAnalyzer::new().with_verdict(Verdict {
            should_notify: true,
            risk_level: "2단계 주의".to_string(),
        });
        let notifier = MockNotifier::new().with_failure();
        let ctx = ctx(analyzer.clone(), notifier.clone());

        run_with_stream(b"uEOFoneEOFtwoEOF", ctx).await;

        assert_eq!(analyzer.calls().len(), 2);
        assert_eq!(notifier.published().len(), 2);
    }

    #[tokio::test]
    async fn headerless_stream_processes_nothing() {
        let analyzer = MockAnalyzer::new();
        let notifier = MockNotifier::new();
        let ctx = ctx(analyzer.clone(), notifier.clone());

        run_with_stream(b"no sentinel in here at all", ctx).await;

        assert!(analyzer.calls().is_empty());
        assert!(notifier.published().is_empty());
    }

    #[tokio::test]
    async fn empty_stream_processes_nothing() {
        let analyzer = MockAnalyzer::new();
        let notifier = MockNotifier::new();
        let ctx = ctx(analyzer.clone(), notifier.clone());

        run_with_stream(b"", ctx).await;

        assert!(analyzer.calls().is_empty());
    }

    #[tokio::test]
    async fn unterminated_tail_is_never_analyzed() {
        let analyzer = MockAnalyzer::new();
        let notifier = MockNotifier::new();
        let ctx = ctx(analyzer.clone(), notifier.clone());

        run_with_stream(b"uEOFcompleteEOFhalf-a-clip", ctx).await;

        let calls = analyzer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, b"complete".to_vec());
    }

    #[tokio::test]
    async fn clips_are_analyzed_in_stream_order_with_identity() {
        let analyzer = MockAnalyzer::new();
        let notifier = MockNotifier::new();
        let ctx = ctx(analyzer.clone(), notifier.clone());

        run_with_stream(b"device-7EOFfirstEOFsecondEOFthirdEOF", ctx).await;

        let calls = analyzer.calls();
        assert_eq!(calls.len(), 3);
        for (uid, _) in &calls {
            assert_eq!(uid, "device-7");
        }
        assert_eq!(calls[0].1, b"first".to_vec());
        assert_eq!(calls[1].1, b"second".to_vec());
        assert_eq!(calls[2].1, b"third".to_vec());
    }

    #[tokio::test]
    async fn analyze_and_publish_strictly_alternate() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let analyzer = MockAnalyzer::new()
            .with_verdict(Verdict {
                should_notify: true,
                risk_level: "3단계 경고".to_string(),
            })
            .with_event_log(log.clone());
        let notifier = MockNotifier::new().with_event_log(log.clone());
        let ctx = ctx(analyzer, notifier);

        run_with_stream(b"uEOFoneEOFtwoEOF", ctx).await;

        // One clip is fully processed before the next is touched.
        assert_eq!(
            *log.lock().unwrap(),
            vec!["analyze", "publish", "analyze", "publish"]
        );
    }
}
