//! Analysis service client.
//!
//! Each completed clip is sent, together with its connection identity, to an
//! external analysis endpoint. The wire contract is fixed: a JSON POST of
//! `{"uid": <identity>, "data": <base64 clip>}` answered by a single JSON
//! line `{"messageSending": bool, "riskLevel": string}`.
//!
//! Failures come back as typed errors rather than a fabricated "no risk"
//! verdict, so callers can tell "genuinely low risk" apart from "analysis
//! unavailable". The session layer maps any error to "send nothing".

use crate::error::{CallguardError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Outcome of analyzing one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Whether the service asked for a notification to be sent.
    pub should_notify: bool,
    /// Risk label assigned by the service, e.g. "1단계 의심".
    pub risk_level: String,
}

/// Trait for clip analysis.
///
/// This trait allows swapping implementations (real HTTP service vs mock).
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one clip for the given device identity.
    async fn analyze(&self, uid: &str, clip: &[u8]) -> Result<Verdict>;
}

#[derive(Serialize)]
struct AnalysisRequest<'a> {
    uid: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct AnalysisResponse {
    #[serde(rename = "messageSending")]
    message_sending: bool,
    #[serde(rename = "riskLevel")]
    risk_level: String,
}

/// HTTP client for the external analysis service.
///
/// One outbound request per clip, no retry. The request timeout is carried
/// by the shared `reqwest::Client`.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalyzer {
    /// Creates an analyzer that posts to `endpoint` with the given client.
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, uid: &str, clip: &[u8]) -> Result<Verdict> {
        let request = AnalysisRequest {
            uid,
            data: BASE64.encode(clip),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallguardError::Analysis {
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallguardError::Analysis {
                message: format!("service returned {status}"),
            });
        }

        let body = response.text().await.map_err(|e| CallguardError::Analysis {
            message: format!("failed to read response body: {e}"),
        })?;

        // The service answers with one JSON line; ignore any trailing output.
        let line = body.lines().next().unwrap_or("");
        let parsed: AnalysisResponse =
            serde_json::from_str(line).map_err(|e| CallguardError::AnalysisResponse {
                message: e.to_string(),
            })?;

        Ok(Verdict {
            should_notify: parsed.message_sending,
            risk_level: parsed.risk_level,
        })
    }
}

/// Mock analyzer for testing
#[derive(Clone)]
pub struct MockAnalyzer {
    verdict: Verdict,
    should_fail: bool,
    calls: std::sync::Arc<std::sync::Mutex<Vec<(String, Vec<u8>)>>>,
    event_log: Option<std::sync::Arc<std::sync::Mutex<Vec<String>>>>,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAnalyzer {
    /// Create a new mock analyzer with a benign default verdict
    pub fn new() -> Self {
        Self {
            verdict: Verdict {
                should_notify: false,
                risk_level: "정상".to_string(),
            },
            should_fail: false,
            calls: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
            event_log: None,
        }
    }

    /// Configure the mock to return a specific verdict
    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = verdict;
        self
    }

    /// Configure the mock to fail on analyze
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Record each call into a log shared with other mocks, for ordering
    /// assertions across the pipeline
    pub fn with_event_log(
        mut self,
        log: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    ) -> Self {
        self.event_log = Some(log);
        self
    }

    /// All `(uid, clip)` pairs analyzed so far, in call order
    pub fn calls(&self) -> Vec<(String, Vec<u8>)> {
        self.calls.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, uid: &str, clip: &[u8]) -> Result<Verdict> {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .push((uid.to_string(), clip.to_vec()));
        if let Some(log) = &self.event_log {
            log.lock().expect("mock lock poisoned").push("analyze".to_string());
        }

        if self.should_fail {
            Err(CallguardError::Analysis {
                message: "mock analysis failure".to_string(),
            })
        } else {
            Ok(self.verdict.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn mock_analyzer_returns_verdict_and_records_call() {
        let analyzer = MockAnalyzer::new().with_verdict(Verdict {
            should_notify: true,
            risk_level: "2단계 주의".to_string(),
        });

        let verdict = analyzer.analyze("user-1", b"audio").await.unwrap();
        assert!(verdict.should_notify);
        assert_eq!(verdict.risk_level, "2단계 주의");
        assert_eq!(
            analyzer.calls(),
            vec![("user-1".to_string(), b"audio".to_vec())]
        );
    }

    #[tokio::test]
    async fn mock_analyzer_failure() {
        let analyzer = MockAnalyzer::new().with_failure();
        let err = analyzer.analyze("user-1", b"audio").await.unwrap_err();
        assert!(matches!(err, CallguardError::Analysis { .. }));
    }

    /// Serve exactly one canned HTTP/1.1 response, then close.
    async fn one_shot_http_responder(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            // Drain headers, then the content-length body.
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let body_len = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                    let len = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    let have = buf.len() - (pos + 4);
                    break len.saturating_sub(have);
                }
            };
            let mut remaining = body_len;
            while remaining > 0 {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                remaining = remaining.saturating_sub(n);
            }

            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });

        format!("http://{addr}/wavAnalysis")
    }

    #[tokio::test]
    async fn http_analyzer_parses_verdict() {
        let endpoint = one_shot_http_responder(
            "HTTP/1.1 200 OK",
            r#"{"messageSending":true,"riskLevel":"3단계 경고"}"#,
        )
        .await;

        let analyzer = HttpAnalyzer::new(reqwest::Client::new(), endpoint);
        let verdict = analyzer.analyze("user-42", b"pcm-bytes").await.unwrap();
        assert!(verdict.should_notify);
        assert_eq!(verdict.risk_level, "3단계 경고");
    }

    #[tokio::test]
    async fn http_analyzer_unreachable_endpoint_is_typed_error() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let analyzer = HttpAnalyzer::new(
            reqwest::Client::new(),
            format!("http://127.0.0.1:{port}/wavAnalysis"),
        );
        let err = analyzer.analyze("user-42", b"pcm").await.unwrap_err();
        assert!(matches!(err, CallguardError::Analysis { .. }));
    }

    #[tokio::test]
    async fn http_analyzer_non_success_status_is_error() {
        let endpoint = one_shot_http_responder("HTTP/1.1 500 Internal Server Error", "{}").await;

        let analyzer = HttpAnalyzer::new(reqwest::Client::new(), endpoint);
        let err = analyzer.analyze("user-42", b"pcm").await.unwrap_err();
        assert!(matches!(err, CallguardError::Analysis { .. }));
    }

    #[tokio::test]
    async fn http_analyzer_malformed_body_is_error() {
        let endpoint = one_shot_http_responder("HTTP/1.1 200 OK", "not json").await;

        let analyzer = HttpAnalyzer::new(reqwest::Client::new(), endpoint);
        let err = analyzer.analyze("user-42", b"pcm").await.unwrap_err();
        assert!(matches!(err, CallguardError::AnalysisResponse { .. }));
    }

    #[test]
    fn request_body_encodes_clip_as_base64() {
        let request = AnalysisRequest {
            uid: "user-7",
            data: BASE64.encode(b"\x00\x01\x02audio"),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""uid":"user-7""#));
        assert!(json.contains(&BASE64.encode(b"\x00\x01\x02audio")));
    }

    #[test]
    fn response_parses_service_field_names() {
        let parsed: AnalysisResponse =
            serde_json::from_str(r#"{"messageSending":false,"riskLevel":"정상"}"#).unwrap();
        assert!(!parsed.message_sending);
        assert_eq!(parsed.risk_level, "정상");
    }
}
