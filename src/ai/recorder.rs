//! Session recording and replay.
//!
//! [`RecordingProvider`] wraps any provider and appends one newline-delimited
//! JSON record per LLM exchange. [`ReplayProvider`] serves a recorded file
//! back in order, so a whole session can be re-driven without network access.
//! In strict mode the replay flags drift between the recorded request and
//! the live one: message-role sequences and tool names must match.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::provider::{LlmProvider, Result};
use crate::ai::types::{CompletionRequest, CompletionResponse};

/// One recorded LLM exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRecord {
    pub timestamp: DateTime<Utc>,
    pub request: CompletionRequest,
    pub response: CompletionResponse,
    pub latency_ms: u64,
}

// ─── Recorder ──────────────────────────────────────────────────────────────

/// Appends [`ExchangeRecord`]s to an NDJSON file.
pub struct SessionRecorder {
    file: Mutex<std::fs::File>,
}

impl SessionRecorder {
    /// Open (or create) the recording file in append mode.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one exchange. Write failures are logged, never propagated; a
    /// broken recording must not take the session down.
    pub fn record(&self, request: &CompletionRequest, response: &CompletionResponse, latency_ms: u64) {
        let record = ExchangeRecord {
            timestamp: Utc::now(),
            request: request.clone(),
            response: response.clone(),
            latency_ms,
        };
        let line = match serde_json::to_string(&record) {
            Ok(l) => l,
            Err(e) => {
                log::warn!("failed to serialise exchange record: {e}");
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{line}") {
            log::warn!("failed to write exchange record: {e}");
        }
    }
}

/// Provider wrapper that records every exchange.
pub struct RecordingProvider {
    inner: Arc<dyn LlmProvider>,
    recorder: Arc<SessionRecorder>,
}

impl RecordingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, recorder: Arc<SessionRecorder>) -> Self {
        Self { inner, recorder }
    }
}

#[async_trait]
impl LlmProvider for RecordingProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let started = Instant::now();
        let response = self.inner.complete(request.clone()).await?;
        let latency_ms = started.elapsed().as_millis() as u64;
        self.recorder.record(&request, &response, latency_ms);
        Ok(response)
    }

    fn context_window(&self) -> usize {
        self.inner.context_window()
    }

    fn supports_tools(&self) -> bool {
        self.inner.supports_tools()
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

// ─── Replay ────────────────────────────────────────────────────────────────

/// Serves a recorded session back, one exchange per `complete` call.
pub struct ReplayProvider {
    records: Mutex<VecDeque<ExchangeRecord>>,
    strict: bool,
    context_window: usize,
}

impl ReplayProvider {
    /// Load a recording file. Blank lines are skipped; a malformed line is
    /// an error (the file is machine-written, so corruption means the
    /// recording is unusable).
    pub fn load(path: &Path, strict: bool) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut records = VecDeque::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: ExchangeRecord = serde_json::from_str(line).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("bad record on line {}: {e}", idx + 1),
                )
            })?;
            records.push_back(record);
        }
        Ok(Self {
            records: Mutex::new(records),
            strict,
            context_window: 128_000,
        })
    }

    /// Number of exchanges not yet consumed.
    pub fn remaining(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Compare the live request against the recorded one. Returns the list
    /// of mismatch descriptions (empty when the requests line up).
    fn mismatches(recorded: &CompletionRequest, live: &CompletionRequest) -> Vec<String> {
        let mut out = Vec::new();

        let recorded_roles: Vec<_> = recorded.messages.iter().map(|m| m.role).collect();
        let live_roles: Vec<_> = live.messages.iter().map(|m| m.role).collect();
        if recorded_roles != live_roles {
            out.push(format!(
                "message roles diverged: recorded {recorded_roles:?}, live {live_roles:?}"
            ));
        }

        let recorded_tools: Vec<_> = recorded.tools.iter().map(|t| t.function.name.as_str()).collect();
        let live_tools: Vec<_> = live.tools.iter().map(|t| t.function.name.as_str()).collect();
        if recorded_tools != live_tools {
            out.push(format!(
                "tool names diverged: recorded {recorded_tools:?}, live {live_tools:?}"
            ));
        }

        out
    }
}

#[async_trait]
impl LlmProvider for ReplayProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let record = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| "replay exhausted: no more recorded exchanges".to_string())?;

        let mismatches = Self::mismatches(&record.request, &request);
        if !mismatches.is_empty() {
            if self.strict {
                return Err(format!("replay mismatch: {}", mismatches.join("; ")));
            }
            for m in &mismatches {
                log::warn!("replay drift: {m}");
            }
        }

        Ok(record.response)
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::Message;

    fn request(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest::new("test-model", messages)
    }

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
            let last = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(CompletionResponse::text(format!("echo: {last}")))
        }
        fn context_window(&self) -> usize {
            4096
        }
        fn supports_tools(&self) -> bool {
            false
        }
        fn provider_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn record_then_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ndjson");

        let recorder = Arc::new(SessionRecorder::open(&path).unwrap());
        let recording = RecordingProvider::new(Arc::new(EchoProvider), recorder);

        let r1 = recording
            .complete(request(vec![Message::user("one")]))
            .await
            .unwrap();
        let r2 = recording
            .complete(request(vec![Message::user("one"), Message::assistant("echo: one"), Message::user("two")]))
            .await
            .unwrap();

        let replay = ReplayProvider::load(&path, true).unwrap();
        assert_eq!(replay.remaining(), 2);

        let p1 = replay
            .complete(request(vec![Message::user("one")]))
            .await
            .unwrap();
        assert_eq!(p1.content, r1.content);

        let p2 = replay
            .complete(request(vec![Message::user("one"), Message::assistant("echo: one"), Message::user("two")]))
            .await
            .unwrap();
        assert_eq!(p2.content, r2.content);
    }

    #[tokio::test]
    async fn strict_replay_flags_role_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ndjson");

        let recorder = Arc::new(SessionRecorder::open(&path).unwrap());
        let recording = RecordingProvider::new(Arc::new(EchoProvider), recorder);
        recording
            .complete(request(vec![Message::user("hello")]))
            .await
            .unwrap();

        let replay = ReplayProvider::load(&path, true).unwrap();
        let err = replay
            .complete(request(vec![Message::system("sys"), Message::user("hello")]))
            .await
            .unwrap_err();
        assert!(err.contains("replay mismatch"));
    }

    #[tokio::test]
    async fn lenient_replay_tolerates_drift() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ndjson");

        let recorder = Arc::new(SessionRecorder::open(&path).unwrap());
        let recording = RecordingProvider::new(Arc::new(EchoProvider), recorder);
        recording
            .complete(request(vec![Message::user("hello")]))
            .await
            .unwrap();

        let replay = ReplayProvider::load(&path, false).unwrap();
        let resp = replay
            .complete(request(vec![Message::system("sys"), Message::user("hello")]))
            .await
            .unwrap();
        assert_eq!(resp.content, "echo: hello");
    }

    #[tokio::test]
    async fn replay_exhaustion_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ndjson");
        std::fs::write(&path, "").unwrap();

        let replay = ReplayProvider::load(&path, false).unwrap();
        let err = replay.complete(request(vec![])).await.unwrap_err();
        assert!(err.contains("exhausted"));
    }
}
