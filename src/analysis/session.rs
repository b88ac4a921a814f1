//! One analysis attempt, from configuration check to terminal status.
//!
//! A session owns its accumulated text and progress state outright. It
//! talks to the outside world only through the injected collaborators in
//! [`SessionDeps`]: config lookup, image fetching, the streaming transport
//! and the status sink. Persistence and fan-out belong to the sink.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cancel::{CancelReason, CancelSignal};
use super::decoder::{StreamDecoder, StreamEventRecord};
use super::error::AnalysisError;
use super::extract;
use super::progress::{ProgressEstimator, DEFAULT_EMIT_INTERVAL, INGEST_START_PERCENT};
use super::registry::SessionGate;
use super::status::{AnalysisStatus, SessionId, Stage, StatusSink};
use super::types::{AnalysisRequest, AnalysisResult};
use crate::http_client::{ByteStream, ImageFetcher, Transport, TransportError};
use crate::provider::{adapter_for, ProviderAdapter, ProviderConfig};

/// Wall-clock budget of a session.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Supplies the active provider, if any.
pub trait ConfigSource: Send + Sync {
    fn provider_config(&self) -> Option<ProviderConfig>;
}

impl ConfigSource for Option<ProviderConfig> {
    fn provider_config(&self) -> Option<ProviderConfig> {
        self.clone()
    }
}

/// Tunables for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub timeout: Duration,
    /// Short pauses between sub-steps so a UI can show each one.
    pub pacing: bool,
    /// Minimum spacing of INGESTING updates.
    pub emit_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            pacing: true,
            emit_interval: DEFAULT_EMIT_INTERVAL,
        }
    }
}

/// Collaborators shared by every session a front end starts.
#[derive(Clone)]
pub struct SessionDeps {
    pub config: Arc<dyn ConfigSource>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn StatusSink>,
    pub options: SessionOptions,
}

/// Identity and control handles assigned to a session when it is created.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: SessionId,
    pub cancel: CancelSignal,
    /// Set when the session lives in a registry slot.
    pub gate: Option<SessionGate>,
}

impl SessionContext {
    /// A context outside any registry; every status is emitted.
    pub fn detached() -> Self {
        Self {
            id: SessionId::new(),
            cancel: CancelSignal::new(),
            gate: None,
        }
    }
}

pub struct AnalysisSession {
    ctx: SessionContext,
    source: String,
    deps: SessionDeps,
    last_progress: u8,
}

impl AnalysisSession {
    pub fn new(ctx: SessionContext, source: impl Into<String>, deps: SessionDeps) -> Self {
        Self {
            ctx,
            source: source.into(),
            deps,
            last_progress: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.ctx.id
    }

    /// Drive the session to a terminal status.
    ///
    /// The returned value mirrors the terminal status handed to the sink.
    pub async fn run(mut self) -> Result<AnalysisResult, AnalysisError> {
        info!("Session {} started for {}", self.ctx.id, short_source(&self.source));
        let timer = self.spawn_timer();

        let outcome = self.drive().await;
        timer.abort();

        // Once the signal has fired, its reason decides how the session ends.
        let outcome = match outcome {
            Err(e) if !e.is_cancellation() && self.ctx.cancel.is_cancelled() => {
                debug!("Session {}: {} after cancellation", self.ctx.id, e);
                Err(self.cancellation())
            }
            Ok(_) if self.ctx.cancel.is_cancelled() => Err(self.cancellation()),
            other => other,
        };

        match &outcome {
            Ok(result) => {
                info!("Session {} succeeded", self.ctx.id);
                let status = self
                    .status(Stage::Succeeded, 100, "Analysis complete", "")
                    .with_result(result.clone());
                self.emit(status).await;
            }
            Err(e) => self.emit_terminal(e).await,
        }
        outcome
    }

    async fn drive(&mut self) -> Result<AnalysisResult, AnalysisError> {
        self.advance(Stage::Initializing, 5, "Preparing analysis", "Checking configuration")
            .await;
        let provider = self.resolve_provider()?;
        let adapter = adapter_for(&provider);

        self.check_cancelled()?;
        self.advance(
            Stage::Downloading,
            15,
            "Downloading image",
            short_source(&self.source),
        )
        .await;
        let fetcher = self.deps.fetcher.clone();
        let image = self.until_cancelled(fetcher.fetch(&self.source)).await?;

        self.advance(
            Stage::Downloading,
            25,
            "Encoding image",
            format!("{}, {} KB", image.mime_type, image.bytes.len().div_ceil(1024)),
        )
        .await;
        let request = AnalysisRequest::new(image.bytes, image.mime_type, provider.clone());
        self.pace(300).await?;

        let provider_request = adapter.build_request(&request)?;
        drop(request);
        self.advance(
            Stage::Requesting,
            30,
            "Preparing request",
            format!("{} / {}", provider.kind.display_name(), provider.model_name),
        )
        .await;
        self.pace(200).await?;

        self.check_cancelled()?;
        self.advance(
            Stage::Requesting,
            INGEST_START_PERCENT,
            format!("Connecting to {}", provider.kind.display_name()),
            format!("Waiting for {}", provider.model_name),
        )
        .await;
        let transport = self.deps.transport.clone();
        let mut stream = self
            .until_cancelled(async {
                transport
                    .open(provider_request)
                    .await
                    .map_err(|e| open_error(adapter.as_ref(), e))
            })
            .await?;

        let text = self.ingest(adapter.as_ref(), stream.as_mut()).await?;
        drop(stream);

        self.check_cancelled()?;
        self.advance(Stage::Finalizing, 96, "Parsing result", "Structuring the analysis")
            .await;
        let result = extract::parse(&text).inspect_err(|e| {
            if let AnalysisError::ResultFormat { raw_preview, .. } = e {
                warn!("Session {}: {}; raw output: {}", self.ctx.id, e, raw_preview);
            }
        })?;

        self.advance(Stage::Finalizing, 97, "Organizing tags", "Matching style references")
            .await;
        self.pace(300).await?;
        self.advance(Stage::Finalizing, 98, "Almost done", "Preparing the report")
            .await;
        self.pace(200).await?;

        Ok(result)
    }

    fn resolve_provider(&self) -> Result<ProviderConfig, AnalysisError> {
        let provider = self.deps.config.provider_config().ok_or_else(|| {
            AnalysisError::Configuration(
                "No model is configured. Add an API key and select a model.".to_string(),
            )
        })?;
        if provider.credential.is_blank() {
            return Err(AnalysisError::Configuration(format!(
                "No API key configured for {}.",
                provider.kind.display_name()
            )));
        }
        debug!(
            "Session {} using {} model {}",
            self.ctx.id, provider.kind, provider.model_id
        );
        Ok(provider)
    }

    /// Read the response to the end, returning the accumulated text.
    async fn ingest(
        &mut self,
        adapter: &dyn ProviderAdapter,
        stream: &mut dyn ByteStream,
    ) -> Result<String, AnalysisError> {
        let mut decoder = StreamDecoder::new();
        let mut text = Accumulated::default();
        let mut estimator = ProgressEstimator::new(self.deps.options.emit_interval);
        let mut emitted_chars = 0;

        loop {
            if self.ctx.cancel.is_cancelled() {
                stream.abort();
                return Err(self.cancellation());
            }

            let next = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => None,
                chunk = stream.next_chunk() => Some(chunk),
            };
            let Some(next) = next else {
                stream.abort();
                return Err(self.cancellation());
            };

            match next {
                Some(Ok(bytes)) => text.absorb(adapter, decoder.feed(&bytes)),
                Some(Err(e)) => {
                    stream.abort();
                    warn!("Session {}: stream read failed: {}", self.ctx.id, e);
                    return Err(AnalysisError::Transport(e.to_string()));
                }
                None => {
                    debug!("Session {}: stream closed without [DONE]", self.ctx.id);
                    break;
                }
            }

            // Keep-alives and empty records add nothing worth reporting.
            if text.chars > emitted_chars && estimator.try_emit(Instant::now()) {
                emitted_chars = text.chars;
                let progress = estimator.on_delta(text.chars);
                let status = self
                    .status(Stage::Ingesting, progress, "Analyzing image", "Receiving model output")
                    .with_preview(extract::streaming_preview(&text.deltas));
                self.emit(status).await;
            }

            if decoder.saw_terminator() {
                break;
            }
        }

        text.absorb(adapter, decoder.finish());
        Ok(text.into_text(self.ctx.id))
    }

    /// Build a status, holding progress at its high-water mark.
    fn status(
        &mut self,
        stage: Stage,
        progress: u8,
        primary: impl Into<String>,
        detail: impl Into<String>,
    ) -> AnalysisStatus {
        let progress = progress.max(self.last_progress);
        self.last_progress = progress;
        AnalysisStatus::new(self.ctx.id, stage, progress, primary, detail)
    }

    async fn advance(
        &mut self,
        stage: Stage,
        progress: u8,
        primary: impl Into<String>,
        detail: impl Into<String>,
    ) {
        debug!("Session {} -> {} ({}%)", self.ctx.id, stage, progress);
        let status = self.status(stage, progress, primary, detail);
        self.emit(status).await;
    }

    async fn emit(&self, status: AnalysisStatus) {
        if let Some(gate) = &self.ctx.gate {
            if !gate.is_current() {
                debug!("Session {} no longer current, dropping {}", self.ctx.id, status.stage);
                return;
            }
        }
        self.deps.sink.on_status(status).await;
    }

    async fn emit_terminal(&self, error: &AnalysisError) {
        let stage = if error.ends_as_cancelled() {
            Stage::Cancelled
        } else {
            Stage::Failed
        };
        match error {
            AnalysisError::CancelledByUser | AnalysisError::SupersededBySession => {
                info!("Session {} cancelled: {}", self.ctx.id, error)
            }
            _ => warn!("Session {} failed: {}", self.ctx.id, error),
        }

        let descriptor = error.descriptor();
        let status = AnalysisStatus::new(
            self.ctx.id,
            stage,
            0,
            descriptor.message.clone(),
            descriptor.detail.clone(),
        )
        .with_error(descriptor);

        // A superseded session no longer owns the slot but still reports
        // its own end, exactly once.
        if matches!(error, AnalysisError::SupersededBySession) {
            self.deps.sink.on_status(status).await;
        } else {
            self.emit(status).await;
        }
    }

    fn cancellation(&self) -> AnalysisError {
        match self.ctx.cancel.reason() {
            Some(CancelReason::Timeout) => {
                AnalysisError::CancelledByTimeout(self.deps.options.timeout.as_secs())
            }
            Some(CancelReason::Superseded) => AnalysisError::SupersededBySession,
            Some(CancelReason::User) | None => AnalysisError::CancelledByUser,
        }
    }

    fn check_cancelled(&self) -> Result<(), AnalysisError> {
        if self.ctx.cancel.is_cancelled() {
            Err(self.cancellation())
        } else {
            Ok(())
        }
    }

    async fn until_cancelled<T>(
        &self,
        fut: impl Future<Output = Result<T, AnalysisError>>,
    ) -> Result<T, AnalysisError> {
        tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => Err(self.cancellation()),
            result = fut => result,
        }
    }

    async fn pace(&self, millis: u64) -> Result<(), AnalysisError> {
        if !self.deps.options.pacing {
            return Ok(());
        }
        self.until_cancelled(async {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(())
        })
        .await
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let cancel = self.ctx.cancel.clone();
        let timeout = self.deps.options.timeout;
        let id = self.ctx.id;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if cancel.cancel(CancelReason::Timeout) {
                        warn!("Session {} timed out after {}s", id, timeout.as_secs());
                    }
                }
            }
        })
    }
}

/// Text gathered from the stream.
#[derive(Default)]
struct Accumulated {
    deltas: String,
    chars: usize,
    /// Last complete `message.content`, used only if no delta ever arrived.
    fallback: Option<String>,
}

impl Accumulated {
    fn absorb(&mut self, adapter: &dyn ProviderAdapter, records: Vec<StreamEventRecord>) {
        for record in records {
            if let Some(delta) = adapter.extract_delta(&record) {
                self.chars += delta.chars().count();
                self.deltas.push_str(&delta);
            } else if let Some(content) = adapter.extract_fallback(&record) {
                self.fallback = Some(content);
            }
        }
    }

    fn into_text(self, id: SessionId) -> String {
        match self.fallback {
            Some(content) if self.deltas.is_empty() => {
                debug!("Session {}: no deltas, using complete message content", id);
                content
            }
            _ => self.deltas,
        }
    }
}

fn open_error(adapter: &dyn ProviderAdapter, error: TransportError) -> AnalysisError {
    let error = match error {
        TransportError::Status { reason, body, .. } => {
            AnalysisError::Provider(adapter.error_message(&reason, &body))
        }
        TransportError::Connection(msg) => AnalysisError::Provider(msg),
        TransportError::InvalidRequest(msg) => AnalysisError::Encoding(msg),
    };
    warn!("{} request failed: {}", adapter.kind().display_name(), error);
    error
}

/// Data URIs are huge; keep log lines and status text short.
fn short_source(source: &str) -> String {
    const MAX: usize = 80;
    if source.chars().count() <= MAX {
        source.to_string()
    } else {
        let head: String = source.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Notify;

    use super::*;
    use crate::analysis::error::ErrorKind;
    use crate::analysis::extract::PREVIEW_CHARS;
    use crate::analysis::progress::estimate_percent;
    use crate::http_client::FetchedImage;
    use crate::provider::{Credential, ProviderKind, ProviderRequest};

    struct StubFetcher(Result<FetchedImage, AnalysisError>);

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, _source: &str) -> Result<FetchedImage, AnalysisError> {
            self.0.clone()
        }
    }

    /// Yields its chunks, each after its delay, then either ends or parks
    /// until aborted.
    struct ScriptedStream {
        chunks: VecDeque<(Duration, Bytes)>,
        park: bool,
        parked: Arc<Notify>,
        aborted: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ByteStream for ScriptedStream {
        async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportError>> {
            if self.aborted.load(Ordering::SeqCst) {
                return None;
            }
            if let Some((delay, chunk)) = self.chunks.pop_front() {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                return Some(Ok(chunk));
            }
            if self.park {
                self.parked.notify_one();
                std::future::pending::<()>().await;
            }
            None
        }

        fn abort(&mut self) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedTransport {
        response: Mutex<Option<Result<Vec<(Duration, String)>, TransportError>>>,
        park: bool,
        parked: Arc<Notify>,
        aborted: Arc<AtomicBool>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedTransport {
        fn new(response: Result<Vec<String>, TransportError>, park: bool) -> Arc<Self> {
            let response =
                response.map(|chunks| chunks.into_iter().map(|c| (Duration::ZERO, c)).collect());
            Self::build(response, park)
        }

        fn build(
            response: Result<Vec<(Duration, String)>, TransportError>,
            park: bool,
        ) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                park,
                parked: Arc::new(Notify::new()),
                aborted: Arc::new(AtomicBool::new(false)),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn chunks(chunks: &[&str]) -> Arc<Self> {
            Self::new(Ok(chunks.iter().map(|c| c.to_string()).collect()), false)
        }

        /// Each chunk arrives `millis` after the previous one.
        fn paced(chunks: Vec<(u64, String)>) -> Arc<Self> {
            let chunks = chunks
                .into_iter()
                .map(|(millis, c)| (Duration::from_millis(millis), c))
                .collect();
            Self::build(Ok(chunks), false)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(
            &self,
            request: ProviderRequest,
        ) -> Result<Box<dyn ByteStream>, TransportError> {
            self.requests.lock().unwrap().push(request);
            let chunks = self.response.lock().unwrap().take().unwrap()?;
            Ok(Box::new(ScriptedStream {
                chunks: chunks
                    .into_iter()
                    .map(|(delay, c)| (delay, Bytes::from(c)))
                    .collect(),
                park: self.park,
                parked: self.parked.clone(),
                aborted: self.aborted.clone(),
            }))
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<AnalysisStatus>>);

    impl RecordingSink {
        fn statuses(&self) -> Vec<AnalysisStatus> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn on_status(&self, status: AnalysisStatus) {
            self.0.lock().unwrap().push(status);
        }
    }

    fn result_json() -> String {
        serde_json::json!({
            "determined_class": "PHOTOGRAPHY",
            "analysis_summary": "Low-key portrait lit from one side.",
            "tags": [{"en": "Chiaroscuro", "zh": "明暗对照法", "wiki": "Chiaroscuro"}],
            "style_masters": [{"name": "Rembrandt", "reason": "Single-source lighting"}],
            "pinterest_search_chips": [{"label": "Moody portrait", "query": "moody portrait lighting"}],
            "ai_drawing_prompt": "portrait, rim light, dark background"
        })
        .to_string()
    }

    fn gemini_chunk(text: &str) -> String {
        let payload = serde_json::json!({"candidates": [{"content": {"parts": [{"text": text}]}}]});
        format!("data: {}\n", payload)
    }

    fn provider(kind: ProviderKind) -> Option<ProviderConfig> {
        Some(ProviderConfig::new(kind, "test-model", Credential::new("key-123")))
    }

    fn png() -> FetchedImage {
        FetchedImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png".to_string(),
        }
    }

    fn deps(
        config: Option<ProviderConfig>,
        transport: Arc<ScriptedTransport>,
        sink: Arc<RecordingSink>,
    ) -> SessionDeps {
        SessionDeps {
            config: Arc::new(config),
            fetcher: Arc::new(StubFetcher(Ok(png()))),
            transport,
            sink,
            options: SessionOptions {
                pacing: false,
                ..SessionOptions::default()
            },
        }
    }

    fn stages(statuses: &[AnalysisStatus]) -> Vec<Stage> {
        statuses.iter().map(|s| s.stage).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_gemini_stream_succeeds() {
        let text = result_json();
        let (head, tail) = text.split_at(40);
        let (first, second) = (gemini_chunk(head), gemini_chunk(tail));
        let transport = ScriptedTransport::chunks(&[
            ": keep-alive\n",
            first.as_str(),
            second.as_str(),
            "data: [DONE]\n",
        ]);
        let sink = Arc::new(RecordingSink::default());
        let mut deps = deps(provider(ProviderKind::Gemini), transport.clone(), sink.clone());
        deps.options.pacing = true;

        let result = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await
            .unwrap();
        assert_eq!(result.style_masters[0].name, "Rembrandt");

        let statuses = sink.statuses();
        assert_eq!(
            stages(&statuses),
            vec![
                Stage::Initializing,
                Stage::Downloading,
                Stage::Downloading,
                Stage::Requesting,
                Stage::Requesting,
                Stage::Finalizing,
                Stage::Finalizing,
                Stage::Finalizing,
                Stage::Succeeded,
            ]
        );
        let progress: Vec<u8> = statuses.iter().map(|s| s.progress).collect();
        assert_eq!(progress, vec![5, 15, 25, 30, 35, 96, 97, 98, 100]);
        assert_eq!(statuses.last().unwrap().result.as_ref(), Some(&result));

        let requests = transport.requests.lock().unwrap();
        assert!(requests[0].url.contains("test-model:generateContent?alt=sse"));
    }

    #[tokio::test]
    async fn test_incomplete_result_fails_with_format_error() {
        let transport = ScriptedTransport::chunks(&[
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"{\\\"tags\\\":\"}]}}]}\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"[]}\"}]}}]}\n",
            "data: [DONE]\n",
        ]);
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(provider(ProviderKind::Gemini), transport, sink.clone());

        let err = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await
            .unwrap_err();
        match &err {
            AnalysisError::ResultFormat { raw_preview, .. } => {
                assert_eq!(raw_preview, r#"{"tags":[]}"#)
            }
            other => panic!("unexpected {:?}", other),
        }

        let last = sink.statuses().pop().unwrap();
        assert_eq!(last.stage, Stage::Failed);
        assert_eq!(last.progress, 0);
        let error = last.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ResultFormat);
        assert_eq!(error.diagnostic.as_deref(), Some(r#"{"tags":[]}"#));
    }

    #[tokio::test]
    async fn test_reading_stops_at_done() {
        let result = gemini_chunk(&result_json());
        let trailing = gemini_chunk("trailing noise");
        let transport = ScriptedTransport::chunks(&[
            result.as_str(),
            "data: [DONE]\n",
            trailing.as_str(),
        ]);
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(provider(ProviderKind::Gemini), transport.clone(), sink);

        let parsed = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await
            .unwrap();
        assert_eq!(parsed.determined_class, "PHOTOGRAPHY");
        assert!(!transport.aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_volcengine_falls_back_to_message_content() {
        let payload = serde_json::json!({"choices": [{"message": {"content": result_json()}}]});
        let record = format!("data: {}\n", payload);
        let transport = ScriptedTransport::chunks(&[record.as_str(), "data: [DONE]\n"]);
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(provider(ProviderKind::Volcengine), transport.clone(), sink.clone());

        let result = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await
            .unwrap();
        assert_eq!(result.determined_class, "PHOTOGRAPHY");
        assert_eq!(sink.statuses().last().unwrap().stage, Stage::Succeeded);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].header("authorization"), Some("Bearer key-123"));
    }

    #[tokio::test]
    async fn test_deltas_win_over_fallback() {
        let text = result_json();
        let delta = serde_json::json!({"choices": [{"delta": {"content": text}}]});
        let stale = serde_json::json!({"choices": [{"message": {"content": "{}"}}]});
        let records = format!("data: {}\ndata: {}\n", stale, delta);
        // Unterminated sentinel: flushed by finish() and dropped.
        let transport = ScriptedTransport::chunks(&[records.as_str(), "data: [DONE]"]);
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(provider(ProviderKind::Volcengine), transport, sink);

        let result = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_config_fails_before_any_io() {
        let transport = ScriptedTransport::chunks(&[]);
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(None, transport.clone(), sink.clone());

        let err = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(stages(&sink.statuses()), vec![Stage::Initializing, Stage::Failed]);
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_credential_is_configuration_error() {
        let config = Some(ProviderConfig::new(
            ProviderKind::Gemini,
            "m",
            Credential::new("  "),
        ));
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(config, ScriptedTransport::chunks(&[]), sink);

        let err = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_fetch_failure() {
        let transport = ScriptedTransport::chunks(&[]);
        let sink = Arc::new(RecordingSink::default());
        let mut deps = deps(provider(ProviderKind::Gemini), transport.clone(), sink.clone());
        deps.fetcher = Arc::new(StubFetcher(Err(AnalysisError::Fetch("HTTP 404".to_string()))));

        let err = AnalysisSession::new(SessionContext::detached(), "https://x/y.png", deps)
            .run()
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::Fetch("HTTP 404".to_string()));

        let last = sink.statuses().pop().unwrap();
        assert_eq!(last.stage, Stage::Failed);
        assert!(last.detail_text.contains("HTTP 404"));
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_error_surfaces_provider_message() {
        let transport = ScriptedTransport::new(
            Err(TransportError::Status {
                status: 400,
                reason: "Bad Request".to_string(),
                body: r#"{"error":{"message":"API key not valid."}}"#.to_string(),
            }),
            false,
        );
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(provider(ProviderKind::Gemini), transport, sink.clone());

        let err = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::Provider("API key not valid.".to_string()));
        assert_eq!(
            sink.statuses().last().unwrap().error.as_ref().unwrap().kind,
            ErrorKind::Provider
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_times_out_and_aborts() {
        let transport = ScriptedTransport::new(Ok(Vec::new()), true);
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(provider(ProviderKind::Gemini), transport.clone(), sink.clone());

        let started = Instant::now();
        let err = AnalysisSession::new(SessionContext::detached(), "shot.png", deps)
            .run()
            .await
            .unwrap_err();

        assert_eq!(err, AnalysisError::CancelledByTimeout(90));
        assert!(started.elapsed() >= DEFAULT_TIMEOUT);
        assert!(transport.aborted.load(Ordering::SeqCst));

        let last = sink.statuses().pop().unwrap();
        assert_eq!(last.stage, Stage::Failed);
        assert_eq!(last.error.unwrap().kind, ErrorKind::CancelledByTimeout);
    }

    #[tokio::test]
    async fn test_user_cancel_mid_ingest_emits_one_cancelled_status() {
        let partial = gemini_chunk("{\"determined_class\":");
        let transport = ScriptedTransport::new(Ok(vec![partial]), true);
        let sink = Arc::new(RecordingSink::default());
        let deps = deps(provider(ProviderKind::Gemini), transport.clone(), sink.clone());

        let ctx = SessionContext::detached();
        let cancel = ctx.cancel.clone();
        let task = tokio::spawn(AnalysisSession::new(ctx, "shot.png", deps).run());

        transport.parked.notified().await;
        assert!(cancel.cancel(CancelReason::User));
        let err = task.await.unwrap().unwrap_err();

        assert_eq!(err, AnalysisError::CancelledByUser);
        assert!(transport.aborted.load(Ordering::SeqCst));

        let statuses = sink.statuses();
        let cancelled: Vec<_> = statuses
            .iter()
            .filter(|s| s.stage == Stage::Cancelled)
            .collect();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(statuses.last().unwrap().stage, Stage::Cancelled);
        assert!(!statuses.iter().any(|s| s.stage == Stage::Finalizing));
    }

    /// Records the virtual time of every status.
    #[derive(Default)]
    struct TimedSink(Mutex<Vec<(Instant, AnalysisStatus)>>);

    #[async_trait]
    impl StatusSink for TimedSink {
        async fn on_status(&self, status: AnalysisStatus) {
            self.0.lock().unwrap().push((Instant::now(), status));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_emits_throttled_progress() {
        let result = serde_json::json!({
            "determined_class": "PHOTOGRAPHY",
            "analysis_summary": "Soft window light across a quiet interior. ".repeat(40),
            "tags": [{"en": "Window light", "zh": "Window light", "wiki": "Window_light"}],
            "style_masters": [{"name": "Vilhelm Hammershoi", "reason": "Still interiors"}],
            "pinterest_search_chips": [{"label": "Quiet rooms", "query": "quiet interior photography"}],
            "ai_drawing_prompt": "empty room, soft window light"
        });
        let text = format!(
            "```json\n{}\n```",
            serde_json::to_string_pretty(&result).unwrap()
        );
        let bytes = text.as_bytes();
        let parts: Vec<&str> = bytes
            .chunks(bytes.len() / 5 + 1)
            .map(|part| std::str::from_utf8(part).unwrap())
            .collect();
        assert_eq!(parts.len(), 5);

        // The first chunk lands inside the throttle window and the
        // keep-alive adds no text, so neither is reported on its own.
        let mut script = vec![
            (50, gemini_chunk(parts[0])),
            (100, gemini_chunk(parts[1])),
            (150, ": keep-alive\n".to_string()),
        ];
        script.extend(parts[2..].iter().map(|part| (150, gemini_chunk(part))));
        script.push((0, "data: [DONE]\n".to_string()));

        let transport = ScriptedTransport::paced(script);
        let sink = Arc::new(TimedSink::default());
        let deps = SessionDeps {
            config: Arc::new(provider(ProviderKind::Gemini)),
            fetcher: Arc::new(StubFetcher(Ok(png()))),
            transport,
            sink: sink.clone(),
            options: SessionOptions {
                pacing: false,
                ..SessionOptions::default()
            },
        };

        let parsed = AnalysisSession::new(SessionContext::detached(), "room.png", deps)
            .run()
            .await
            .unwrap();
        assert_eq!(parsed.style_masters[0].name, "Vilhelm Hammershoi");

        let timeline = sink.0.lock().unwrap().clone();
        let connected_at = timeline
            .iter()
            .find(|(_, s)| s.stage == Stage::Requesting && s.progress == INGEST_START_PERCENT)
            .map(|(at, _)| *at)
            .unwrap();
        let ingesting: Vec<_> = timeline
            .iter()
            .filter(|(_, s)| s.stage == Stage::Ingesting)
            .collect();
        assert_eq!(ingesting.len(), 4);

        let offsets: Vec<Duration> = ingesting.iter().map(|(at, _)| *at - connected_at).collect();
        assert_eq!(
            offsets,
            [150, 450, 600, 750].map(Duration::from_millis).to_vec()
        );

        let (_, first) = ingesting[0];
        let first_chars = parts[0].len() + parts[1].len();
        assert_eq!(first.progress, estimate_percent(first_chars));

        let mut received = first_chars;
        for (i, (_, status)) in ingesting.iter().enumerate().skip(1) {
            received += parts[i + 1].len();
            assert_eq!(status.progress, estimate_percent(received));
        }
        assert!(ingesting
            .windows(2)
            .all(|pair| pair[0].1.progress <= pair[1].1.progress));

        for (_, status) in &ingesting {
            let preview = &status.streaming_preview;
            assert!(!preview.is_empty());
            assert!(preview.chars().count() <= PREVIEW_CHARS);
            assert!(!preview.contains('\n'));
            assert!(!preview.contains("```"));
        }

        let progress: Vec<u8> = timeline.iter().map(|(_, s)| s.progress).collect();
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(timeline.last().unwrap().1.stage, Stage::Succeeded);
    }

    #[test]
    fn test_short_source() {
        assert_eq!(short_source("a.png"), "a.png");
        let long = format!("data:image/png;base64,{}", "A".repeat(500));
        assert_eq!(short_source(&long).chars().count(), 83);
    }
}
