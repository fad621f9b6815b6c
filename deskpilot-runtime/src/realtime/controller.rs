//! Streaming session controller.
//!
//! Lifecycle: `Idle -> Connecting -> Streaming -> Closing -> Closed`, with any
//! live state able to fall into `Failed(reason)` on a transport error. Only
//! [`StreamController::reset`] leaves `Closed`/`Failed`.
//!
//! While streaming, four activities run concurrently: the capture callback
//! (owned by the [`AudioSource`]), the writer task (capture queue and control
//! events to the transport), the reader task (transport to transcript,
//! playback and tool dispatch) and the player task (in-order playback).

use super::protocol::{decode_audio, ClientEvent, OutputItem, ServerEvent};
use super::transport::{Connector, TransportSink, TransportStream};
use crate::audio::{
    capture_channel, AudioSink, AudioSource, CaptureQueue, MicGate, StatsSnapshot, StreamStats,
};
use crate::error::{StreamError, TransportError};
use crate::metrics;
use chrono::Local;
use deskpilot_core::prompt::augment_user_text;
use deskpilot_core::{AudioFrame, Role, SessionState, StreamState, ToolCallRequest, TranscriptEntry};
use deskpilot_tools::Dispatcher;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Capture queue capacity in frames.
    pub queue_capacity: usize,
    pub connect_timeout: Duration,
    /// Upper bound on the close handshake during `stop`.
    pub close_timeout: Duration,
    /// Delay between the end of assistant audio and reopening the microphone.
    pub unmute_delay: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
            unmute_delay: Duration::from_millis(500),
        }
    }
}

/// Things a front-end may want to show while a stream is live.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice {
    State(StreamState),
    AssistantText(String),
    ToolResult {
        operation: String,
        ok: bool,
        message: String,
    },
    ServerError(String),
}

struct StateCell {
    state: Mutex<StreamState>,
    notices: broadcast::Sender<StreamNotice>,
}

impl StateCell {
    fn get(&self) -> StreamState {
        self.state.lock().clone()
    }

    fn set(&self, next: StreamState) {
        let mut state = self.state.lock();
        info!("Stream state: {} -> {}", *state, next);
        *state = next.clone();
        drop(state);
        let _ = self.notices.send(StreamNotice::State(next));
    }

    /// `Idle -> Connecting` as one step, so concurrent starts cannot both win.
    fn begin(&self) -> Result<(), StreamError> {
        let mut state = self.state.lock();
        if *state != StreamState::Idle {
            return Err(StreamError::AlreadyActive);
        }
        info!("Stream state: {} -> {}", *state, StreamState::Connecting);
        *state = StreamState::Connecting;
        drop(state);
        let _ = self.notices.send(StreamNotice::State(StreamState::Connecting));
        Ok(())
    }

    /// Set `to` only if the current state is still `from`.
    fn promote(&self, from: StreamState, to: StreamState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            debug!("Stream is {}, not promoting to {}", *state, to);
            return false;
        }
        info!("Stream state: {} -> {}", *state, to);
        *state = to.clone();
        drop(state);
        let _ = self.notices.send(StreamNotice::State(to));
        true
    }

    /// Move a live stream to `Failed`. Returns false when the stream was not
    /// live (already stopping, stopped or failed).
    fn fail(&self, reason: &str) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, StreamState::Connecting | StreamState::Streaming) {
            return false;
        }
        let next = StreamState::Failed(reason.to_string());
        warn!("Stream state: {} -> {}", *state, next);
        *state = next.clone();
        drop(state);
        let _ = self.notices.send(StreamNotice::State(next));
        true
    }
}

/// State shared by the controller and its background tasks.
struct Shared {
    state: StateCell,
    session: Arc<SessionState>,
    dispatcher: Arc<Dispatcher>,
    source: Mutex<Box<dyn AudioSource>>,
    sink: Mutex<Box<dyn AudioSink>>,
    gate: Arc<MicGate>,
    stats: Arc<StreamStats>,
    options: ControllerOptions,
}

impl Shared {
    fn notify(&self, notice: StreamNotice) {
        let _ = self.state.notices.send(notice);
    }

    fn on_transport_failure(&self, reason: &str, cancel: &CancellationToken) {
        if self.state.fail(reason) {
            error!("Realtime stream failed: {}", reason);
            metrics::increment_stream_failures();
            cancel.cancel();
            self.source.lock().stop();
        }
    }
}

struct LiveStream {
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    player: JoinHandle<()>,
    started: Instant,
}

pub struct StreamController {
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    live: tokio::sync::Mutex<Option<LiveStream>>,
    /// Cancels an in-flight connect; set only while `start` is connecting.
    connecting: Mutex<Option<CancellationToken>>,
}

/// Clears the pending-connect token when `start` returns.
struct PendingConnect<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

impl StreamController {
    pub fn new(
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        session: Arc<SessionState>,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        Self::with_options(connector, dispatcher, session, source, sink, ControllerOptions::default())
    }

    pub fn with_options(
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        session: Arc<SessionState>,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
        options: ControllerOptions,
    ) -> Self {
        let (notices, _) = broadcast::channel(256);
        Self {
            connector,
            shared: Arc::new(Shared {
                state: StateCell {
                    state: Mutex::new(StreamState::Idle),
                    notices,
                },
                session,
                dispatcher,
                source: Mutex::new(source),
                sink: Mutex::new(sink),
                gate: MicGate::new(),
                stats: Arc::new(StreamStats::default()),
                options,
            }),
            live: tokio::sync::Mutex::new(None),
            connecting: Mutex::new(None),
        }
    }

    pub fn state(&self) -> StreamState {
        self.shared.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn is_mic_muted(&self) -> bool {
        self.shared.gate.is_muted()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamNotice> {
        self.shared.state.notices.subscribe()
    }

    /// Open the transport, configure the session and start audio.
    ///
    /// Fails with [`StreamError::AlreadyActive`] unless the controller is
    /// `Idle`; the running stream is left untouched in that case. A `stop`
    /// issued while connecting aborts the connect with
    /// [`StreamError::Cancelled`].
    pub async fn start(&self) -> Result<(), StreamError> {
        let Ok(mut live) = self.live.try_lock() else {
            return Err(StreamError::AlreadyActive);
        };
        let abort = CancellationToken::new();
        *self.connecting.lock() = Some(abort.clone());
        let _pending = PendingConnect(&self.connecting);
        self.shared.state.begin()?;

        let timeout = self.shared.options.connect_timeout;
        let connected = tokio::select! {
            connected = tokio::time::timeout(timeout, self.connector.connect()) => connected,
            _ = abort.cancelled() => {
                info!("Connect abandoned by stop");
                return Err(StreamError::Cancelled);
            }
        };
        let (mut tx, rx) = match connected {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                self.shared.state.fail(&e.to_string());
                return Err(e.into());
            }
            Err(_) => {
                let ms = timeout.as_millis() as u64;
                self.shared.state.fail(&format!("connect timed out after {ms}ms"));
                return Err(StreamError::ConnectTimeout(ms));
            }
        };

        let config = self.shared.session.config();
        let tools = self.shared.dispatcher.registry().realtime_schemas();
        let setup = ClientEvent::session_update(&config, tools).to_json()?;
        if let Err(e) = tx.send(setup).await {
            self.shared.state.fail(&e.to_string());
            let _ = tx.close().await;
            return Err(e.into());
        }

        let playback = self.shared.sink.lock().start();
        if let Err(e) = playback {
            self.shared.state.fail(&e.to_string());
            let _ = tx.close().await;
            return Err(e.into());
        }

        let (capture_sink, capture_queue) = capture_channel(
            self.shared.options.queue_capacity,
            Arc::clone(&self.shared.gate),
            Arc::clone(&self.shared.stats),
        );
        let capture = self.shared.source.lock().start(capture_sink);
        if let Err(e) = capture {
            self.shared.state.fail(&e.to_string());
            self.shared.sink.lock().stop();
            let _ = tx.close().await;
            return Err(e.into());
        }

        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (play_tx, play_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(run_writer(
            Arc::clone(&self.shared),
            tx,
            outbound_rx,
            capture_queue,
            cancel.clone(),
        ));
        let reader = tokio::spawn(run_reader(
            Arc::clone(&self.shared),
            rx,
            outbound_tx.clone(),
            play_tx,
            cancel.clone(),
        ));
        let player = tokio::spawn(run_player(Arc::clone(&self.shared), play_rx));

        *live = Some(LiveStream {
            cancel,
            outbound: outbound_tx,
            writer,
            reader,
            player,
            started: Instant::now(),
        });

        // A reader failure may already have landed; only promote a live stream.
        self.shared
            .state
            .promote(StreamState::Connecting, StreamState::Streaming);
        Ok(())
    }

    /// Send typed text into the live stream and ask for a text response.
    pub async fn send_text(&self, text: &str) -> Result<(), StreamError> {
        let state = self.state();
        if state != StreamState::Streaming {
            return Err(StreamError::InvalidState {
                operation: "send text",
                state,
            });
        }
        let live = self.live.lock().await;
        let Some(live) = live.as_ref() else {
            return Err(TransportError::Closed.into());
        };

        let config = self.shared.session.config();
        let full_text = augment_user_text(text, &config, Local::now());
        self.shared
            .session
            .append(TranscriptEntry::new(Role::User, full_text.clone()));

        for event in [ClientEvent::user_text(full_text), ClientEvent::text_response()] {
            live.outbound
                .send(event.to_json()?)
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    /// Halt capture, close the transport and release every resource.
    ///
    /// A no-op from `Idle` or `Closed`. A failed stream is cleaned up but
    /// stays `Failed` until [`reset`](Self::reset).
    pub async fn stop(&self) -> Result<(), StreamError> {
        if let Some(abort) = self.connecting.lock().as_ref() {
            abort.cancel();
        }
        let mut live = self.live.lock().await;
        let state = self.state();
        if matches!(state, StreamState::Idle | StreamState::Closed) {
            return Ok(());
        }
        let failed = state.is_failed();
        if !failed {
            self.shared.state.set(StreamState::Closing);
        }

        self.release(live.take()).await;

        if !failed {
            self.shared.state.set(StreamState::Closed);
        }
        Ok(())
    }

    /// Return a closed or failed controller to `Idle`.
    pub async fn reset(&self) -> Result<(), StreamError> {
        let mut live = self.live.lock().await;
        let state = self.state();
        match state {
            StreamState::Closed | StreamState::Failed(_) => {
                self.release(live.take()).await;
                self.shared.state.set(StreamState::Idle);
                Ok(())
            }
            other => Err(StreamError::InvalidState {
                operation: "reset",
                state: other,
            }),
        }
    }

    async fn release(&self, live: Option<LiveStream>) {
        if let Some(live) = live {
            live.cancel.cancel();
            self.shared.source.lock().stop();

            // The writer performs the close handshake under its own bound.
            let grace = self.shared.options.close_timeout + Duration::from_millis(250);
            let mut writer = live.writer;
            if tokio::time::timeout(grace, &mut writer).await.is_err() {
                warn!("Writer did not finish within {:?}; aborting", grace);
                writer.abort();
            }
            live.reader.abort();
            live.player.abort();
            metrics::record_stream_duration(live.started.elapsed().as_secs_f64() * 1000.0);
        } else {
            self.shared.source.lock().stop();
        }
        self.shared.sink.lock().stop();
        self.shared.gate.unmute();
    }
}

async fn run_writer(
    shared: Arc<Shared>,
    mut tx: Box<dyn TransportSink>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut capture: CaptureQueue,
    cancel: CancellationToken,
) {
    loop {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(text) = outbound.recv() => tx.send(text).await,
            Some(frame) = capture.recv() => match send_frame(tx.as_mut(), &frame).await {
                Ok(()) => {
                    shared.stats.record_sent();
                    Ok(())
                }
                Err(e) => Err(e),
            },
            else => break,
        };
        if let Err(e) = sent {
            shared.on_transport_failure(&e.to_string(), &cancel);
            break;
        }
    }

    capture.close();
    match tokio::time::timeout(shared.options.close_timeout, tx.close()).await {
        Ok(Ok(())) => debug!("Transport closed"),
        Ok(Err(e)) => debug!("Transport close failed: {}", e),
        Err(_) => warn!("Transport close timed out"),
    }
}

async fn send_frame(tx: &mut dyn TransportSink, frame: &AudioFrame) -> Result<(), TransportError> {
    let json = ClientEvent::audio(frame)
        .to_json()
        .map_err(|e| TransportError::Send(e.to_string()))?;
    tx.send(json).await
}

async fn run_reader(
    shared: Arc<Shared>,
    mut rx: Box<dyn TransportStream>,
    outbound: mpsc::UnboundedSender<String>,
    playback: mpsc::UnboundedSender<AudioFrame>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = rx.next() => message,
        };
        match message {
            Some(Ok(raw)) => handle_event(&shared, &raw, &outbound, &playback),
            Some(Err(e)) => {
                shared.on_transport_failure(&e.to_string(), &cancel);
                break;
            }
            None => {
                shared.on_transport_failure(&TransportError::Closed.to_string(), &cancel);
                break;
            }
        }
    }
}

fn handle_event(
    shared: &Arc<Shared>,
    raw: &str,
    outbound: &mpsc::UnboundedSender<String>,
    playback: &mpsc::UnboundedSender<AudioFrame>,
) {
    let event = match ServerEvent::parse(raw) {
        Ok(event) => event,
        Err(e) => {
            warn!("Ignoring malformed server event: {}", e);
            return;
        }
    };

    match event {
        ServerEvent::AudioDelta { delta } => {
            if !shared.gate.is_muted() {
                debug!("Muting microphone during playback");
            }
            shared.gate.mute();
            match decode_audio(&delta) {
                Ok(frame) => {
                    let _ = playback.send(frame);
                }
                Err(e) => warn!("Dropping undecodable audio delta: {}", e),
            }
        }
        ServerEvent::AudioDone => {
            let _ = shared.gate.unmute_after(shared.options.unmute_delay);
        }
        ServerEvent::TextDone { text } | ServerEvent::AudioTranscriptDone { transcript: text } => {
            if !text.trim().is_empty() {
                shared
                    .session
                    .append(TranscriptEntry::new(Role::Assistant, text.clone()));
                shared.notify(StreamNotice::AssistantText(text));
            }
        }
        ServerEvent::ResponseDone { response } => {
            let calls: Vec<ToolCallRequest> = response
                .output
                .into_iter()
                .filter_map(|item| match item {
                    OutputItem::FunctionCall {
                        name,
                        call_id,
                        arguments,
                    } => Some(ToolCallRequest::from_json_arguments(name, &arguments).with_call_id(call_id)),
                    OutputItem::Other => None,
                })
                .collect();
            if !calls.is_empty() {
                tokio::spawn(answer_tool_calls(Arc::clone(shared), calls, outbound.clone()));
            }
        }
        ServerEvent::Error { error } => {
            warn!("Realtime server error: {}", error.message);
            shared.notify(StreamNotice::ServerError(error.message));
        }
        ServerEvent::SessionCreated => debug!("Realtime session created"),
        ServerEvent::Unknown => {}
    }
}

/// Dispatch every call of one response, then request a single follow-up.
async fn answer_tool_calls(
    shared: Arc<Shared>,
    calls: Vec<ToolCallRequest>,
    outbound: mpsc::UnboundedSender<String>,
) {
    for request in calls {
        let call_id = request.call_id.clone().unwrap_or_default();
        let operation = request.operation.clone();
        shared.session.append(TranscriptEntry::tool_call(&request));

        let result = shared.dispatcher.dispatch(request, &shared.session).await;
        shared.notify(StreamNotice::ToolResult {
            operation,
            ok: result.ok,
            message: result.message.clone(),
        });

        match ClientEvent::function_output(call_id, &result.to_output_json()).to_json() {
            Ok(json) => {
                if outbound.send(json).is_err() {
                    return;
                }
            }
            Err(e) => error!("Failed to encode function output: {}", e),
        }
    }
    if let Ok(json) = ClientEvent::response().to_json() {
        let _ = outbound.send(json);
    }
}

async fn run_player(shared: Arc<Shared>, mut frames: mpsc::UnboundedReceiver<AudioFrame>) {
    while let Some(frame) = frames.recv().await {
        let played = shared.sink.lock().play(frame);
        match played {
            Ok(()) => shared.stats.record_played(),
            Err(e) => warn!("Playback failed: {}", e),
        }
    }
}
