//! Per-call session task.
//!
//! One task owns all session state and multiplexes both sockets, the command
//! channel and the idle timer with `tokio::select!`. Each socket has its own
//! writer task fed by a bounded channel; a full channel means the peer is not
//! keeping up and the session is torn down.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::policy::{AudioFormatPolicy, BridgeOptions};
use super::state::{SessionState, StateCell};
use super::transport::{SocketPair, WireMessage, WireSink};
use crate::core::codec::AudioFormat;
use crate::core::events::{BridgeEvent, EventBus};
use crate::core::interruption::InterruptionController;
use crate::core::realtime::ClientEvent;
use crate::core::telephony::{MediaFormat, OutboundFrame};
use crate::core::translator::{ControlEvent, ProtocolTranslator, Side};
use crate::errors::{BridgeError, BridgeResult};

/// Upper bound on waiting for writers to flush during teardown.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Requests from the [`MediaStreamBridge`](super::MediaStreamBridge) handle.
#[derive(Debug)]
pub(crate) enum Command {
    Send(ClientEvent),
    Interrupt,
}

/// What the reactor loop does after handling one input.
enum Flow {
    Continue,
    Close(String),
}

pub(crate) struct BridgeSession {
    session_id: String,
    policy: AudioFormatPolicy,
    explicit_format: Option<AudioFormat>,
    max_pending: usize,
    read_timeout: Duration,
    translator: ProtocolTranslator,
    interruption: InterruptionController,
    state: Arc<StateCell>,
    events: EventBus,
    telephony_out: Option<mpsc::Sender<WireMessage>>,
    realtime_out: Option<mpsc::Sender<WireMessage>>,
    /// Application events waiting for `session.update`
    pending_realtime: VecDeque<ClientEvent>,
    /// AI audio waiting for the telephony stream to start
    pending_telephony: VecDeque<ControlEvent>,
}

impl BridgeSession {
    pub(crate) fn new(
        session_id: String,
        options: &BridgeOptions,
        state: Arc<StateCell>,
        events: EventBus,
    ) -> Self {
        let provisional = options.format_policy.resolve(options.audio_format);
        Self {
            session_id,
            policy: options.format_policy,
            explicit_format: options.audio_format,
            max_pending: options.max_pending_frames.max(1),
            read_timeout: options.read_timeout,
            translator: ProtocolTranslator::new(options.agent.clone(), provisional),
            interruption: InterruptionController::with_capacity(options.max_pending_frames),
            state,
            events,
            telephony_out: None,
            realtime_out: None,
            pending_realtime: VecDeque::new(),
            pending_telephony: VecDeque::new(),
        }
    }

    /// Drive the session until either side closes, then tear down.
    pub(crate) async fn run(
        mut self,
        telephony: SocketPair,
        realtime: SocketPair,
        mut commands: mpsc::Receiver<Command>,
        cancel: CancellationToken,
    ) {
        let SocketPair {
            stream: mut telephony_stream,
            sink: telephony_sink,
        } = telephony;
        let SocketPair {
            stream: mut realtime_stream,
            sink: realtime_sink,
        } = realtime;

        let (writer_err_tx, mut writer_err_rx) = mpsc::unbounded_channel();

        let (telephony_tx, telephony_rx) = mpsc::channel(self.max_pending);
        let (realtime_tx, realtime_rx) = mpsc::channel(self.max_pending);
        self.telephony_out = Some(telephony_tx);
        self.realtime_out = Some(realtime_tx);

        let writers = [
            tokio::spawn(write_loop(
                Side::Telephony,
                telephony_sink,
                telephony_rx,
                writer_err_tx.clone(),
            )),
            tokio::spawn(write_loop(
                Side::Realtime,
                realtime_sink,
                realtime_rx,
                writer_err_tx,
            )),
        ];

        info!(session_id = %self.session_id, "Bridge session started");

        let idle = tokio::time::sleep(self.read_timeout);
        tokio::pin!(idle);

        let outcome: BridgeResult<String> = loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => Ok(Flow::Close("closed by application".to_string())),

                msg = telephony_stream.next() => {
                    idle.as_mut().reset(Instant::now() + self.read_timeout);
                    match msg {
                        Some(Ok(msg)) => self.on_telephony(msg),
                        Some(Err(e)) => Err(e),
                        None => Ok(Flow::Close("telephony socket closed".to_string())),
                    }
                }

                msg = realtime_stream.next() => {
                    idle.as_mut().reset(Instant::now() + self.read_timeout);
                    match msg {
                        Some(Ok(msg)) => self.on_realtime(msg),
                        Some(Err(e)) => Err(e),
                        None => Ok(Flow::Close("realtime socket closed".to_string())),
                    }
                }

                Some(command) = commands.recv() => self.on_command(command),

                Some(err) = writer_err_rx.recv() => Err(err),

                _ = &mut idle => Ok(Flow::Close(format!(
                    "no traffic for {}s",
                    self.read_timeout.as_secs()
                ))),
            };

            match step {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close(reason)) => break Ok(reason),
                Err(e) => break Err(e),
            }
        };

        self.teardown(outcome, writers).await;
    }

    // =========================================================================
    // Telephony side
    // =========================================================================

    fn on_telephony(&mut self, msg: WireMessage) -> BridgeResult<Flow> {
        match msg {
            WireMessage::Text(text) => {
                trace!(session_id = %self.session_id, frame = %text, "Telephony frame");
                self.handle_telephony_text(&text)
            }
            WireMessage::Binary(data) => self.frame_error(
                Side::Telephony,
                BridgeError::MalformedFrame(format!("unexpected binary frame ({} bytes)", data.len())),
            ),
            WireMessage::Ping(_) | WireMessage::Pong(_) => Ok(Flow::Continue),
            WireMessage::Close(reason) => Ok(Flow::Close(format!(
                "telephony closed: {}",
                reason.unwrap_or_default()
            ))),
        }
    }

    fn handle_telephony_text(&mut self, text: &str) -> BridgeResult<Flow> {
        let (raw, event) = match self.translator.from_telephony(text) {
            Ok(parsed) => parsed,
            Err(e) => return self.frame_error(Side::Telephony, e),
        };
        self.events.publish(BridgeEvent::TelephonyMessage(raw));

        match event {
            ControlEvent::Start {
                ref stream_sid,
                ref media_format,
                ref call_sid,
                ..
            } => {
                let stream_sid = stream_sid.clone();
                let media_format = media_format.clone();
                info!(
                    session_id = %self.session_id,
                    stream_sid = %stream_sid,
                    call_sid = call_sid.as_deref().unwrap_or("-"),
                    "Telephony stream started"
                );
                self.events.publish(BridgeEvent::Translated(event));
                self.negotiate(&stream_sid, media_format.as_ref())
            }
            ControlEvent::Media { .. } => {
                if let Some(append) = self.translator.to_realtime(&event) {
                    self.write_realtime(&append)?;
                }
                self.events.publish(BridgeEvent::Translated(event));
                Ok(Flow::Continue)
            }
            ControlEvent::Mark { ref name } => {
                let acknowledged = self.interruption.acknowledge(name);
                debug!(
                    session_id = %self.session_id,
                    mark = %name,
                    acknowledged,
                    played_ms = self.interruption.played_ms(),
                    "Playback mark echoed"
                );
                self.events.publish(BridgeEvent::Translated(event));
                Ok(Flow::Continue)
            }
            ControlEvent::Stop => {
                self.events.publish(BridgeEvent::Translated(event));
                Ok(Flow::Close("telephony stream stopped".to_string()))
            }
            ControlEvent::Unmapped {
                side,
                event_type,
                raw,
            } => {
                debug!(session_id = %self.session_id, event_type = %event_type, "Unmapped telephony frame");
                self.events.publish(BridgeEvent::Unmapped {
                    side,
                    event_type,
                    raw,
                });
                Ok(Flow::Continue)
            }
            other => {
                self.events.publish(BridgeEvent::Translated(other));
                Ok(Flow::Continue)
            }
        }
    }

    /// Fix the session format, send the single `session.update` and go active.
    fn negotiate(&mut self, stream_sid: &str, media_format: Option<&MediaFormat>) -> BridgeResult<Flow> {
        if self.state.get() != SessionState::NegotiatingFormat {
            return self.frame_error(
                Side::Telephony,
                BridgeError::MalformedFrame(format!(
                    "start frame while {}",
                    self.state.get()
                )),
            );
        }

        // Fatal here: the session cannot carry audio in any other format
        let format = self.policy.negotiate(self.explicit_format, media_format)?;
        self.translator.bind(stream_sid, format)?;

        let negotiated = ControlEvent::FormatNegotiated { format };
        if let Some(update) = self.translator.to_realtime(&negotiated) {
            self.write_realtime(&update)?;
        }
        self.events.publish(BridgeEvent::Translated(negotiated));

        self.state.transition(SessionState::Active)?;
        info!(
            session_id = %self.session_id,
            stream_sid = %stream_sid,
            format = %format,
            "Audio format negotiated, session active"
        );
        self.events.publish(BridgeEvent::Connected {
            session_id: self.session_id.clone(),
            stream_sid: stream_sid.to_string(),
            format,
        });

        while let Some(event) = self.pending_realtime.pop_front() {
            self.write_realtime(&event)?;
        }
        while let Some(event) = self.pending_telephony.pop_front() {
            if let Flow::Close(reason) = self.handle_realtime_event(event)? {
                return Ok(Flow::Close(reason));
            }
        }
        Ok(Flow::Continue)
    }

    // =========================================================================
    // Realtime side
    // =========================================================================

    fn on_realtime(&mut self, msg: WireMessage) -> BridgeResult<Flow> {
        match msg {
            WireMessage::Text(text) => {
                trace!(session_id = %self.session_id, event = %text, "Realtime event");
                let (raw, event) = match self.translator.from_realtime(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => return self.frame_error(Side::Realtime, e),
                };
                self.events.publish(BridgeEvent::RealtimeMessage(raw));
                self.handle_realtime_event(event)
            }
            WireMessage::Binary(data) => self.frame_error(
                Side::Realtime,
                BridgeError::MalformedFrame(format!("unexpected binary frame ({} bytes)", data.len())),
            ),
            WireMessage::Ping(_) | WireMessage::Pong(_) => Ok(Flow::Continue),
            WireMessage::Close(reason) => Ok(Flow::Close(format!(
                "realtime closed: {}",
                reason.unwrap_or_default()
            ))),
        }
    }

    fn handle_realtime_event(&mut self, event: ControlEvent) -> BridgeResult<Flow> {
        match event {
            ControlEvent::AudioDelta {
                ref item_id,
                ref mark,
                ref frame,
            } => {
                if self.state.get() != SessionState::Active {
                    if self.pending_telephony.len() >= self.max_pending {
                        return Err(BridgeError::BackpressureExceeded {
                            side: "telephony",
                            capacity: self.max_pending,
                        });
                    }
                    self.pending_telephony.push_back(event);
                    return Ok(Flow::Continue);
                }
                let frames = self.translator.to_telephony(&event)?;
                self.interruption
                    .record_audio(mark, item_id, frame.byte_len, frame.format);
                for frame in &frames {
                    self.write_telephony(frame)?;
                }
                self.events.publish(BridgeEvent::Translated(event));
            }
            ControlEvent::SpeechStarted { ref item_id, audio_start_ms } => {
                debug!(
                    session_id = %self.session_id,
                    item_id = item_id.as_deref().unwrap_or("-"),
                    audio_start_ms,
                    "Caller speech started"
                );
                self.events.publish(BridgeEvent::Translated(event));
                return self.barge_in();
            }
            ControlEvent::ResponseDone { ref response } => {
                self.interruption.response_done();
                info!(
                    session_id = %self.session_id,
                    status = response.get("status").and_then(|s| s.as_str()).unwrap_or("unknown"),
                    "Response done"
                );
                self.events.publish(BridgeEvent::ResponseDone {
                    response: response.clone(),
                });
                self.events.publish(BridgeEvent::Translated(event));
            }
            ControlEvent::ToolCall {
                ref call_id,
                ref name,
                ref arguments,
            } => {
                info!(
                    session_id = %self.session_id,
                    call_id = %call_id,
                    name = name.as_deref().unwrap_or("-"),
                    "Tool call requested"
                );
                self.events.publish(BridgeEvent::ToolStart {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                });
                self.events.publish(BridgeEvent::Translated(event));
            }
            ControlEvent::TranscriptionCompleted {
                ref item_id,
                ref transcript,
            } => {
                self.events.publish(BridgeEvent::TranscriptionCompleted {
                    item_id: item_id.clone(),
                    transcript: transcript.clone(),
                });
                self.events.publish(BridgeEvent::Translated(event));
            }
            ControlEvent::RealtimeError { ref error } => {
                warn!(
                    session_id = %self.session_id,
                    error_type = %error.error_type,
                    code = error.code.as_deref().unwrap_or("-"),
                    "Realtime API error: {}",
                    error.message
                );
                self.events.publish(BridgeEvent::Error {
                    session_id: self.session_id.clone(),
                    code: error
                        .code
                        .clone()
                        .unwrap_or_else(|| error.error_type.clone()),
                    message: error.message.clone(),
                    fatal: false,
                });
                self.events.publish(BridgeEvent::Translated(event));
            }
            ControlEvent::Unmapped {
                side,
                event_type,
                raw,
            } => {
                self.events.publish(BridgeEvent::Unmapped {
                    side,
                    event_type,
                    raw,
                });
            }
            other => {
                self.events.publish(BridgeEvent::Translated(other));
            }
        }
        Ok(Flow::Continue)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn on_command(&mut self, command: Command) -> BridgeResult<Flow> {
        match command {
            Command::Send(event) => {
                if let Some((call_id, output)) = event.function_call_output() {
                    info!(session_id = %self.session_id, call_id = %call_id, "Tool call completed");
                    self.events.publish(BridgeEvent::ToolEnd {
                        call_id: call_id.to_string(),
                        output: output.to_string(),
                    });
                }

                if self.state.get() == SessionState::Active {
                    self.write_realtime(&event)?;
                } else {
                    if self.pending_realtime.len() >= self.max_pending {
                        return Err(BridgeError::BackpressureExceeded {
                            side: "realtime",
                            capacity: self.max_pending,
                        });
                    }
                    debug!(
                        session_id = %self.session_id,
                        event_type = event.event_type(),
                        "Queueing event until session is active"
                    );
                    self.pending_realtime.push_back(event);
                }
                Ok(Flow::Continue)
            }
            Command::Interrupt => self.barge_in(),
        }
    }

    /// Clear buffered telephony audio and truncate the assistant item.
    fn barge_in(&mut self) -> BridgeResult<Flow> {
        self.pending_telephony.clear();
        let Some(interruption) = self.interruption.barge_in() else {
            debug!(session_id = %self.session_id, "Barge-in with no AI audio in flight");
            return Ok(Flow::Continue);
        };

        let clear = ControlEvent::Clear;
        for frame in self.translator.to_telephony(&clear)? {
            self.write_telephony(&frame)?;
        }
        let truncate = ControlEvent::Truncate {
            item_id: interruption.item_id.clone(),
            audio_end_ms: interruption.audio_end_ms,
        };
        if let Some(event) = self.translator.to_realtime(&truncate) {
            self.write_realtime(&event)?;
        }

        info!(
            session_id = %self.session_id,
            item_id = %interruption.item_id,
            audio_end_ms = interruption.audio_end_ms,
            "Barge-in: cleared telephony audio"
        );
        self.events.publish(BridgeEvent::Translated(clear));
        self.events.publish(BridgeEvent::Translated(truncate));
        self.events.publish(BridgeEvent::Interrupted {
            item_id: interruption.item_id,
            audio_end_ms: interruption.audio_end_ms,
        });
        Ok(Flow::Continue)
    }

    // =========================================================================
    // Writing
    // =========================================================================

    fn write_telephony(&self, frame: &OutboundFrame) -> BridgeResult<()> {
        let json = frame.to_json()?;
        Self::enqueue(self.telephony_out.as_ref(), "telephony", self.max_pending, json)
    }

    fn write_realtime(&self, event: &ClientEvent) -> BridgeResult<()> {
        let json = event.to_json()?;
        Self::enqueue(self.realtime_out.as_ref(), "realtime", self.max_pending, json)
    }

    fn enqueue(
        tx: Option<&mpsc::Sender<WireMessage>>,
        side: &'static str,
        capacity: usize,
        json: String,
    ) -> BridgeResult<()> {
        let tx = tx.ok_or(BridgeError::NotConnected)?;
        tx.try_send(WireMessage::Text(json)).map_err(|e| match e {
            TrySendError::Full(_) => BridgeError::BackpressureExceeded { side, capacity },
            TrySendError::Closed(_) => BridgeError::WebSocket(format!("{side} writer closed")),
        })
    }

    /// Log and report a per-frame error; fatal errors end the session.
    fn frame_error(&self, side: Side, err: BridgeError) -> BridgeResult<Flow> {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(session_id = %self.session_id, side = %side, "Dropping frame: {}", err);
        self.events.publish(BridgeEvent::Error {
            session_id: self.session_id.clone(),
            code: err.code().to_string(),
            message: err.to_string(),
            fatal: false,
        });
        Ok(Flow::Continue)
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    async fn teardown(mut self, outcome: BridgeResult<String>, writers: [JoinHandle<()>; 2]) {
        if !self.state.get().is_terminating() {
            let _ = self.state.transition(SessionState::Closing);
        }

        let reason = match &outcome {
            Ok(reason) => {
                info!(session_id = %self.session_id, reason = %reason, "Closing bridge session");
                reason.clone()
            }
            Err(e) => {
                error!(session_id = %self.session_id, code = e.code(), "Bridge session failed: {}", e);
                self.events.publish(BridgeEvent::Error {
                    session_id: self.session_id.clone(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                    fatal: true,
                });
                e.to_string()
            }
        };

        // Close frames are best effort; dropping the senders ends both writers
        for tx in [self.telephony_out.take(), self.realtime_out.take()]
            .into_iter()
            .flatten()
        {
            let _ = tx.try_send(WireMessage::Close(None));
        }

        let drain = self.read_timeout.min(WRITER_DRAIN_TIMEOUT);
        for handle in writers {
            let abort = handle.abort_handle();
            if tokio::time::timeout(drain, handle).await.is_err() {
                warn!(session_id = %self.session_id, "Writer did not drain in time, aborting");
                abort.abort();
            }
        }

        let discarded = self.pending_realtime.len() + self.pending_telephony.len();
        if discarded > 0 {
            debug!(session_id = %self.session_id, discarded, "Discarding pending frames");
        }
        self.pending_realtime.clear();
        self.pending_telephony.clear();

        let _ = self.state.transition(SessionState::Closed);
        info!(session_id = %self.session_id, "Bridge session closed");
        self.events.publish(BridgeEvent::Disconnected {
            session_id: self.session_id.clone(),
            reason,
        });
    }
}

/// Forward queued messages to one socket until the queue closes or a close
/// frame is written.
async fn write_loop(
    side: Side,
    mut sink: WireSink,
    mut rx: mpsc::Receiver<WireMessage>,
    errors: mpsc::UnboundedSender<BridgeError>,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, WireMessage::Close(_));
        if let Err(e) = sink.send(msg).await {
            if !is_close {
                debug!(side = %side, "Writer failed: {}", e);
                let _ = errors.send(e);
            }
            return;
        }
        if is_close {
            break;
        }
    }
    let _ = sink.close().await;
}
