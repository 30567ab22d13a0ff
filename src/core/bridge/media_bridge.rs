use std::sync::Arc;

use futures::SinkExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::policy::BridgeOptions;
use super::session::{BridgeSession, Command};
use super::state::{SessionState, StateCell};
use super::transport::{SocketPair, WireMessage};
use crate::core::events::{BridgeEvent, EventBus, EventFilter, EventSubscription};
use crate::core::realtime::{ClientEvent, RealtimeCredentials};
use crate::errors::ConnectError;

/// Bridges one telephony media stream to the realtime API.
///
/// Created when the telephony socket is accepted. [`connect`](Self::connect)
/// opens the realtime side and starts the session task; from then on the
/// handle is only used to observe the session, inject client events and
/// request termination.
///
/// ```rust,ignore
/// let bridge = MediaStreamBridge::new(SocketPair::from_axum(socket), options);
/// let mut events = bridge.subscribe(EventFilter::All);
/// bridge.connect(&RealtimeCredentials::new(api_key)).await?;
/// bridge.send_event(ClientEvent::response_create());
/// bridge.closed().await;
/// ```
pub struct MediaStreamBridge {
    session_id: String,
    options: BridgeOptions,
    events: EventBus,
    state: Arc<StateCell>,
    /// Held until `connect` hands it to the session task
    telephony: Mutex<Option<SocketPair>>,
    commands: mpsc::Sender<Command>,
    command_rx: Mutex<Option<mpsc::Receiver<Command>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MediaStreamBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStreamBridge")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl MediaStreamBridge {
    pub fn new(telephony: SocketPair, options: BridgeOptions) -> Self {
        let events = EventBus::new();
        let state = Arc::new(StateCell::new(events.clone()));
        let (commands, command_rx) = mpsc::channel(options.max_pending_frames.max(1));
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            options,
            events,
            state,
            telephony: Mutex::new(Some(telephony)),
            commands,
            command_rx: Mutex::new(Some(command_rx)),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Watch channel that follows every state transition.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to all events or to one kind.
    pub fn subscribe(&self, filter: impl Into<EventFilter>) -> EventSubscription {
        self.events.subscribe(filter)
    }

    /// Open the realtime socket and start bridging.
    ///
    /// On failure the `error` event is emitted, the telephony socket is closed
    /// and the session ends in `Closed`. Calling this twice, or after
    /// [`close`](Self::close), fails with [`ConnectError::AlreadyConnected`].
    pub async fn connect(&self, credentials: &RealtimeCredentials) -> Result<(), ConnectError> {
        let (telephony, command_rx) = {
            let mut telephony = self.telephony.lock();
            let mut command_rx = self.command_rx.lock();
            match (telephony.take(), command_rx.take()) {
                (Some(t), Some(c)) => (t, c),
                _ => return Err(ConnectError::AlreadyConnected),
            }
        };

        info!(session_id = %self.session_id, model = %credentials.model, "Connecting bridge to realtime API");

        let timeout = self.options.connect_timeout;
        let handshake = tokio::time::timeout(timeout, self.options.connector.connect(credentials));
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(ConnectError::Handshake("session closed while connecting".to_string()))
            }
            result = handshake => match result {
                Ok(result) => result,
                Err(_) => Err(ConnectError::Timeout(timeout.as_millis() as u64)),
            },
        };

        let realtime = match result {
            Ok(realtime) => realtime,
            Err(e) => {
                self.fail_connect(telephony, &e).await;
                return Err(e);
            }
        };

        // Only `connect` leaves Connecting; a later close() goes through the token
        let _ = self.state.transition(SessionState::NegotiatingFormat);

        let session = BridgeSession::new(
            self.session_id.clone(),
            &self.options,
            Arc::clone(&self.state),
            self.events.clone(),
        );
        let handle = tokio::spawn(session.run(telephony, realtime, command_rx, self.cancel.clone()));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn fail_connect(&self, mut telephony: SocketPair, err: &ConnectError) {
        error!(session_id = %self.session_id, "Realtime connection failed: {}", err);
        self.events.publish(BridgeEvent::Error {
            session_id: self.session_id.clone(),
            code: "connect_error".to_string(),
            message: err.to_string(),
            fatal: true,
        });

        let close = async {
            let _ = telephony.sink.send(WireMessage::Close(None)).await;
            let _ = telephony.sink.close().await;
        };
        if tokio::time::timeout(self.options.connect_timeout, close).await.is_err() {
            warn!(session_id = %self.session_id, "Timed out closing telephony socket");
        }
        if self.state.get() != SessionState::Closed {
            let _ = self.state.transition(SessionState::Closed);
        }
    }

    /// Send a client event to the realtime API, best effort.
    ///
    /// Events sent before the format is negotiated are queued and flushed
    /// right after `session.update`. Events are dropped (and logged) when the
    /// realtime side is not connected or the session is shutting down.
    pub fn send_event(&self, event: ClientEvent) {
        let state = self.state();
        if state == SessionState::Connecting || state.is_terminating() {
            warn!(
                session_id = %self.session_id,
                event_type = event.event_type(),
                state = %state,
                "Realtime side not connected, dropping event"
            );
            return;
        }
        let event_type = event.event_type();
        match self.commands.try_send(Command::Send(event)) {
            Ok(()) => debug!(session_id = %self.session_id, event_type, "Queued client event"),
            Err(mpsc::error::TrySendError::Full(_)) => warn!(
                session_id = %self.session_id,
                event_type,
                "Command queue full, dropping event"
            ),
            Err(mpsc::error::TrySendError::Closed(_)) => debug!(
                session_id = %self.session_id,
                event_type,
                "Session finished, dropping event"
            ),
        }
    }

    /// Barge in on behalf of the application, as if the caller started speaking.
    pub fn interrupt(&self) {
        if self.commands.try_send(Command::Interrupt).is_err() {
            debug!(session_id = %self.session_id, "Interrupt dropped, session not accepting commands");
        }
    }

    /// Request termination. Use [`closed`](Self::closed) to wait for it.
    ///
    /// A handshake still in flight is abandoned and `connect` fails.
    pub fn close(&self) {
        self.cancel.cancel();
        // Never connected: nothing else will close the telephony socket
        if self.telephony.lock().take().is_some() {
            let _ = self.state.transition(SessionState::Closed);
        }
    }

    /// Wait until the session reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bridge::transport::MemoryPeer;
    use crate::core::events::BridgeEventKind;
    use crate::core::realtime::RealtimeConnector;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Hands out one pre-built in-memory socket.
    struct MemoryConnector {
        socket: Mutex<Option<SocketPair>>,
    }

    #[async_trait]
    impl RealtimeConnector for MemoryConnector {
        async fn connect(&self, _: &RealtimeCredentials) -> Result<SocketPair, ConnectError> {
            self.socket
                .lock()
                .take()
                .ok_or_else(|| ConnectError::Handshake("already used".to_string()))
        }
    }

    struct FailingConnector;

    #[async_trait]
    impl RealtimeConnector for FailingConnector {
        async fn connect(&self, _: &RealtimeCredentials) -> Result<SocketPair, ConnectError> {
            Err(ConnectError::Handshake("401 Unauthorized".to_string()))
        }
    }

    struct HangingConnector;

    #[async_trait]
    impl RealtimeConnector for HangingConnector {
        async fn connect(&self, _: &RealtimeCredentials) -> Result<SocketPair, ConnectError> {
            std::future::pending().await
        }
    }

    fn memory_bridge() -> (MediaStreamBridge, MemoryPeer, MemoryPeer) {
        let (telephony, telephony_peer) = SocketPair::memory();
        let (realtime, realtime_peer) = SocketPair::memory();
        let connector = Arc::new(MemoryConnector {
            socket: Mutex::new(Some(realtime)),
        });
        let bridge = MediaStreamBridge::new(telephony, BridgeOptions::new(connector));
        (bridge, telephony_peer, realtime_peer)
    }

    #[tokio::test]
    async fn test_starts_connecting() {
        let (bridge, _t, _r) = memory_bridge();
        assert_eq!(bridge.state(), SessionState::Connecting);
        assert!(!bridge.session_id().is_empty());
    }

    #[tokio::test]
    async fn test_connect_moves_to_negotiating() {
        let (bridge, _t, _r) = memory_bridge();
        bridge.connect(&RealtimeCredentials::new("sk-test")).await.unwrap();
        assert_eq!(bridge.state(), SessionState::NegotiatingFormat);

        assert_eq!(
            bridge.connect(&RealtimeCredentials::new("sk-test")).await,
            Err(ConnectError::AlreadyConnected)
        );
        bridge.close();
        tokio::time::timeout(Duration::from_secs(5), bridge.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_closes_session() {
        let (telephony, mut telephony_peer) = SocketPair::memory();
        let bridge = MediaStreamBridge::new(telephony, BridgeOptions::new(Arc::new(FailingConnector)));
        let mut errors = bridge.subscribe(BridgeEventKind::Error);

        let err = bridge.connect(&RealtimeCredentials::new("sk-test")).await.unwrap_err();
        assert!(matches!(err, ConnectError::Handshake(_)));
        assert_eq!(bridge.state(), SessionState::Closed);

        let event = errors.try_recv().unwrap();
        assert!(matches!(&*event, BridgeEvent::Error { fatal: true, .. }));
        assert!(errors.try_recv().is_none());

        assert_eq!(telephony_peer.recv().await, Some(WireMessage::Close(None)));
        assert_eq!(telephony_peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let (telephony, _peer) = SocketPair::memory();
        let options = BridgeOptions::new(Arc::new(HangingConnector))
            .with_connect_timeout(Duration::from_millis(50));
        let bridge = MediaStreamBridge::new(telephony, options);

        let err = bridge.connect(&RealtimeCredentials::new("sk-test")).await.unwrap_err();
        assert_eq!(err, ConnectError::Timeout(50));
        assert_eq!(bridge.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_close_during_handshake() {
        let (telephony, mut telephony_peer) = SocketPair::memory();
        let bridge = MediaStreamBridge::new(telephony, BridgeOptions::new(Arc::new(HangingConnector)));
        let mut errors = bridge.subscribe(BridgeEventKind::Error);

        let credentials = RealtimeCredentials::new("sk-test");
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(bridge.connect(&credentials), async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                bridge.close();
            })
        })
        .await
        .expect("handshake was not abandoned");

        assert_eq!(
            result,
            Err(ConnectError::Handshake("session closed while connecting".to_string()))
        );
        assert_eq!(bridge.state(), SessionState::Closed);
        assert!(matches!(errors.try_recv().as_deref(), Some(BridgeEvent::Error { fatal: true, .. })));
        assert_eq!(telephony_peer.recv().await, Some(WireMessage::Close(None)));
        bridge.closed().await;
    }

    #[tokio::test]
    async fn test_send_event_before_connect_is_dropped() {
        let (bridge, _t, mut realtime_peer) = memory_bridge();
        bridge.send_event(ClientEvent::response_create());

        bridge.connect(&RealtimeCredentials::new("sk-test")).await.unwrap();
        bridge.close();
        bridge.closed().await;

        // Only the close frame reaches the realtime side
        assert_eq!(realtime_peer.recv().await, Some(WireMessage::Close(None)));
    }

    #[tokio::test]
    async fn test_close_before_connect() {
        let (bridge, _t, _r) = memory_bridge();
        bridge.close();
        assert_eq!(bridge.state(), SessionState::Closed);
        bridge.closed().await;
        assert_eq!(
            bridge.connect(&RealtimeCredentials::new("sk-test")).await,
            Err(ConnectError::AlreadyConnected)
        );
    }
}
