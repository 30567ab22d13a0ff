//! Session state machine.
//!
//! ```text
//! Connecting -> NegotiatingFormat -> Active -> Closing -> Closed
//! ```
//!
//! Any open state may move to `Closing`; `Connecting` may also go straight to
//! `Closed` when the realtime handshake fails or the session is closed before
//! connecting.

use serde::Serialize;
use tokio::sync::watch;

use crate::core::events::{BridgeEvent, EventBus};
use crate::errors::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    NegotiatingFormat,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::NegotiatingFormat => "negotiating_format",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, NegotiatingFormat)
                | (Connecting, Closing)
                | (Connecting, Closed)
                | (NegotiatingFormat, Active)
                | (NegotiatingFormat, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    /// Closing or closed.
    pub fn is_terminating(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared owner of the session state.
///
/// Transitions are validated, published on a `watch` channel and announced on
/// the event bus.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<SessionState>,
    events: EventBus,
}

impl StateCell {
    pub(crate) fn new(events: EventBus) -> Self {
        let (tx, _rx) = watch::channel(SessionState::Connecting);
        Self { tx, events }
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub(crate) fn transition(&self, to: SessionState) -> BridgeResult<()> {
        let mut from = SessionState::Connecting;
        let mut allowed = false;
        self.tx.send_if_modified(|state| {
            from = *state;
            allowed = state.can_transition_to(to);
            if allowed {
                *state = to;
            }
            allowed
        });

        if !allowed {
            return Err(BridgeError::InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            });
        }
        tracing::debug!(from = %from, to = %to, "Session state changed");
        self.events.publish(BridgeEvent::StateChanged { from, to });
        Ok(())
    }
}
