//! Typed publish/subscribe bus for bridge observers.
//!
//! Subscribers register for every event ([`EventFilter::All`], the `*`
//! wildcard) or for one [`BridgeEventKind`]. Each subscriber owns an
//! unbounded channel, so a slow observer never stalls the session. Events
//! published from one task arrive in publish order; there is no ordering
//! guarantee between events published from different tasks.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::bridge::SessionState;
use crate::core::codec::AudioFormat;
use crate::core::translator::{ControlEvent, Side};

/// Events emitted by a bridge session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Format negotiated and session active
    Connected {
        session_id: String,
        stream_sid: String,
        format: AudioFormat,
    },
    /// Session closed; emitted once
    Disconnected { session_id: String, reason: String },
    Error {
        session_id: String,
        code: String,
        message: String,
        fatal: bool,
    },
    /// The model asked for a function call
    ToolStart {
        call_id: String,
        name: Option<String>,
        arguments: String,
    },
    /// The application returned a function result
    ToolEnd { call_id: String, output: String },
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Raw inbound telephony frame
    TelephonyMessage(Value),
    /// Raw inbound realtime event
    RealtimeMessage(Value),
    Translated(ControlEvent),
    /// Frame with no translation
    Unmapped {
        side: Side,
        event_type: String,
        raw: Value,
    },
    /// Barge-in cleared buffered audio
    Interrupted { item_id: String, audio_end_ms: u64 },
    ResponseDone { response: Value },
    TranscriptionCompleted { item_id: String, transcript: String },
}

/// Discriminant of [`BridgeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeEventKind {
    Connected,
    Disconnected,
    Error,
    ToolStart,
    ToolEnd,
    StateChanged,
    TelephonyMessage,
    RealtimeMessage,
    Translated,
    Unmapped,
    Interrupted,
    ResponseDone,
    TranscriptionCompleted,
}

impl BridgeEvent {
    pub fn kind(&self) -> BridgeEventKind {
        match self {
            Self::Connected { .. } => BridgeEventKind::Connected,
            Self::Disconnected { .. } => BridgeEventKind::Disconnected,
            Self::Error { .. } => BridgeEventKind::Error,
            Self::ToolStart { .. } => BridgeEventKind::ToolStart,
            Self::ToolEnd { .. } => BridgeEventKind::ToolEnd,
            Self::StateChanged { .. } => BridgeEventKind::StateChanged,
            Self::TelephonyMessage(_) => BridgeEventKind::TelephonyMessage,
            Self::RealtimeMessage(_) => BridgeEventKind::RealtimeMessage,
            Self::Translated(_) => BridgeEventKind::Translated,
            Self::Unmapped { .. } => BridgeEventKind::Unmapped,
            Self::Interrupted { .. } => BridgeEventKind::Interrupted,
            Self::ResponseDone { .. } => BridgeEventKind::ResponseDone,
            Self::TranscriptionCompleted { .. } => BridgeEventKind::TranscriptionCompleted,
        }
    }
}

/// Which events a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event
    All,
    Kind(BridgeEventKind),
}

impl EventFilter {
    #[inline]
    pub fn matches(&self, kind: BridgeEventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kind(k) => *k == kind,
        }
    }
}

impl From<BridgeEventKind> for EventFilter {
    fn from(kind: BridgeEventKind) -> Self {
        EventFilter::Kind(kind)
    }
}

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::UnboundedSender<Arc<BridgeEvent>>,
}

/// Cloneable handle to a session's event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, filter: impl Into<EventFilter>) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            filter: filter.into(),
            tx,
        });
        EventSubscription { rx }
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> EventSubscription {
        self.subscribe(EventFilter::All)
    }

    /// Deliver `event` to matching subscribers, pruning dropped ones.
    pub fn publish(&self, event: BridgeEvent) {
        let kind = event.kind();
        let event = Arc::new(event);
        self.subscribers.lock().retain(|sub| {
            if sub.filter.matches(kind) {
                sub.tx.send(Arc::clone(&event)).is_ok()
            } else {
                !sub.tx.is_closed()
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<Arc<BridgeEvent>>,
}

impl EventSubscription {
    /// Next event, or `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Arc<BridgeEvent>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<BridgeEvent>> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_event(code: &str) -> BridgeEvent {
        BridgeEvent::Error {
            session_id: "s1".to_string(),
            code: code.to_string(),
            message: "boom".to_string(),
            fatal: false,
        }
    }

    #[tokio::test]
    async fn test_wildcard_receives_everything_in_order() {
        let bus = EventBus::new();
        let mut all = bus.subscribe_all();

        bus.publish(error_event("a"));
        bus.publish(BridgeEvent::ToolEnd {
            call_id: "c".into(),
            output: "ok".into(),
        });
        bus.publish(error_event("b"));

        assert!(matches!(&*all.recv().await.unwrap(), BridgeEvent::Error { code, .. } if code == "a"));
        assert_eq!(all.recv().await.unwrap().kind(), BridgeEventKind::ToolEnd);
        assert!(matches!(&*all.recv().await.unwrap(), BridgeEvent::Error { code, .. } if code == "b"));
    }

    #[tokio::test]
    async fn test_kind_filter() {
        let bus = EventBus::new();
        let mut errors = bus.subscribe(BridgeEventKind::Error);
        let mut tools = bus.subscribe(EventFilter::Kind(BridgeEventKind::ToolEnd));

        bus.publish(error_event("a"));

        assert_eq!(errors.recv().await.unwrap().kind(), BridgeEventKind::Error);
        assert!(tools.try_recv().is_none());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe_all();
        let dropped = bus.subscribe(BridgeEventKind::ToolStart);
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        bus.publish(error_event("a"));
        assert_eq!(bus.subscriber_count(), 1);
        drop(keep);
    }

    #[test]
    fn test_event_serialization() {
        let value = serde_json::to_value(BridgeEvent::Interrupted {
            item_id: "item_1".into(),
            audio_end_ms: 120,
        })
        .unwrap();
        assert_eq!(value["event"], "interrupted");
        assert_eq!(value["audio_end_ms"], 120);
    }
}
