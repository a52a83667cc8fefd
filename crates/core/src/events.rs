use std::sync::Arc;

use hotprompt_llm::TokenUsage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ids::CorrelationId;

/// Event delivered from the dispatcher to the consuming side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk {
        correlation_id: CorrelationId,
        text: String,
    },
    Usage {
        correlation_id: CorrelationId,
        #[serde(flatten)]
        usage: TokenUsage,
    },
    Error {
        correlation_id: CorrelationId,
        message: String,
    },
    End {
        correlation_id: CorrelationId,
        finish_reason: String,
    },
}

impl StreamEvent {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::Chunk { correlation_id, .. }
            | Self::Usage { correlation_id, .. }
            | Self::Error { correlation_id, .. }
            | Self::End { correlation_id, .. } => *correlation_id,
        }
    }

    /// Returns true for `Error` and `End`, after which the id is silent.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::End { .. })
    }
}

/// Producer side of the single-subscriber event channel.
///
/// Sends never fail: with no subscriber, or a subscriber that went away,
/// events are dropped.
#[derive(Clone, Default)]
pub struct EventSink {
    subscriber: Arc<Mutex<Option<mpsc::UnboundedSender<StreamEvent>>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new subscriber, detaching any previous one.
    pub fn subscribe(&self) -> EventSubscription {
        let (event_tx, events) = mpsc::unbounded_channel();
        if self.subscriber.lock().replace(event_tx).is_some() {
            tracing::debug!("replacing existing stream event subscriber");
        }
        EventSubscription {
            events,
            sink: self.clone(),
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber
            .lock()
            .as_ref()
            .is_some_and(|event_tx| !event_tx.is_closed())
    }

    pub fn send(&self, event: StreamEvent) {
        let mut subscriber = self.subscriber.lock();
        let Some(event_tx) = subscriber.as_ref() else {
            tracing::trace!(correlation_id = %event.correlation_id(), "no subscriber; dropping event");
            return;
        };

        if event_tx.send(event).is_err() {
            tracing::debug!("stream event subscriber went away; detaching");
            *subscriber = None;
        }
    }

    fn detach_closed(&self) {
        let mut subscriber = self.subscriber.lock();
        if subscriber
            .as_ref()
            .is_some_and(|event_tx| event_tx.is_closed())
        {
            *subscriber = None;
        }
    }
}

/// Consumer side of the event channel. Dropping it unsubscribes.
pub struct EventSubscription {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    sink: EventSink,
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.events.close();
        self.sink.detach_closed();
    }
}
