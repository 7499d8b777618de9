//! Message Bus for session events
//!
//! The MessageBus lets observers (the CLI, persistence, tests) follow a
//! planning session without the orchestrator knowing about them. It uses
//! bounded channels and supports both specific event subscriptions and a
//! global "All" subscription.
//!
//! Publishing never waits: when a subscriber's channel is full the event is
//! dropped for that subscriber only.

use crate::orchestrator::SessionStage;
use sdk::errors::FailureReason;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    SessionStarted,
    StateChanged,
    StageAttemptFailed,
    StageDegraded,
    PlanCompiled,
    SessionFailed,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionStarted {
        session_id: Uuid,
    },
    StateChanged {
        session_id: Uuid,
        from: SessionStage,
        to: SessionStage,
    },
    /// One attempt of a stage failed or timed out
    StageAttemptFailed {
        session_id: Uuid,
        stage: String,
        attempt: u32,
        error: String,
    },
    /// A stage exhausted its retries and the session continued without it
    StageDegraded {
        session_id: Uuid,
        stage: String,
    },
    PlanCompiled {
        session_id: Uuid,
        days: usize,
        dropped: usize,
        warnings: usize,
    },
    SessionFailed {
        session_id: Uuid,
        reason: FailureReason,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::SessionStarted { .. } => EventType::SessionStarted,
            Event::StateChanged { .. } => EventType::StateChanged,
            Event::StageAttemptFailed { .. } => EventType::StageAttemptFailed,
            Event::StageDegraded { .. } => EventType::StageDegraded,
            Event::PlanCompiled { .. } => EventType::PlanCompiled,
            Event::SessionFailed { .. } => EventType::SessionFailed,
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            Event::SessionStarted { session_id }
            | Event::StateChanged { session_id, .. }
            | Event::StageAttemptFailed { session_id, .. }
            | Event::StageDegraded { session_id, .. }
            | Event::PlanCompiled { session_id, .. }
            | Event::SessionFailed { session_id, .. } => *session_id,
        }
    }
}

/// Message bus for pub/sub communication
pub struct MessageBus {
    /// Each subscriber gets a bounded channel with CHANNEL_BUFFER_SIZE capacity
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to its type's subscribers and to "All" subscribers.
    ///
    /// Closed subscribers are pruned. Full channels miss the event.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => true,
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Number of live subscribers across all event types
    pub async fn subscriber_count(&self) -> usize {
        self.channels.lock().await.values().map(Vec::len).sum()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
