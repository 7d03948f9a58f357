//! Diagnostic bus for best-effort failures
//!
//! Storage and completion failures never interrupt the conversation flow.
//! They are logged where they happen and also published here, so operators
//! and tests can observe degradation without scraping log output.
//!
//! Subscribers get bounded channels. Publishing never waits: when a
//! subscriber's channel is full the event is dropped for that subscriber.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the diagnostic bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A conversation log could not be read or parsed
    StorageReadFailed,
    /// A conversation log could not be written
    StorageWriteFailed,
    /// A completion request failed or returned nothing
    CompletionFailed,
    /// A reply could not be delivered to the chat
    DeliveryFailed,
    /// A conversation switched modes
    ModeChanged,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the diagnostic bus
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    StorageReadFailed {
        conversation: String,
        error: String,
    },
    StorageWriteFailed {
        conversation: String,
        error: String,
    },
    CompletionFailed {
        conversation: String,
        error: String,
    },
    DeliveryFailed {
        conversation: String,
        error: String,
    },
    ModeChanged {
        conversation: String,
        from: String,
        to: String,
    },
}

impl DiagnosticEvent {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            DiagnosticEvent::StorageReadFailed { .. } => EventType::StorageReadFailed,
            DiagnosticEvent::StorageWriteFailed { .. } => EventType::StorageWriteFailed,
            DiagnosticEvent::CompletionFailed { .. } => EventType::CompletionFailed,
            DiagnosticEvent::DeliveryFailed { .. } => EventType::DeliveryFailed,
            DiagnosticEvent::ModeChanged { .. } => EventType::ModeChanged,
        }
    }

    /// Conversation the event belongs to
    pub fn conversation(&self) -> &str {
        match self {
            DiagnosticEvent::StorageReadFailed { conversation, .. }
            | DiagnosticEvent::StorageWriteFailed { conversation, .. }
            | DiagnosticEvent::CompletionFailed { conversation, .. }
            | DiagnosticEvent::DeliveryFailed { conversation, .. }
            | DiagnosticEvent::ModeChanged { conversation, .. } => conversation,
        }
    }
}

/// Pub/sub bus for diagnostic events
///
/// Cloning is cheap; all clones share the same subscriber table.
#[derive(Clone)]
pub struct DiagnosticBus {
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<DiagnosticEvent>>>>>,
}

impl DiagnosticBus {
    /// Create a new DiagnosticBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<DiagnosticEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all matching subscribers
    ///
    /// Closed subscribers are pruned on the way.
    pub async fn publish(&self, event: DiagnosticEvent) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| !tx.is_closed());
                for tx in subscribers.iter() {
                    // Full subscriber: drop rather than stall the caller
                    let _ = tx.try_send(event.clone());
                }
            }
        }
    }
}

impl Default for DiagnosticBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiagnosticBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticBus").finish_non_exhaustive()
    }
}

/// Drain every diagnostic event into structured `tracing` records.
///
/// Runs until the bus is dropped by every publisher.
pub fn spawn_diagnostic_logger(bus: &DiagnosticBus) -> tokio::task::JoinHandle<()> {
    let bus = bus.clone();
    tokio::spawn(async move {
        let mut rx = bus.subscribe(EventType::All).await;
        drop(bus);
        while let Some(event) = rx.recv().await {
            match &event {
                DiagnosticEvent::ModeChanged { conversation, from, to } => {
                    tracing::info!(
                        target: "raiden::diagnostics",
                        conversation = %conversation,
                        from = %from,
                        to = %to,
                        "mode changed"
                    );
                }
                other => {
                    tracing::warn!(
                        target: "raiden::diagnostics",
                        kind = ?other.event_type(),
                        conversation = %other.conversation(),
                        "{:?}",
                        other
                    );
                }
            }
        }
    })
}
