use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::info;

/// Sink for human-readable events. Shared across tasks.
pub trait EventRecorder: Send + Sync {
    fn record(&self, source: &str, message: &str);
}

/// A single recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub message: String,
}

/// In-memory event log with monotonic sequence numbers.
/// Keeps the most recent events and fans new ones out to subscribers.
pub struct EventBroadcaster {
    inner: Mutex<EventLogInner>,
    sender: broadcast::Sender<Event>,
}

struct EventLogInner {
    seq: u64,
    events: VecDeque<Event>,
    max_events: usize,
}

impl EventBroadcaster {
    /// Create a new broadcaster keeping at most `max_events` recent events.
    pub fn new(max_events: usize) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(max_events),
                max_events,
            }),
            sender,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EventLogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_seq(&self) -> u64 {
        self.lock().seq
    }

    /// Get all retained events after the given sequence number.
    pub fn events_since(&self, from_seq: u64) -> Vec<Event> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.seq > from_seq)
            .cloned()
            .collect()
    }

    /// Subscribe to receive new events as they are recorded.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventRecorder for EventBroadcaster {
    fn record(&self, source: &str, message: &str) {
        info!(source = %source, "Event: {}", message);
        let event = {
            let mut inner = self.lock();
            inner.seq += 1;
            let event = Event {
                seq: inner.seq,
                timestamp: Utc::now(),
                source: source.to_string(),
                message: message.to_string(),
            };
            if inner.events.len() >= inner.max_events {
                inner.events.pop_front();
            }
            inner.events.push_back(event.clone());
            event
        };
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}
