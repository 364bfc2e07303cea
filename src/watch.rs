//! Change notifications for local observers of the store.
//!
//! Every mutation (local `put_*`/`remove`, or an edit applied from the table)
//! is broadcast as a [`WatchEvent`]. Subscribers filter by key pattern.

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;

/// What happened to a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// First put of a key.
    Created,
    /// Put over an existing value.
    Updated,
    /// Local remove or remote sentinel.
    Removed,
}

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// A caller of this process.
    Local,
    /// An edit received through the live table.
    Remote,
}

/// One change to the preference store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub key: String,
    pub event_type: EventType,
    /// Previous canonical text (for updates and removals).
    pub old_value: Option<String>,
    /// New canonical text (for creates and updates).
    pub new_value: Option<String>,
    pub origin: Origin,
}

impl WatchEvent {
    /// Event for a put, choosing Created or Updated from the previous value.
    pub fn put(
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: impl Into<String>,
        origin: Origin,
    ) -> Self {
        let event_type = if old_value.is_some() {
            EventType::Updated
        } else {
            EventType::Created
        };
        Self {
            key: key.into(),
            event_type,
            old_value,
            new_value: Some(new_value.into()),
            origin,
        }
    }

    /// Event for a removal.
    pub fn removed(key: impl Into<String>, old_value: String, origin: Origin) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Removed,
            old_value: Some(old_value),
            new_value: None,
            origin,
        }
    }
}

/// Changes to the keys matching one pattern.
pub struct WatchStream {
    inner: BroadcastStream<WatchEvent>,
    pattern: String,
}

impl WatchStream {
    pub fn new(receiver: broadcast::Receiver<WatchEvent>, pattern: impl Into<String>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// `prefix*` matches by prefix; anything else must match exactly.
    fn matches(&self, key: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == self.pattern,
        }
    }
}

impl Stream for WatchStream {
    type Item = WatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if self.matches(&event.key) {
                        return Poll::Ready(Some(event));
                    }
                }
                // Lagged: the missed events are gone
                Poll::Ready(Some(Err(_))) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Broadcasts store changes to every [`WatchStream`].
#[derive(Clone)]
pub struct WatchSender {
    sender: broadcast::Sender<WatchEvent>,
}

impl WatchSender {
    /// `capacity` bounds how far a slow subscriber may lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: WatchEvent) {
        // Nobody watching is fine
        let _ = self.sender.send(event);
    }

    /// Stream the changes to keys matching `pattern`.
    pub fn subscribe(&self, pattern: impl Into<String>) -> WatchStream {
        WatchStream::new(self.sender.subscribe(), pattern)
    }

    /// Open streams.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WatchSender {
    fn default() -> Self {
        Self::new(1024)
    }
}
