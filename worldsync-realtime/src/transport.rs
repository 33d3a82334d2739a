//! Pub/sub transport seam and an in-process implementation.
//!
//! The concrete network transport lives outside this crate; everything here
//! talks to it through [`PubSub`]. [`LocalTransport`] is the in-process
//! implementation used by tests and single-host embeddings: one tokio
//! broadcast channel per scope, one dispatch task per subscription, so each
//! subscriber sees one publisher's events in send order but gets no
//! cross-publisher ordering guarantee.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// Default per-scope channel capacity (events buffered per subscriber).
pub const DEFAULT_CAPACITY: usize = 256;

/// A named event published on one scope.
#[derive(Debug, Clone)]
pub struct ScopedEvent {
    pub name: String,
    pub payload: Vec<u8>,
}

/// Callback invoked for each event delivered to a subscription.
pub type EventCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Transport errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No live connection; callers retry on the transport's reconnect
    /// signal, not in a loop of their own.
    Disconnected,
    Publish(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Transport disconnected"),
            Self::Publish(e) => write!(f, "Publish failed: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Publish/subscribe scoped by an opaque scope name.
pub trait PubSub: Send + Sync {
    /// Publish one event. Returns the number of subscribers it reached
    /// (the delivery status); zero is not an error.
    fn publish(&self, scope: &str, event: &str, payload: &[u8]) -> Result<usize, TransportError>;

    /// Register a listener for the life of the returned handle. The
    /// callback runs sequentially per subscription, one event at a time.
    fn subscribe(
        &self,
        scope: &str,
        event: &str,
        callback: EventCallback,
    ) -> Result<Subscription, TransportError>;
}

/// Teardown handle for one subscription.
///
/// Dropping it stops future callbacks immediately; an event already in
/// flight at that moment may or may not still be delivered.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Tear down explicitly; equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// In-process pub/sub: one broadcast channel per scope.
///
/// The connected flag stands in for the transport's own connection state so
/// embedders and tests can exercise the subscribe-failure and reconnect
/// paths without a network.
pub struct LocalTransport {
    scopes: RwLock<HashMap<String, broadcast::Sender<ScopedEvent>>>,
    capacity: usize,
    connected: AtomicBool,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how many events a lagging subscriber may buffer
    /// before it starts dropping them.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
            capacity,
            connected: AtomicBool::new(true),
        }
    }

    /// Flip the simulated connection state. Subscribers established while
    /// connected keep running; new publishes and subscribes fail while down.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of scopes that have seen traffic.
    pub fn scope_count(&self) -> usize {
        self.scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn sender_for(&self, scope: &str) -> broadcast::Sender<ScopedEvent> {
        // Fast path: read lock
        {
            let scopes = self.scopes.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = scopes.get(scope) {
                return sender.clone();
            }
        }

        // Slow path: write lock to create, double-checked
        let mut scopes = self.scopes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = scopes.get(scope) {
            return sender.clone();
        }
        let (sender, _) = broadcast::channel(self.capacity);
        scopes.insert(scope.to_string(), sender.clone());
        sender
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub for LocalTransport {
    fn publish(&self, scope: &str, event: &str, payload: &[u8]) -> Result<usize, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let sender = self.sender_for(scope);
        let event = ScopedEvent {
            name: event.to_string(),
            payload: payload.to_vec(),
        };
        // No subscribers is a valid delivery status, not a failure.
        Ok(sender.send(event).unwrap_or(0))
    }

    fn subscribe(
        &self,
        scope: &str,
        event: &str,
        mut callback: EventCallback,
    ) -> Result<Subscription, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let mut rx = self.sender_for(scope).subscribe();
        let scope = scope.to_string();
        let event = event.to_string();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(delivered) => {
                        if delivered.name == event {
                            callback(&delivered.payload);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("subscriber on {scope} lagged, dropped {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(move || handle.abort()))
    }
}
