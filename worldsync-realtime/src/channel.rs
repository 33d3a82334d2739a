//! Per-world broadcast scope.
//!
//! Every viewer of one world shares a single scope derived from the world
//! id; the only event on it is `"patch"`. Broadcasting is fire-and-forget:
//! by the time a patch is sent the durable write already succeeded, so a
//! notification failure is logged and swallowed, never propagated, and the
//! write is never rolled back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use worldsync_core::WorldPatch;

use crate::transport::{PubSub, Subscription, TransportError};

/// The only event name carried on a world scope.
pub const PATCH_EVENT: &str = "patch";

/// Deterministic scope for a world: every viewer of the same world derives
/// the same scope.
pub fn world_scope(world_id: Uuid) -> String {
    format!("world-{world_id}")
}

/// Channel health counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelStats {
    pub patches_sent: u64,
    pub publish_failures: u64,
    pub malformed_dropped: u64,
}

/// Lock-free counters shared by every clone of a channel.
struct AtomicChannelStats {
    patches_sent: AtomicU64,
    publish_failures: AtomicU64,
    malformed_dropped: AtomicU64,
}

impl AtomicChannelStats {
    fn new() -> Self {
        Self {
            patches_sent: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
        }
    }
}

/// Broadcast/subscribe handle scoped to one world.
#[derive(Clone)]
pub struct WorldChannel {
    scope: String,
    transport: Arc<dyn PubSub>,
    stats: Arc<AtomicChannelStats>,
}

impl WorldChannel {
    pub fn new(transport: Arc<dyn PubSub>, world_id: Uuid) -> Self {
        Self {
            scope: world_scope(world_id),
            transport,
            stats: Arc::new(AtomicChannelStats::new()),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Broadcast a patch to every subscriber of this world.
    ///
    /// Fire-and-forget: encode or publish failures are logged and swallowed.
    pub fn broadcast(&self, patch: &WorldPatch) {
        let payload = match patch.encode() {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                log::error!("failed to encode patch for {}: {e}", self.scope);
                return;
            }
        };

        match self.transport.publish(&self.scope, PATCH_EVENT, &payload) {
            Ok(receivers) => {
                self.stats.patches_sent.fetch_add(1, Ordering::Relaxed);
                log::debug!("patch broadcast on {} reached {receivers} viewers", self.scope);
            }
            Err(e) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                log::error!("patch broadcast on {} failed: {e}", self.scope);
            }
        }
    }

    /// Register a patch listener for the life of the returned handle.
    ///
    /// Safe to call repeatedly; each call registers an independent listener.
    /// Malformed payloads are logged and skipped without ending the
    /// subscription, so one bad sender cannot halt other patches.
    pub fn subscribe<F>(&self, mut on_patch: F) -> Result<Subscription, TransportError>
    where
        F: FnMut(WorldPatch) + Send + 'static,
    {
        let scope = self.scope.clone();
        let stats = self.stats.clone();
        self.transport.subscribe(
            &self.scope,
            PATCH_EVENT,
            Box::new(move |payload| match WorldPatch::decode(payload) {
                Ok(patch) => on_patch(patch),
                Err(e) => {
                    stats.malformed_dropped.fetch_add(1, Ordering::Relaxed);
                    log::warn!("ignoring malformed patch on {scope}: {e}");
                }
            }),
        )
    }

    /// Snapshot of the channel counters.
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            patches_sent: self.stats.patches_sent.load(Ordering::Relaxed),
            publish_failures: self.stats.publish_failures.load(Ordering::Relaxed),
            malformed_dropped: self.stats.malformed_dropped.load(Ordering::Relaxed),
        }
    }
}
