//! Client-side reconciliation store.
//!
//! One store per mounted view. The committed layer (`baseline`) starts from
//! the snapshot the view boundary supplied and evolves only by folding
//! authoritative broadcast patches, sequentially, inside the transport's
//! notification callback. The optimistic layer is computed fresh on every
//! read: in-flight local mutations from an external [`PendingMutations`]
//! registry are shallow-overlaid on their entities, so the viewer sees its
//! own edit before the server confirms it. Once the authoritative broadcast
//! folds in and the tracker drops the pending entry, the overlay stops
//! applying on its own; there is no explicit "this edit is now confirmed"
//! reconciliation step, which is what keeps the displayed value stable
//! across confirmation.
//!
//! Concurrent edits to the same field resolve last-applied-wins; whether
//! that is enough beyond small-group use is an open protocol question, not
//! something this store detects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

use worldsync_core::{apply, CharacterPatch, ClockPatch, Merge, World};

use crate::channel::WorldChannel;

/// Read-only registry of in-flight local mutations, keyed by entity id.
///
/// Owned by the view boundary's submission tracking, not by the store; the
/// store only asks "what fields are in flight for this entity".
pub trait PendingMutations: Send + Sync {
    fn character(&self, id: Uuid) -> Option<CharacterPatch>;
    fn clock(&self, id: Uuid) -> Option<ClockPatch>;
}

/// Registry with nothing in flight, for viewers that never mutate.
pub struct NoPending;

impl PendingMutations for NoPending {
    fn character(&self, _id: Uuid) -> Option<CharacterPatch> {
        None
    }

    fn clock(&self, _id: Uuid) -> Option<ClockPatch> {
        None
    }
}

/// Simple submission tracker for embedders and tests.
///
/// `begin_*` records an in-flight mutation; `complete_*` removes it once the
/// authoritative broadcast has been folded.
#[derive(Default)]
pub struct SubmissionTracker {
    characters: RwLock<HashMap<Uuid, CharacterPatch>>,
    clocks: RwLock<HashMap<Uuid, ClockPatch>>,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_character(&self, id: Uuid, data: CharacterPatch) {
        self.characters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, data);
    }

    pub fn complete_character(&self, id: Uuid) {
        self.characters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    pub fn begin_clock(&self, id: Uuid, data: ClockPatch) {
        self.clocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, data);
    }

    pub fn complete_clock(&self, id: Uuid) {
        self.clocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

impl PendingMutations for SubmissionTracker {
    fn character(&self, id: Uuid) -> Option<CharacterPatch> {
        self.characters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn clock(&self, id: Uuid) -> Option<ClockPatch> {
        self.clocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

/// Per-view reconciliation store: committed baseline + overlay on read.
pub struct WorldStore {
    baseline: Arc<Mutex<World>>,
    channel: WorldChannel,
    pending: Arc<dyn PendingMutations>,
    subscription: Mutex<Option<crate::transport::Subscription>>,
}

impl WorldStore {
    /// Mount a view: take the baseline snapshot and go live.
    ///
    /// If the subscription cannot be established the store stays mounted but
    /// stale ([`is_live`](Self::is_live) is false) and no patches fold; call
    /// [`resubscribe`](Self::resubscribe) when the transport signals a
    /// connection. There is no internal retry loop.
    pub fn mount(
        channel: WorldChannel,
        baseline: World,
        pending: Arc<dyn PendingMutations>,
    ) -> Arc<Self> {
        let store = Arc::new(Self {
            baseline: Arc::new(Mutex::new(baseline)),
            channel,
            pending,
            subscription: Mutex::new(None),
        });
        store.resubscribe();
        store
    }

    /// (Re-)establish the live subscription. Idempotent: a no-op while a
    /// subscription is already active. Returns whether the store is live.
    pub fn resubscribe(&self) -> bool {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return true;
        }

        let baseline = Arc::clone(&self.baseline);
        match self.channel.subscribe(move |patch| {
            // Sequential fold inside the notification callback; one bad
            // patch was already rejected at decode, so apply is total here.
            let mut committed = baseline.lock().unwrap_or_else(PoisonError::into_inner);
            *committed = apply(&committed, &patch);
        }) {
            Ok(subscription) => {
                *slot = Some(subscription);
                true
            }
            Err(e) => {
                log::warn!(
                    "subscribe failed on {}, view is stale until reconnect: {e}",
                    self.channel.scope()
                );
                false
            }
        }
    }

    /// Whether broadcast patches are currently folding into the baseline.
    pub fn is_live(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Snapshot of the committed layer, without the optimistic overlay.
    pub fn baseline(&self) -> World {
        self.baseline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The displayed state: overlay(baseline, pending), computed on read and
    /// never stored.
    pub fn view(&self) -> World {
        let mut world = self.baseline();
        for character in &mut world.characters {
            if let Some(in_flight) = self.pending.character(character.id) {
                in_flight.merge_into(character);
            }
        }
        for clock in &mut world.clocks {
            if let Some(in_flight) = self.pending.clock(clock.id) {
                in_flight.merge_into(clock);
            }
        }
        world
    }

    /// Tear down the subscription; the store's copy is discarded with it.
    pub fn unmount(&self) {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
