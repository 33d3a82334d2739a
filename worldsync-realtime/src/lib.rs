//! # worldsync-realtime — Per-world broadcast and client reconciliation
//!
//! Keeps every connected viewer of one world consistent in near-real-time.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  durable write   ┌──────────────┐
//! │ Originator │ ───────────────► │ Repository   │  (system of record)
//! │            │                  └──────────────┘
//! │            │  then broadcast
//! │            │ ───────────────► scope "world-{id}", event "patch"
//! └────────────┘                        │
//!                          ┌────────────┴────────────┐
//!                          ▼                         ▼
//!                   ┌─────────────┐           ┌─────────────┐
//!                   │ WorldStore  │           │ WorldStore  │
//!                   │ baseline =  │           │ baseline =  │
//!                   │ apply(b, p) │           │ apply(b, p) │
//!                   └──────┬──────┘           └─────────────┘
//!                          │ view() = overlay(baseline, pending)
//!                          ▼
//! ```
//!
//! ## Modules
//!
//! - [`transport`] — pub/sub seam plus an in-process [`transport::LocalTransport`]
//! - [`channel`] — per-world scope: fire-and-forget broadcast, decoding subscribe
//! - [`store`] — client reconciliation: folded baseline + optimistic overlay
//! - [`mutations`] — originator (write durably, then broadcast) and its
//!   explicit handler table
//!
//! The state flows one way into each store (baseline, then broadcast folds,
//! then overlay on read) and one way out through the originator; viewers
//! never talk to each other directly.

pub mod channel;
pub mod mutations;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use channel::{world_scope, ChannelStats, WorldChannel, PATCH_EVENT};
pub use mutations::{
    default_handlers, HandlerTable, InMemoryRepository, MutationError, Originator,
    WorldRepository,
};
pub use store::{NoPending, PendingMutations, SubmissionTracker, WorldStore};
pub use transport::{LocalTransport, PubSub, Subscription, TransportError};
