//! # worldsync-core — World model and patch engine
//!
//! Pure data layer for keeping multiple viewers of a shared world consistent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   WorldPatch (JSON)   ┌──────────────┐
//! │ Originator   │ ────────────────────► │ Viewer       │
//! │ (writes DB,  │    per-world scope    │ baseline =   │
//! │  broadcasts) │                       │ apply(b, p)  │
//! └──────────────┘                       └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`world`] — `World`, `Character`, `Clock` records
//! - [`patch`] — sparse patch grammar (`$append` / `$removeWhere` / `$mergeWhere`)
//! - [`apply`] — pure reducer: `(state, patch) -> new state`
//!
//! The grammar is purely declarative: predicates are structural
//! equality-match objects, never functions, so a patch round-trips through
//! its JSON serialization without losing which operator was used.

pub mod apply;
pub mod patch;
pub mod world;

// Re-exports for convenience
pub use apply::apply;
pub use patch::{
    CharacterPatch, ClockPatch, ListOp, Merge, MergeSpec, PatchError, Predicate, WorldPatch,
};
pub use world::{Character, Clock, World};
