//! Pure patch application: `(state, patch) -> new state`.
//!
//! The applier never mutates its input, reads no clock and no randomness, so
//! a viewer that applies a patch speculatively gets byte-identical results
//! when the authoritative broadcast for the same change arrives.
//!
//! Concurrent patches from different originators only conflict when they
//! touch the same field of the same element; the resolution is
//! last-applied-wins per field. Patches touching disjoint elements commute.

use crate::patch::{ListOp, Merge, Predicate, WorldPatch};
use crate::world::World;

/// Apply a patch to a world, returning the next state.
///
/// The input is treated as a frozen snapshot; callers may keep references to
/// it and observe it unchanged. Scalar fields present on the patch replace
/// the state's; collection fields delegate to [`ListOp::apply`].
pub fn apply(state: &World, patch: &WorldPatch) -> World {
    let mut next = state.clone();
    if let Some(name) = &patch.name {
        next.name = name.clone();
    }
    if let Some(op) = &patch.characters {
        next.characters = op.apply(&next.characters);
    }
    if let Some(op) = &patch.clocks {
        next.clocks = op.apply(&next.clocks);
    }
    next
}

impl<T, P> ListOp<T, P>
where
    T: Clone,
    P: Predicate<T> + Merge<T>,
{
    /// Apply this operation to a collection, returning the next collection.
    ///
    /// A predicate matching nothing is a no-op; one matching several
    /// elements (discouraged by the id-uniqueness invariant, not prevented)
    /// affects every match.
    pub fn apply(&self, items: &[T]) -> Vec<T> {
        match self {
            Self::Append(added) => {
                let mut next = items.to_vec();
                next.extend(added.iter().cloned());
                next
            }
            Self::RemoveWhere(predicate) => items
                .iter()
                .filter(|item| !predicate.matches(item))
                .cloned()
                .collect(),
            Self::MergeWhere(spec) => items
                .iter()
                .map(|item| {
                    let mut item = item.clone();
                    if spec.filter.matches(&item) {
                        spec.properties.merge_into(&mut item);
                    }
                    item
                })
                .collect(),
        }
    }
}
