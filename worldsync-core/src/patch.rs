//! Sparse patch grammar for partial world updates.
//!
//! Wire shape (JSON):
//!
//! ```text
//! WorldPatch  = { name?, characters?: ListOp, clocks?: ListOp }
//! ListOp<T>   = { "$append":      [T] }
//!             | { "$removeWhere": Partial<T> }
//!             | { "$mergeWhere":  { "match": Partial<T>, "properties": Partial<T> } }
//! ```
//!
//! Patches are sparse: a field that is absent leaves the state untouched.
//! Predicates are structural equality-match objects, not functions, so they
//! cross the serialization boundary unchanged and are evaluated against the
//! state as it is at apply time, not as it was when the patch was built.
//!
//! Decoding is strict: an unrecognized operator or field rejects the whole
//! payload ([`PatchError::Malformed`]) rather than applying a
//! partially-understood mutation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::world::{Character, Clock};

/// A partial update to one world.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct WorldPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters: Option<ListOp<Character, CharacterPatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clocks: Option<ListOp<Clock, ClockPatch>>,
}

impl WorldPatch {
    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<Vec<u8>, PatchError> {
        serde_json::to_vec(self).map_err(|e| PatchError::Encode(e.to_string()))
    }

    /// Deserialize from the JSON wire format.
    ///
    /// Fails on anything outside the grammar; callers treat a failure as
    /// "drop the whole patch", never as a partial application.
    pub fn decode(bytes: &[u8]) -> Result<Self, PatchError> {
        serde_json::from_slice(bytes).map_err(|e| PatchError::Malformed(e.to_string()))
    }
}

/// One operation on an ordered collection.
///
/// `T` is the element type, `P` its all-optional partial used both as a
/// predicate and as a merge payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListOp<T, P> {
    /// Add elements at the end. Deliberately not idempotent: appending the
    /// same element twice yields two copies. There is no insert-at-index.
    #[serde(rename = "$append")]
    Append(Vec<T>),
    /// Drop every element the predicate matches. Zero matches is a no-op.
    #[serde(rename = "$removeWhere")]
    RemoveWhere(P),
    /// Shallow-merge `properties` into every element `match` matches.
    #[serde(rename = "$mergeWhere")]
    MergeWhere(MergeSpec<P>),
}

/// Payload of a `$mergeWhere` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeSpec<P> {
    /// Structural predicate: every present field must be equal.
    #[serde(rename = "match")]
    pub filter: P,
    /// Fields to overwrite on each match. Identifiers are never overwritten.
    pub properties: P,
}

/// Structural equality match against a candidate element.
pub trait Predicate<T> {
    /// True when every field present on the predicate equals the
    /// candidate's. An empty predicate matches everything.
    fn matches(&self, candidate: &T) -> bool;
}

/// Shallow merge of present fields into a target element.
pub trait Merge<T> {
    /// Overwrite the target's fields with the ones present here. The
    /// target's id is left alone even when the partial carries one.
    fn merge_into(&self, target: &mut T);
}

/// All-optional partial of [`Character`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CharacterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

impl CharacterPatch {
    /// Predicate matching a single character by id.
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}

impl Predicate<Character> for CharacterPatch {
    fn matches(&self, candidate: &Character) -> bool {
        self.id.map_or(true, |id| id == candidate.id)
            && self.name.as_ref().map_or(true, |v| *v == candidate.name)
            && self
                .condition
                .as_ref()
                .map_or(true, |v| *v == candidate.condition)
            && self
                .image_url
                .as_ref()
                .map_or(true, |v| *v == candidate.image_url)
            && self.stress.map_or(true, |v| v == candidate.stress)
            && self.hidden.map_or(true, |v| v == candidate.hidden)
    }
}

impl Merge<Character> for CharacterPatch {
    fn merge_into(&self, target: &mut Character) {
        if let Some(name) = &self.name {
            target.name = name.clone();
        }
        if let Some(condition) = &self.condition {
            target.condition = condition.clone();
        }
        if let Some(image_url) = &self.image_url {
            target.image_url = image_url.clone();
        }
        if let Some(stress) = self.stress {
            target.stress = stress;
        }
        if let Some(hidden) = self.hidden {
            target.hidden = hidden;
        }
    }
}

/// All-optional partial of [`Clock`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ClockPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_progress: Option<u32>,
}

impl ClockPatch {
    /// Predicate matching a single clock by id.
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}

impl Predicate<Clock> for ClockPatch {
    fn matches(&self, candidate: &Clock) -> bool {
        self.id.map_or(true, |id| id == candidate.id)
            && self.name.as_ref().map_or(true, |v| *v == candidate.name)
            && self.progress.map_or(true, |v| v == candidate.progress)
            && self
                .max_progress
                .map_or(true, |v| v == candidate.max_progress)
    }
}

impl Merge<Clock> for ClockPatch {
    fn merge_into(&self, target: &mut Clock) {
        if let Some(name) = &self.name {
            target.name = name.clone();
        }
        if let Some(progress) = self.progress {
            target.progress = progress;
        }
        if let Some(max_progress) = self.max_progress {
            target.max_progress = max_progress;
        }
    }
}

/// Patch grammar errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    /// The payload is not a grammar-valid patch (bad JSON, unknown operator,
    /// unknown field). The whole patch must be discarded.
    Malformed(String),
    Encode(String),
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "Malformed patch: {e}"),
            Self::Encode(e) => write!(f, "Patch encode error: {e}"),
        }
    }
}

impl std::error::Error for PatchError {}
