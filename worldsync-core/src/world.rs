//! World records: one shared document per world id, holding named ordered
//! collections of characters and clocks.
//!
//! Wire field names are camelCase to match the JSON the originator and the
//! viewers exchange.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The shared document scoped by one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct World {
    pub id: Uuid,
    pub name: String,
    pub characters: Vec<Character>,
    pub clocks: Vec<Clock>,
}

impl World {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            characters: Vec::new(),
            clocks: Vec::new(),
        }
    }

    /// Look up a character by id.
    pub fn character(&self, id: Uuid) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Look up a clock by id.
    pub fn clock(&self, id: Uuid) -> Option<&Clock> {
        self.clocks.iter().find(|c| c.id == id)
    }
}

/// A playable character in a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: Uuid,
    pub name: String,
    /// Free-form condition text ("poisoned", "hidden in the rafters", ...)
    pub condition: String,
    /// Portrait URL; empty when unset
    pub image_url: String,
    pub stress: u32,
    /// Hidden characters are only visible to world owners
    pub hidden: bool,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            condition: String::new(),
            image_url: String::new(),
            stress: 0,
            hidden: false,
        }
    }
}

/// A progress clock tracking the advance of world forces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clock {
    pub id: Uuid,
    pub name: String,
    pub progress: u32,
    pub max_progress: u32,
}

impl Clock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            progress: 0,
            max_progress: 4,
        }
    }
}
