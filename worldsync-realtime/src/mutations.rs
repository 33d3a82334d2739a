//! Mutation origination: validate, write durably, then broadcast.
//!
//! The durable store is the system of record; the channel only carries
//! notifications. Every operation here awaits its repository write before
//! anything is broadcast, and a failed write is fatal to that single
//! request, reported to its caller, never broadcast. A failed broadcast
//! after a successful write is logged and swallowed by the channel.
//!
//! Dispatch goes through an explicit [`HandlerTable`] built at startup and
//! passed by reference to whatever routes requests; there is no
//! process-global handler registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use worldsync_core::{
    Character, CharacterPatch, Clock, ClockPatch, ListOp, Merge, MergeSpec, World, WorldPatch,
};

use crate::channel::WorldChannel;
use crate::transport::PubSub;

/// Errors fatal to a single mutation request.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationError {
    NotFound,
    Forbidden,
    Storage(String),
    BadInput(String),
    UnknownAction(String),
}

impl std::fmt::Display for MutationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Record not found"),
            Self::Forbidden => write!(f, "Not allowed to modify this record"),
            Self::Storage(e) => write!(f, "Storage error: {e}"),
            Self::BadInput(e) => write!(f, "Bad input: {e}"),
            Self::UnknownAction(name) => write!(f, "No action named {name}"),
        }
    }
}

impl std::error::Error for MutationError {}

/// Durable store seam. Implementations may also enforce ownership and
/// return [`MutationError::Forbidden`].
///
/// Update and delete return the owning world's id so the originator knows
/// which scope to notify.
pub trait WorldRepository: Send + Sync {
    fn world(&self, world_id: Uuid) -> Result<World, MutationError>;
    fn rename_world(&self, world_id: Uuid, name: &str) -> Result<(), MutationError>;

    fn insert_character(&self, world_id: Uuid, character: &Character)
        -> Result<(), MutationError>;
    fn update_character(
        &self,
        character_id: Uuid,
        data: &CharacterPatch,
    ) -> Result<Uuid, MutationError>;
    fn delete_character(&self, character_id: Uuid) -> Result<Uuid, MutationError>;

    fn insert_clock(&self, world_id: Uuid, clock: &Clock) -> Result<(), MutationError>;
    fn update_clock(&self, clock_id: Uuid, data: &ClockPatch) -> Result<Uuid, MutationError>;
    fn delete_clock(&self, clock_id: Uuid) -> Result<Uuid, MutationError>;
}

/// In-memory repository for tests and single-host embeddings.
#[derive(Default)]
pub struct InMemoryRepository {
    worlds: RwLock<HashMap<Uuid, World>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_world(&self, world: World) {
        self.worlds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(world.id, world);
    }

    fn with_worlds<R>(
        &self,
        f: impl FnOnce(&mut HashMap<Uuid, World>) -> Result<R, MutationError>,
    ) -> Result<R, MutationError> {
        let mut worlds = self.worlds.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut worlds)
    }
}

impl WorldRepository for InMemoryRepository {
    fn world(&self, world_id: Uuid) -> Result<World, MutationError> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&world_id)
            .cloned()
            .ok_or(MutationError::NotFound)
    }

    fn rename_world(&self, world_id: Uuid, name: &str) -> Result<(), MutationError> {
        self.with_worlds(|worlds| {
            let world = worlds.get_mut(&world_id).ok_or(MutationError::NotFound)?;
            world.name = name.to_string();
            Ok(())
        })
    }

    fn insert_character(
        &self,
        world_id: Uuid,
        character: &Character,
    ) -> Result<(), MutationError> {
        self.with_worlds(|worlds| {
            let world = worlds.get_mut(&world_id).ok_or(MutationError::NotFound)?;
            world.characters.push(character.clone());
            Ok(())
        })
    }

    fn update_character(
        &self,
        character_id: Uuid,
        data: &CharacterPatch,
    ) -> Result<Uuid, MutationError> {
        self.with_worlds(|worlds| {
            for world in worlds.values_mut() {
                if let Some(character) =
                    world.characters.iter_mut().find(|c| c.id == character_id)
                {
                    data.merge_into(character);
                    return Ok(world.id);
                }
            }
            Err(MutationError::NotFound)
        })
    }

    fn delete_character(&self, character_id: Uuid) -> Result<Uuid, MutationError> {
        self.with_worlds(|worlds| {
            for world in worlds.values_mut() {
                let before = world.characters.len();
                world.characters.retain(|c| c.id != character_id);
                if world.characters.len() != before {
                    return Ok(world.id);
                }
            }
            Err(MutationError::NotFound)
        })
    }

    fn insert_clock(&self, world_id: Uuid, clock: &Clock) -> Result<(), MutationError> {
        self.with_worlds(|worlds| {
            let world = worlds.get_mut(&world_id).ok_or(MutationError::NotFound)?;
            world.clocks.push(clock.clone());
            Ok(())
        })
    }

    fn update_clock(&self, clock_id: Uuid, data: &ClockPatch) -> Result<Uuid, MutationError> {
        self.with_worlds(|worlds| {
            for world in worlds.values_mut() {
                if let Some(clock) = world.clocks.iter_mut().find(|c| c.id == clock_id) {
                    data.merge_into(clock);
                    return Ok(world.id);
                }
            }
            Err(MutationError::NotFound)
        })
    }

    fn delete_clock(&self, clock_id: Uuid) -> Result<Uuid, MutationError> {
        self.with_worlds(|worlds| {
            for world in worlds.values_mut() {
                let before = world.clocks.len();
                world.clocks.retain(|c| c.id != clock_id);
                if world.clocks.len() != before {
                    return Ok(world.id);
                }
            }
            Err(MutationError::NotFound)
        })
    }
}

/// The mutation originator: one per process, shared by every request.
pub struct Originator {
    repository: Arc<dyn WorldRepository>,
    transport: Arc<dyn PubSub>,
}

impl Originator {
    pub fn new(repository: Arc<dyn WorldRepository>, transport: Arc<dyn PubSub>) -> Self {
        Self {
            repository,
            transport,
        }
    }

    fn channel(&self, world_id: Uuid) -> WorldChannel {
        WorldChannel::new(self.transport.clone(), world_id)
    }

    /// Create a character with a generated name and announce it.
    pub fn add_character(&self, world_id: Uuid) -> Result<Character, MutationError> {
        let world = self.repository.world(world_id)?;
        let character = Character::new(format!("New Character {}", world.characters.len() + 1));
        self.repository.insert_character(world_id, &character)?;

        self.channel(world_id).broadcast(&WorldPatch {
            characters: Some(ListOp::Append(vec![character.clone()])),
            ..WorldPatch::default()
        });
        Ok(character)
    }

    pub fn update_character(
        &self,
        character_id: Uuid,
        data: CharacterPatch,
    ) -> Result<(), MutationError> {
        let world_id = self.repository.update_character(character_id, &data)?;

        self.channel(world_id).broadcast(&WorldPatch {
            characters: Some(ListOp::MergeWhere(MergeSpec {
                filter: CharacterPatch::with_id(character_id),
                properties: data,
            })),
            ..WorldPatch::default()
        });
        Ok(())
    }

    pub fn delete_character(&self, character_id: Uuid) -> Result<(), MutationError> {
        let world_id = self.repository.delete_character(character_id)?;

        self.channel(world_id).broadcast(&WorldPatch {
            characters: Some(ListOp::RemoveWhere(CharacterPatch::with_id(character_id))),
            ..WorldPatch::default()
        });
        Ok(())
    }

    pub fn add_clock(&self, world_id: Uuid) -> Result<Clock, MutationError> {
        // Existence check before the insert so NotFound never broadcasts.
        self.repository.world(world_id)?;
        let clock = Clock::new("New Clock");
        self.repository.insert_clock(world_id, &clock)?;

        self.channel(world_id).broadcast(&WorldPatch {
            clocks: Some(ListOp::Append(vec![clock.clone()])),
            ..WorldPatch::default()
        });
        Ok(clock)
    }

    pub fn update_clock(&self, clock_id: Uuid, data: ClockPatch) -> Result<(), MutationError> {
        let world_id = self.repository.update_clock(clock_id, &data)?;

        self.channel(world_id).broadcast(&WorldPatch {
            clocks: Some(ListOp::MergeWhere(MergeSpec {
                filter: ClockPatch::with_id(clock_id),
                properties: data,
            })),
            ..WorldPatch::default()
        });
        Ok(())
    }

    pub fn remove_clock(&self, clock_id: Uuid) -> Result<(), MutationError> {
        let world_id = self.repository.delete_clock(clock_id)?;

        self.channel(world_id).broadcast(&WorldPatch {
            clocks: Some(ListOp::RemoveWhere(ClockPatch::with_id(clock_id))),
            ..WorldPatch::default()
        });
        Ok(())
    }

    pub fn rename_world(&self, world_id: Uuid, name: &str) -> Result<(), MutationError> {
        self.repository.rename_world(world_id, name)?;

        self.channel(world_id).broadcast(&WorldPatch {
            name: Some(name.to_string()),
            ..WorldPatch::default()
        });
        Ok(())
    }
}

/// One named mutation handler: JSON in, JSON out.
pub type Handler =
    Box<dyn Fn(&Originator, serde_json::Value) -> Result<serde_json::Value, MutationError> + Send + Sync>;

/// Explicit name → handler table, built at startup and passed by reference
/// to the request dispatcher.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<&'static str, Handler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn dispatch(
        &self,
        name: &str,
        originator: &Originator,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, MutationError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| MutationError::UnknownAction(name.to_string()))?;
        handler(originator, input)
    }
}

fn parse_input<T: DeserializeOwned>(input: serde_json::Value) -> Result<T, MutationError> {
    serde_json::from_value(input).map_err(|e| MutationError::BadInput(e.to_string()))
}

fn to_output<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, MutationError> {
    serde_json::to_value(value).map_err(|e| MutationError::Storage(e.to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WorldInput {
    world_id: Uuid,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IdInput {
    id: Uuid,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateCharacterInput {
    id: Uuid,
    data: CharacterPatch,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateClockInput {
    id: Uuid,
    data: ClockPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RenameWorldInput {
    world_id: Uuid,
    name: String,
}

/// The standard action set, one handler per mutation the viewers can submit.
pub fn default_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();

    table.register(
        "add-character",
        Box::new(|originator, input| {
            let input: WorldInput = parse_input(input)?;
            let character = originator.add_character(input.world_id)?;
            to_output(&character)
        }),
    );

    table.register(
        "update-character",
        Box::new(|originator, input| {
            let input: UpdateCharacterInput = parse_input(input)?;
            originator.update_character(input.id, input.data)?;
            Ok(serde_json::Value::Null)
        }),
    );

    table.register(
        "delete-character",
        Box::new(|originator, input| {
            let input: IdInput = parse_input(input)?;
            originator.delete_character(input.id)?;
            Ok(serde_json::Value::Null)
        }),
    );

    table.register(
        "add-clock",
        Box::new(|originator, input| {
            let input: WorldInput = parse_input(input)?;
            let clock = originator.add_clock(input.world_id)?;
            to_output(&clock)
        }),
    );

    table.register(
        "update-clock",
        Box::new(|originator, input| {
            let input: UpdateClockInput = parse_input(input)?;
            originator.update_clock(input.id, input.data)?;
            Ok(serde_json::Value::Null)
        }),
    );

    table.register(
        "remove-clock",
        Box::new(|originator, input| {
            let input: IdInput = parse_input(input)?;
            originator.remove_clock(input.id)?;
            Ok(serde_json::Value::Null)
        }),
    );

    table.register(
        "rename-world",
        Box::new(|originator, input| {
            let input: RenameWorldInput = parse_input(input)?;
            originator.rename_world(input.world_id, &input.name)?;
            Ok(serde_json::Value::Null)
        }),
    );

    table
}
