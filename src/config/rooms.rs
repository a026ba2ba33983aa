//! Room configuration file loading

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::game::geometry::Obstacle;
use crate::game::room_state::MAX_EXTERNAL_COMBATANTS;

/// Default arena dimensions
pub const DEFAULT_ARENA_WIDTH: f32 = 800.0;
pub const DEFAULT_ARENA_HEIGHT: f32 = 600.0;

/// All configured rooms, keyed by room id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomsConfig {
    pub rooms: BTreeMap<String, RoomConfig>,
}

/// One configured room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub password: String,
    /// Maximum externally controlled participants
    #[serde(alias = "max_players", alias = "maxParticipants")]
    pub max_participants: usize,
    #[serde(default)]
    pub arena: ArenaConfig,
    /// Scripted population for PvE rooms
    #[serde(default)]
    pub scripted: Option<ScriptedConfig>,
}

/// Arena size and obstacle layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    #[serde(default = "default_width")]
    pub width: f32,
    #[serde(default = "default_height")]
    pub height: f32,
    /// `None` means the key was absent and the default layout applies
    #[serde(default)]
    pub obstacles: Option<Vec<Obstacle>>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_ARENA_WIDTH,
            height: DEFAULT_ARENA_HEIGHT,
            obstacles: None,
        }
    }
}

fn default_width() -> f32 {
    DEFAULT_ARENA_WIDTH
}

fn default_height() -> f32 {
    DEFAULT_ARENA_HEIGHT
}

/// Scripted combatant population settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedConfig {
    /// Spawned on the room's first join
    pub initial: u32,
    /// Extra scripted combatants scheduled per scripted death
    #[serde(default = "default_replacements")]
    pub replacements: u32,
    /// Upper bound on scripted combatants present at once
    #[serde(default = "default_cap")]
    pub cap: u32,
}

fn default_replacements() -> u32 {
    2
}

fn default_cap() -> u32 {
    8
}

impl RoomsConfig {
    /// Load and validate the rooms file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RoomsConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RoomsConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate rooms from a JSON document
    pub fn from_json(raw: &str) -> Result<Self, RoomsConfigError> {
        let config: RoomsConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn get(&self, room_id: &str) -> Option<&RoomConfig> {
        self.rooms.get(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RoomConfig)> {
        self.rooms.iter()
    }

    fn validate(&self) -> Result<(), RoomsConfigError> {
        if self.is_empty() {
            return Err(RoomsConfigError::Invalid {
                room_id: String::new(),
                reason: "no rooms configured".to_string(),
            });
        }

        for (room_id, room) in &self.rooms {
            let invalid = |reason: &str| RoomsConfigError::Invalid {
                room_id: room_id.clone(),
                reason: reason.to_string(),
            };

            if room_id.trim().is_empty() {
                return Err(invalid("room id must not be empty"));
            }
            if room.max_participants == 0 {
                return Err(invalid("max_participants must be at least 1"));
            }
            if room.max_participants > MAX_EXTERNAL_COMBATANTS {
                return Err(invalid("max_participants exceeds the external id range"));
            }
            // Boundary walls take 20 units on each side
            if room.arena.width < 100.0 || room.arena.height < 100.0 {
                return Err(invalid("arena must be at least 100x100"));
            }
            if !room.arena.width.is_finite() || !room.arena.height.is_finite() {
                return Err(invalid("arena dimensions must be finite"));
            }
            for obstacle in room.arena.obstacles.iter().flatten() {
                let finite = [obstacle.x, obstacle.y, obstacle.width, obstacle.height]
                    .iter()
                    .all(|v| v.is_finite());
                if !finite || obstacle.width <= 0.0 || obstacle.height <= 0.0 {
                    return Err(invalid("obstacles need finite, positive dimensions"));
                }
            }
            if let Some(scripted) = room.scripted {
                if scripted.initial > scripted.cap {
                    return Err(invalid("scripted.initial cannot exceed scripted.cap"));
                }
            }
        }

        Ok(())
    }
}

/// Room configuration errors (fatal at startup)
#[derive(Debug, thiserror::Error)]
pub enum RoomsConfigError {
    #[error("Failed to read rooms config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rooms config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid room '{room_id}': {reason}")]
    Invalid { room_id: String, reason: String },
}
