//! Game simulation modules

pub mod collision;
pub mod combat;
pub mod combatant;
pub mod engine;
pub mod geometry;
pub mod physics;
pub mod respawn;
pub mod room;
pub mod room_state;
pub mod snapshot;
pub mod steering;

pub use engine::Engine;
pub use room::{RoomHandle, RoomLoop};
pub use room_state::RoomState;

use serde::Serialize;

use crate::ws::protocol::Action;

/// Room-scoped combatant id. Zero is never allocated.
pub type CombatantId = u32;

/// Room-scoped projectile id
pub type ProjectileId = u64;

/// Action queued for a combatant, applied at the start of the next tick
#[derive(Debug, Clone, Copy)]
pub struct QueuedAction {
    pub combatant_id: CombatantId,
    pub action: Action,
}

/// Lifecycle events produced while simulating a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// Projectile fired
    Shot {
        shooter_id: CombatantId,
        projectile_id: ProjectileId,
    },

    /// Hit registered
    Hit {
        shooter_id: CombatantId,
        target_id: CombatantId,
        damage: f32,
    },

    /// Combatant killed
    Kill {
        killer_id: CombatantId,
        victim_id: CombatantId,
    },

    /// Dead combatant relocated and made invulnerable
    Respawned {
        combatant_id: CombatantId,
        x: f32,
        y: f32,
    },

    /// Grace period over
    Vulnerable { combatant_id: CombatantId },

    /// Replacement scripted combatant added
    ScriptedSpawned { combatant_id: CombatantId },
}
