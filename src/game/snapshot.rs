//! Read-only copies of room state for rendering and diagnostics

use serde::Serialize;

use super::combatant::{Combatant, Lifecycle};
use super::geometry::{Obstacle, Vec2};
use super::room_state::{RoomState, RoomStats};
use super::{CombatantId, ProjectileId};

/// Full copy of one room, taken under the room lock
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub tick: u64,
    pub arena_width: f32,
    pub arena_height: f32,
    pub obstacles: Vec<Obstacle>,
    pub combatants: Vec<CombatantSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub stats: RoomStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombatantSnapshot {
    pub id: CombatantId,
    pub participant_id: String,
    pub name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub aim_angle: f32,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub lifecycle: Lifecycle,
    pub scripted: bool,
    pub kills: u32,
    pub deaths: u32,
}

impl From<&Combatant> for CombatantSnapshot {
    fn from(c: &Combatant) -> Self {
        Self {
            id: c.id,
            participant_id: c.participant_id.clone(),
            name: c.name.clone(),
            position: c.position,
            velocity: c.velocity,
            aim_angle: c.aim_angle,
            radius: c.radius,
            health: c.health,
            max_health: c.max_health,
            lifecycle: c.lifecycle,
            scripted: c.is_scripted(),
            kills: c.kills,
            deaths: c.deaths,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectileSnapshot {
    pub id: ProjectileId,
    pub owner_id: CombatantId,
    pub position: Vec2,
}

impl RoomSnapshot {
    pub fn capture(room: &RoomState) -> Self {
        Self {
            room_id: room.room_id.clone(),
            tick: room.tick,
            arena_width: room.width,
            arena_height: room.height,
            obstacles: room.obstacles.clone(),
            combatants: room.combatants.values().map(CombatantSnapshot::from).collect(),
            projectiles: room
                .projectiles
                .iter()
                .map(|p| ProjectileSnapshot {
                    id: p.id,
                    owner_id: p.owner_id,
                    position: p.position,
                })
                .collect(),
            stats: room.stats(),
        }
    }
}
