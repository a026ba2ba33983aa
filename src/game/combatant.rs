//! Combatant entity and its lifecycle state

use serde::Serialize;

use super::geometry::Vec2;
use super::CombatantId;

/// Default clearance radius of a combatant
pub const COMBATANT_RADIUS: f32 = 15.0;
/// Health every combatant spawns and respawns with
pub const MAX_HEALTH: f32 = 100.0;

/// Lifecycle state. Transitions only Alive -> Dead -> Invulnerable -> Alive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Moves, aims, fires, takes damage
    Alive,
    /// Frozen until the respawn delay has elapsed since `since`
    Dead { since: f64 },
    /// Acts normally but cannot be hit until `until`
    Invulnerable { until: f64 },
}

impl Lifecycle {
    pub fn is_alive(&self) -> bool {
        matches!(self, Lifecycle::Alive)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Lifecycle::Dead { .. })
    }
}

/// Bookkeeping for autonomous wandering
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WanderState {
    /// Simulation time of the last direction change
    pub last_change: f64,
    /// Consecutive ticks spent nearly stationary
    pub stuck_ticks: u32,
    /// Thrust currently being applied, each axis in [-1, 1]
    pub thrust: Vec2,
}

impl Default for WanderState {
    fn default() -> Self {
        Self {
            last_change: f64::NEG_INFINITY,
            stuck_ticks: 0,
            thrust: Vec2::ZERO,
        }
    }
}

/// Where a combatant's movement comes from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Controller {
    /// Driven by actions from a connected participant
    External,
    /// Wanders on its own and never accepts input
    Scripted(WanderState),
}

/// Combatant state in a room (authoritative)
#[derive(Debug, Clone, Serialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub participant_id: String,
    pub name: String,

    // Position and movement
    pub position: Vec2,
    pub velocity: Vec2,
    pub aim_angle: f32,
    pub radius: f32,

    // Combat
    pub health: f32,
    pub max_health: f32,
    pub lifecycle: Lifecycle,
    pub last_fired_at: Option<f64>,

    pub controller: Controller,

    // Stats
    pub kills: u32,
    pub deaths: u32,
}

impl Combatant {
    pub fn new(
        id: CombatantId,
        participant_id: String,
        name: String,
        position: Vec2,
        controller: Controller,
    ) -> Self {
        Self {
            id,
            participant_id,
            name,
            position,
            velocity: Vec2::ZERO,
            aim_angle: 0.0,
            radius: COMBATANT_RADIUS,
            health: MAX_HEALTH,
            max_health: MAX_HEALTH,
            lifecycle: Lifecycle::Alive,
            last_fired_at: None,
            controller,
            kills: 0,
            deaths: 0,
        }
    }

    pub fn is_scripted(&self) -> bool {
        matches!(self.controller, Controller::Scripted(_))
    }

    /// Scripted combatants and dead ones ignore external actions
    pub fn accepts_input(&self) -> bool {
        !self.is_scripted() && !self.lifecycle.is_dead()
    }
}
