//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::geometry::Vec2;
use crate::game::CombatantId;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Control input for the next tick
    Action(Action),

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the room and close the session
    Leave,
}

/// Control input from one participant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Desired acceleration, each axis in [-1, 1]
    #[serde(default)]
    pub thrust: Vec2,
    /// Aim direction in radians
    #[serde(default)]
    pub aim_angle: f32,
    /// Fire weapon this tick
    #[serde(default)]
    pub fire: bool,
}

impl Action {
    /// Clamps thrust into range; `None` for non-finite payloads
    pub fn sanitized(self) -> Option<Action> {
        if !self.thrust.is_finite() || !self.aim_angle.is_finite() {
            return None;
        }
        Some(Action {
            thrust: Vec2::new(self.thrust.x.clamp(-1.0, 1.0), self.thrust.y.clamp(-1.0, 1.0)),
            aim_angle: self.aim_angle,
            fire: self.fire,
        })
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once after the session attaches
    Welcome {
        participant_id: String,
        combatant_id: CombatantId,
        room_id: String,
        server_time: u64,
    },

    /// Current observation for this participant's combatant
    Observation(Observation),

    /// Room is under-populated; inputs are ignored until it fills up
    Waiting {
        combatants: usize,
        required: usize,
        observation: Observation,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },

    /// Error message
    Error { code: String, message: String },
}

/// Bounded per-tick state snapshot for one combatant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tick: u64,
    pub self_pos: Vec2,
    pub self_health: f32,
    /// Zero when no living enemy exists
    pub nearest_enemy_pos: Vec2,
    pub nearest_enemy_health: f32,
    /// Projectiles within the observation radius
    pub projectiles: Vec<Vec2>,
    /// Obstacles flattened as [x, y, w, h, x, y, w, h, ...]
    pub obstacles: Vec<f32>,
    pub has_line_of_sight: bool,
    pub arena_width: f32,
    pub arena_height: f32,
}
