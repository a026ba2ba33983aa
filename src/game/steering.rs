//! Autonomous wandering for scripted combatants

use rand::Rng;

use super::combatant::{Combatant, Controller};
use super::geometry::{Obstacle, Vec2};
use super::room_state::RoomState;

/// Below this speed a scripted combatant counts as stationary
pub const STUCK_SPEED: f32 = 5.0;
/// Stationary ticks before a new direction is forced
pub const STUCK_TICKS: u32 = 15;
/// Seconds between voluntary direction changes
pub const DIRECTION_INTERVAL: f64 = 2.0;
/// Obstacles closer than this push the wanderer away
pub const WALL_DANGER_DISTANCE: f32 = 60.0;
/// Inside this distance the push is tripled
pub const WALL_CRITICAL_DISTANCE: f32 = 30.0;

/// Refresh the thrust of every living scripted combatant
pub fn update(room: &mut RoomState) {
    let RoomState {
        combatants,
        obstacles,
        rng,
        clock,
        ..
    } = room;

    for combatant in combatants.values_mut() {
        if combatant.lifecycle.is_dead() {
            continue;
        }
        steer(combatant, &obstacles[..], &mut *rng, *clock);
    }
}

fn steer<R: Rng>(combatant: &mut Combatant, obstacles: &[Obstacle], rng: &mut R, now: f64) {
    let position = combatant.position;
    let radius = combatant.radius;
    let speed = combatant.velocity.length();
    let Controller::Scripted(wander) = &mut combatant.controller else {
        return;
    };

    if speed < STUCK_SPEED {
        wander.stuck_ticks += 1;
    } else {
        wander.stuck_ticks = 0;
    }

    let repulsion = wall_repulsion(position, radius, obstacles);
    if repulsion != Vec2::ZERO {
        wander.thrust = repulsion.normalized();
        wander.last_change = now;
        return;
    }

    let stuck = wander.stuck_ticks >= STUCK_TICKS;
    if stuck || now - wander.last_change >= DIRECTION_INTERVAL {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let magnitude = rng.gen_range(0.4..1.0);
        wander.thrust = Vec2::from_angle(angle) * magnitude;
        wander.last_change = now;
        wander.stuck_ticks = 0;
    }
}

/// Sum of pushes away from nearby obstacles, weighted by proximity
pub fn wall_repulsion(position: Vec2, radius: f32, obstacles: &[Obstacle]) -> Vec2 {
    let mut total = Vec2::ZERO;
    for obstacle in obstacles {
        let closest = obstacle.closest_point(position);
        let away = position - closest;
        let gap = away.length() - radius;
        if gap >= WALL_DANGER_DISTANCE {
            continue;
        }

        let mut weight = (WALL_DANGER_DISTANCE - gap) / WALL_DANGER_DISTANCE;
        if gap < WALL_CRITICAL_DISTANCE {
            weight *= 3.0;
        }
        total += away.normalized() * weight;
    }
    total
}
