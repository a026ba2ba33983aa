//! Fixed-step integration and the per-room tick pipeline

use std::time::Duration;

use crate::util::time::{IDLE_TPS, SIMULATION_TPS};
use crate::ws::protocol::Action;

use super::collision;
use super::combat::{CombatSystem, BLASTER};
use super::combatant::Controller;
use super::geometry::Vec2;
use super::respawn;
use super::room_state::{RoomState, MIN_ACTIVE_COMBATANTS};
use super::steering;
use super::{CombatantId, RoomEvent};

/// Largest step integrated in one tick (seconds)
pub const MAX_DT: f32 = 0.1;
/// Per-tick velocity decay
pub const FRICTION: f32 = 0.85;
/// Thrust acceleration (units per second squared)
pub const ACCELERATION: f32 = 800.0;
/// Speed cap (units per second)
pub const MAX_SPEED: f32 = 200.0;
/// Step used to turn one action's thrust into a velocity impulse
pub const ACTION_IMPULSE_DT: f32 = 1.0 / SIMULATION_TPS as f32;

/// Movement rules shared by both controller kinds
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Add `thrust * ACCELERATION * dt` and cap the result at MAX_SPEED
    pub fn accelerate(velocity: Vec2, thrust: Vec2, dt: f32) -> Vec2 {
        (velocity + thrust * (ACCELERATION * dt)).clamp_length(MAX_SPEED)
    }

    /// Move axis by axis; an axis whose move would leave clear space is
    /// rejected and its velocity component zeroed.
    pub fn step(room: &RoomState, position: Vec2, velocity: Vec2, radius: f32, dt: f32) -> (Vec2, Vec2) {
        let mut position = position;
        let mut velocity = velocity;

        let moved_x = Vec2::new(position.x + velocity.x * dt, position.y);
        if room.is_position_clear(moved_x, radius) {
            position = moved_x;
        } else {
            velocity.x = 0.0;
        }

        let moved_y = Vec2::new(position.x, position.y + velocity.y * dt);
        if room.is_position_clear(moved_y, radius) {
            position = moved_y;
        } else {
            velocity.y = 0.0;
        }

        (position, velocity)
    }
}

/// How long the room loop waits before its next tick
pub fn tick_period(alive: usize, speed_multiplier: f32) -> Duration {
    if alive < MIN_ACTIVE_COMBATANTS {
        return Duration::from_secs_f64(1.0 / IDLE_TPS as f64);
    }
    let speed = if speed_multiplier.is_finite() && speed_multiplier > 0.0 {
        speed_multiplier as f64
    } else {
        1.0
    };
    Duration::from_secs_f64(1.0 / (SIMULATION_TPS as f64 * speed))
}

/// Apply one queued action to an externally controlled combatant.
/// Returns the shot event when the action fired.
pub fn apply_action(room: &mut RoomState, combatant_id: CombatantId, action: &Action) -> Option<RoomEvent> {
    let now = room.clock;
    let combatant = room.combatants.get_mut(&combatant_id)?;
    if !combatant.accepts_input() {
        return None;
    }

    combatant.velocity = PhysicsSystem::accelerate(combatant.velocity, action.thrust, ACTION_IMPULSE_DT);
    combatant.aim_angle = action.aim_angle;

    if !action.fire || !CombatSystem::can_fire(combatant.last_fired_at, now, &BLASTER) {
        return None;
    }

    combatant.last_fired_at = Some(now);
    let (position, velocity) = CombatSystem::muzzle(combatant.position, combatant.aim_angle, &BLASTER);
    let projectile_id = room.add_projectile(combatant_id, position, velocity);

    Some(RoomEvent::Shot {
        shooter_id: combatant_id,
        projectile_id,
    })
}

/// Advance the room by one tick of `dt` seconds (clamped to MAX_DT)
pub fn update(room: &mut RoomState, dt: f32) -> Vec<RoomEvent> {
    let dt = if dt.is_finite() { dt.clamp(0.0, MAX_DT) } else { 0.0 };
    room.clock += dt as f64;

    steering::update(room);
    integrate_combatants(room, dt);

    for projectile in &mut room.projectiles {
        projectile.update(dt);
    }

    let mut events = collision::resolve(room);
    events.extend(respawn::update(room));

    room.tick += 1;
    events
}

fn integrate_combatants(room: &mut RoomState, dt: f32) {
    let ids: Vec<CombatantId> = room
        .combatants
        .values()
        .filter(|c| !c.lifecycle.is_dead())
        .map(|c| c.id)
        .collect();

    for id in ids {
        let Some(c) = room.combatants.get(&id) else {
            continue;
        };

        let mut velocity = c.velocity;
        if let Controller::Scripted(wander) = c.controller {
            velocity = PhysicsSystem::accelerate(velocity, wander.thrust, dt);
        }
        velocity *= FRICTION;

        let (position, velocity) = PhysicsSystem::step(room, c.position, velocity, c.radius, dt);

        if let Some(c) = room.combatants.get_mut(&id) {
            c.position = position;
            c.velocity = velocity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rooms::ArenaConfig;
    use crate::game::geometry::{circle_intersects_rect, Obstacle};

    const DT: f32 = 1.0 / 60.0;

    fn open_room() -> RoomState {
        let arena = ArenaConfig {
            width: 800.0,
            height: 600.0,
            obstacles: Some(vec![]),
        };
        RoomState::new("r", &arena, 9)
    }

    fn action(thrust: Vec2, aim_angle: f32, fire: bool) -> Action {
        Action {
            thrust,
            aim_angle,
            fire,
        }
    }

    #[test]
    fn test_tick_period_throttles_idle_rooms() {
        assert_eq!(tick_period(0, 1.0), Duration::from_secs_f64(0.1));
        assert_eq!(tick_period(1, 4.0), Duration::from_secs_f64(0.1));
        assert_eq!(tick_period(2, 1.0), Duration::from_secs_f64(1.0 / 60.0));
        assert_eq!(tick_period(2, 2.0), Duration::from_secs_f64(1.0 / 120.0));
    }

    #[test]
    fn test_dt_is_clamped() {
        let mut room = open_room();
        update(&mut room, 5.0);
        assert!((room.clock - 0.1).abs() < 1e-6);
        assert_eq!(room.tick, 1);
    }

    #[test]
    fn test_action_impulse_and_speed_cap() {
        let mut room = open_room();
        let id = room.add_combatant("p1", "A", false).unwrap();

        apply_action(&mut room, id, &action(Vec2::new(1.0, 0.0), 0.5, false));
        let c = room.combatant(id).unwrap();
        assert!((c.velocity.x - 800.0 / 60.0).abs() < 1e-3);
        assert_eq!(c.aim_angle, 0.5);

        for _ in 0..100 {
            apply_action(&mut room, id, &action(Vec2::new(1.0, 1.0), 0.0, false));
        }
        assert!(room.combatant(id).unwrap().velocity.length() <= MAX_SPEED + 1e-3);
    }

    #[test]
    fn test_fire_respects_cooldown() {
        let mut room = open_room();
        let id = room.add_combatant("p1", "A", false).unwrap();
        let fire = action(Vec2::ZERO, 0.0, true);

        assert!(apply_action(&mut room, id, &fire).is_some());
        assert!(apply_action(&mut room, id, &fire).is_none());
        room.clock += BLASTER.cooldown;
        assert!(apply_action(&mut room, id, &fire).is_some());
        assert_eq!(room.total_shots_fired, 2);
    }

    #[test]
    fn test_scripted_and_dead_ignore_actions() {
        let mut room = open_room();
        let bot = room.add_combatant("", "Dummy", true).unwrap();
        let dead = room.add_combatant("p1", "A", false).unwrap();
        respawn::mark_dead(&mut room, dead);

        let fire = action(Vec2::new(1.0, 0.0), 0.0, true);
        assert!(apply_action(&mut room, bot, &fire).is_none());
        assert!(apply_action(&mut room, dead, &fire).is_none());
        assert!(apply_action(&mut room, 4242, &fire).is_none());
        assert!(room.projectiles.is_empty());
        assert_eq!(room.combatant(dead).unwrap().velocity, Vec2::ZERO);
    }

    #[test]
    fn test_friction_decays_velocity() {
        let mut room = open_room();
        let id = room.add_combatant("p1", "A", false).unwrap();
        room.combatant_mut(id).unwrap().position = Vec2::new(400.0, 300.0);
        room.combatant_mut(id).unwrap().velocity = Vec2::new(100.0, 0.0);

        update(&mut room, DT);
        assert!((room.combatant(id).unwrap().velocity.x - 85.0).abs() < 1e-3);
    }

    #[test]
    fn test_blocked_axis_is_rejected() {
        let mut room = open_room();
        let id = room.add_combatant("p1", "A", false).unwrap();
        // Flush against the right boundary wall
        room.combatant_mut(id).unwrap().position = Vec2::new(765.0, 300.0);
        room.combatant_mut(id).unwrap().velocity = Vec2::new(200.0, 100.0);

        update(&mut room, DT);
        let c = room.combatant(id).unwrap();
        assert_eq!(c.position.x, 765.0);
        assert_eq!(c.velocity.x, 0.0);
        assert!(c.position.y > 300.0);
    }

    #[test]
    fn test_projectile_vanishes_at_boundary() {
        let mut room = open_room();
        let shooter = room.add_combatant("p1", "A", false).unwrap();
        room.combatant_mut(shooter).unwrap().position = Vec2::new(75.0, 100.0);
        apply_action(&mut room, shooter, &action(Vec2::ZERO, 0.0, true));
        assert_eq!(room.projectiles[0].position, Vec2::new(100.0, 100.0));

        for _ in 0..100 {
            update(&mut room, DT);
        }
        assert_eq!(room.projectiles.len(), 1);

        for _ in 0..3 {
            update(&mut room, DT);
        }
        assert!(room.projectiles.is_empty());
    }

    #[test]
    fn test_wanderers_never_penetrate_obstacles() {
        let arena = ArenaConfig::default();
        let mut room = RoomState::new("pve", &arena, 21);
        for _ in 0..6 {
            room.add_combatant("", "Dummy", true).unwrap();
        }

        for _ in 0..600 {
            update(&mut room, DT);
            for c in room.combatants.values().filter(|c| c.lifecycle.is_alive()) {
                for obstacle in &room.obstacles {
                    let shrunk = Obstacle::new(
                        obstacle.x + 0.01,
                        obstacle.y + 0.01,
                        obstacle.width - 0.02,
                        obstacle.height - 0.02,
                    );
                    assert!(!circle_intersects_rect(c.position, c.radius, &shrunk));
                }
            }
        }
        assert!(room.combatants.values().any(|c| c.velocity != Vec2::ZERO));
    }
}
