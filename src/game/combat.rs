//! Combat system - weapons, damage, projectiles

use serde::Serialize;

use super::geometry::{circles_overlap, Vec2};
use super::{CombatantId, ProjectileId};

/// Weapon stats shared by every externally controlled combatant
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: f32,
    /// Projectile speed (units per second)
    pub projectile_speed: f32,
    /// Cooldown between shots (seconds)
    pub cooldown: f64,
    /// Projectile hitbox radius
    pub projectile_radius: f32,
    /// Distance ahead of the shooter's centre where projectiles appear
    pub muzzle_offset: f32,
}

pub const BLASTER: WeaponStats = WeaponStats {
    damage: 25.0,
    projectile_speed: 400.0,
    cooldown: 0.3,
    projectile_radius: 3.0,
    muzzle_offset: 25.0,
};

/// Active projectile in the room
#[derive(Debug, Clone, Serialize)]
pub struct Projectile {
    pub id: ProjectileId,
    pub owner_id: CombatantId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub damage: f32,
    pub radius: f32,
    pub created_at: f64,
}

impl Projectile {
    pub fn new(
        id: ProjectileId,
        owner_id: CombatantId,
        position: Vec2,
        velocity: Vec2,
        created_at: f64,
    ) -> Self {
        Self {
            id,
            owner_id,
            position,
            velocity,
            damage: BLASTER.damage,
            radius: BLASTER.projectile_radius,
            created_at,
        }
    }

    /// Advance the projectile by `dt` seconds
    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
    }

    /// Check collision with a circular target
    pub fn check_hit(&self, target: Vec2, target_radius: f32) -> bool {
        circles_overlap(self.position, self.radius, target, target_radius)
    }
}

/// Combat rules for firing and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a combatant that last fired at `last_fired_at` may fire at `now`
    pub fn can_fire(last_fired_at: Option<f64>, now: f64, stats: &WeaponStats) -> bool {
        match last_fired_at {
            Some(last) => now - last >= stats.cooldown,
            None => true,
        }
    }

    /// Muzzle position and velocity for a shot along `aim_angle`
    pub fn muzzle(origin: Vec2, aim_angle: f32, stats: &WeaponStats) -> (Vec2, Vec2) {
        let direction = Vec2::from_angle(aim_angle);
        (
            origin + direction * stats.muzzle_offset,
            direction * stats.projectile_speed,
        )
    }

    /// Apply damage to health, returns (new_health, is_dead). Health never drops below zero.
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - damage).max(0.0);
        (new_health, new_health <= 0.0)
    }
}

/// Hit result from combat resolution
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub projectile_id: ProjectileId,
    pub shooter_id: CombatantId,
    pub target_id: CombatantId,
    pub damage: f32,
    pub target_killed: bool,
}
