//! Collision passes run once per tick over a room

use super::combat::{CombatSystem, HitResult};
use super::geometry::{circle_intersects_rect, Vec2};
use super::respawn;
use super::room_state::RoomState;
use super::{CombatantId, ProjectileId, RoomEvent};

/// Extra separation added to each push so touching pairs don't re-collide
pub const SEPARATION_SLOP: f32 = 0.01;
/// Share of the normal velocity difference exchanged on contact
pub const BOUNCE_FACTOR: f32 = 0.5;

/// Run every collision pass in order
pub fn resolve(room: &mut RoomState) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    for hit in resolve_projectiles(room) {
        events.push(RoomEvent::Hit {
            shooter_id: hit.shooter_id,
            target_id: hit.target_id,
            damage: hit.damage,
        });
        if hit.target_killed {
            events.push(RoomEvent::Kill {
                killer_id: hit.shooter_id,
                victim_id: hit.target_id,
            });
        }
    }
    resolve_combatants(room);
    events
}

/// Remove projectiles that left the arena, struck an obstacle, or hit a combatant
pub fn resolve_projectiles(room: &mut RoomState) -> Vec<HitResult> {
    let mut spent: Vec<ProjectileId> = Vec::new();
    let mut hits: Vec<HitResult> = Vec::new();

    for projectile in &room.projectiles {
        let p = projectile.position;
        let outside = p.x < 0.0 || p.x > room.width || p.y < 0.0 || p.y > room.height;
        let blocked = room
            .obstacles
            .iter()
            .any(|o| circle_intersects_rect(p, projectile.radius, o));
        if outside || blocked {
            spent.push(projectile.id);
            continue;
        }

        // Invulnerable and dead combatants are not hittable
        let target = room.combatants.values().find(|c| {
            c.id != projectile.owner_id
                && c.lifecycle.is_alive()
                && projectile.check_hit(c.position, c.radius)
        });

        if let Some(target) = target {
            spent.push(projectile.id);
            hits.push(HitResult {
                projectile_id: projectile.id,
                shooter_id: projectile.owner_id,
                target_id: target.id,
                damage: projectile.damage,
                target_killed: false,
            });
        }
    }

    room.projectiles.retain(|p| !spent.contains(&p.id));

    let mut applied = Vec::with_capacity(hits.len());
    for mut hit in hits {
        let Some(target) = room.combatants.get_mut(&hit.target_id) else {
            continue;
        };
        // An earlier projectile this tick may already have killed it
        if !target.lifecycle.is_alive() {
            continue;
        }

        let (health, killed) = CombatSystem::apply_damage(target.health, hit.damage);
        target.health = health;
        hit.target_killed = killed;

        if killed {
            respawn::mark_dead(room, hit.target_id);
            room.total_kills += 1;
            if let Some(shooter) = room.combatants.get_mut(&hit.shooter_id) {
                shooter.kills += 1;
            }
        }
        applied.push(hit);
    }

    applied
}

/// Push overlapping Alive combatants apart and exchange normal velocity
pub fn resolve_combatants(room: &mut RoomState) {
    let ids: Vec<CombatantId> = room
        .combatants
        .values()
        .filter(|c| c.lifecycle.is_alive())
        .map(|c| c.id)
        .collect();

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            separate_pair(room, ids[i], ids[j]);
        }
    }
}

fn separate_pair(room: &mut RoomState, a_id: CombatantId, b_id: CombatantId) {
    let (Some(a), Some(b)) = (room.combatants.get(&a_id), room.combatants.get(&b_id)) else {
        return;
    };
    let (a_pos, a_vel, a_radius) = (a.position, a.velocity, a.radius);
    let (b_pos, b_vel, b_radius) = (b.position, b.velocity, b.radius);

    let delta = b_pos - a_pos;
    let distance = delta.length();
    let min_distance = a_radius + b_radius;
    if distance >= min_distance {
        return;
    }

    let normal = if distance > f32::EPSILON {
        delta * (1.0 / distance)
    } else {
        Vec2::new(1.0, 0.0)
    };
    let push = (min_distance - distance) / 2.0 + SEPARATION_SLOP;

    let a_half = a_pos - normal * push;
    let b_half = b_pos + normal * push;
    let a_ok = room.is_position_clear(a_half, a_radius);
    let b_ok = room.is_position_clear(b_half, b_radius);

    // A push that would penetrate an obstacle goes to the other combatant
    let (new_a, new_b) = match (a_ok, b_ok) {
        (true, true) => (a_half, b_half),
        (false, true) => {
            let b_full = b_pos + normal * (push * 2.0);
            if room.is_position_clear(b_full, b_radius) {
                (a_pos, b_full)
            } else {
                (a_pos, b_half)
            }
        }
        (true, false) => {
            let a_full = a_pos - normal * (push * 2.0);
            if room.is_position_clear(a_full, a_radius) {
                (a_full, b_pos)
            } else {
                (a_half, b_pos)
            }
        }
        (false, false) => (a_pos, b_pos),
    };

    let a_normal = a_vel.dot(normal);
    let b_normal = b_vel.dot(normal);

    if let Some(a) = room.combatants.get_mut(&a_id) {
        a.position = new_a;
        a.velocity += normal * ((b_normal - a_normal) * BOUNCE_FACTOR);
    }
    if let Some(b) = room.combatants.get_mut(&b_id) {
        b.position = new_b;
        b.velocity += normal * ((a_normal - b_normal) * BOUNCE_FACTOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rooms::ArenaConfig;
    use crate::game::combatant::Lifecycle;
    use crate::game::geometry::Obstacle;

    fn room_with(obstacles: Vec<Obstacle>) -> RoomState {
        let arena = ArenaConfig {
            width: 800.0,
            height: 600.0,
            obstacles: Some(obstacles),
        };
        RoomState::new("r", &arena, 11)
    }

    fn place(room: &mut RoomState, id: CombatantId, x: f32, y: f32) {
        room.combatant_mut(id).unwrap().position = Vec2::new(x, y);
    }

    #[test]
    fn test_overlapping_pair_is_separated() {
        let mut room = room_with(vec![]);
        let a = room.add_combatant("p1", "A", false).unwrap();
        let b = room.add_combatant("p2", "B", false).unwrap();
        place(&mut room, a, 400.0, 300.0);
        place(&mut room, b, 410.0, 300.0);

        resolve_combatants(&mut room);

        let pa = room.combatant(a).unwrap().position;
        let pb = room.combatant(b).unwrap().position;
        assert!(pa.distance(pb) >= 30.0);
        assert!(pa.x < 400.0 && pb.x > 410.0);
    }

    #[test]
    fn test_coincident_pair_pushes_along_x() {
        let mut room = room_with(vec![]);
        let a = room.add_combatant("p1", "A", false).unwrap();
        let b = room.add_combatant("p2", "B", false).unwrap();
        place(&mut room, a, 400.0, 300.0);
        place(&mut room, b, 400.0, 300.0);

        resolve_combatants(&mut room);

        let pa = room.combatant(a).unwrap().position;
        let pb = room.combatant(b).unwrap().position;
        assert!(pa.distance(pb) >= 30.0);
        assert_eq!(pa.y, pb.y);
    }

    #[test]
    fn test_push_redirected_away_from_obstacle() {
        let mut room = room_with(vec![Obstacle::new(360.0, 250.0, 20.0, 100.0)]);
        let a = room.add_combatant("p1", "A", false).unwrap();
        let b = room.add_combatant("p2", "B", false).unwrap();
        // a is flush against the obstacle's right face
        place(&mut room, a, 395.5, 300.0);
        place(&mut room, b, 415.0, 300.0);

        resolve_combatants(&mut room);

        let ca = room.combatant(a).unwrap();
        let cb = room.combatant(b).unwrap();
        assert_eq!(ca.position, Vec2::new(395.5, 300.0));
        assert!(ca.position.distance(cb.position) >= 30.0);
        assert!(room.is_position_clear(ca.position, ca.radius));
    }

    #[test]
    fn test_bounce_exchanges_normal_velocity() {
        let mut room = room_with(vec![]);
        let a = room.add_combatant("p1", "A", false).unwrap();
        let b = room.add_combatant("p2", "B", false).unwrap();
        place(&mut room, a, 400.0, 300.0);
        place(&mut room, b, 420.0, 300.0);
        room.combatant_mut(a).unwrap().velocity = Vec2::new(100.0, 0.0);

        resolve_combatants(&mut room);

        assert_eq!(room.combatant(a).unwrap().velocity, Vec2::new(50.0, 0.0));
        assert_eq!(room.combatant(b).unwrap().velocity, Vec2::new(50.0, 0.0));
    }

    #[test]
    fn test_projectile_outside_arena_removed() {
        let mut room = room_with(vec![]);
        room.add_projectile(1, Vec2::new(-5.0, 100.0), Vec2::ZERO);
        room.add_projectile(1, Vec2::new(400.0, 300.0), Vec2::ZERO);
        resolve_projectiles(&mut room);
        assert_eq!(room.projectiles.len(), 1);
    }

    #[test]
    fn test_projectile_blocked_by_obstacle() {
        let mut room = room_with(vec![Obstacle::new(300.0, 200.0, 120.0, 30.0)]);
        room.add_projectile(1, Vec2::new(350.0, 198.0), Vec2::ZERO);
        resolve_projectiles(&mut room);
        assert!(room.projectiles.is_empty());
    }

    #[test]
    fn test_lethal_hit_credits_one_kill_and_death() {
        let mut room = room_with(vec![]);
        let shooter = room.add_combatant("p1", "A", false).unwrap();
        let target = room.add_combatant("p2", "B", false).unwrap();
        place(&mut room, shooter, 100.0, 100.0);
        place(&mut room, target, 400.0, 300.0);
        room.combatant_mut(target).unwrap().health = 25.0;

        // Two projectiles land in the same tick; only one can kill
        room.add_projectile(shooter, Vec2::new(405.0, 300.0), Vec2::ZERO);
        room.add_projectile(shooter, Vec2::new(395.0, 300.0), Vec2::ZERO);
        let events = resolve(&mut room);

        let kills = events
            .iter()
            .filter(|e| matches!(e, RoomEvent::Kill { .. }))
            .count();
        assert_eq!(kills, 1);
        assert_eq!(room.combatant(shooter).unwrap().kills, 1);
        let victim = room.combatant(target).unwrap();
        assert_eq!(victim.deaths, 1);
        assert_eq!(victim.health, 0.0);
        assert!(victim.lifecycle.is_dead());
        assert!(room.projectiles.is_empty());
    }

    #[test]
    fn test_owner_and_invulnerable_not_hit() {
        let mut room = room_with(vec![]);
        let shooter = room.add_combatant("p1", "A", false).unwrap();
        let shielded = room.add_combatant("p2", "B", false).unwrap();
        place(&mut room, shooter, 200.0, 200.0);
        place(&mut room, shielded, 400.0, 300.0);
        room.combatant_mut(shielded).unwrap().lifecycle = Lifecycle::Invulnerable { until: 5.0 };

        room.add_projectile(shooter, Vec2::new(200.0, 200.0), Vec2::ZERO);
        room.add_projectile(shooter, Vec2::new(400.0, 300.0), Vec2::ZERO);
        let events = resolve(&mut room);

        assert!(events.is_empty());
        assert_eq!(room.projectiles.len(), 2);
        assert_eq!(room.combatant(shielded).unwrap().health, 100.0);
    }
}
