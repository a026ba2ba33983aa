//! Lifecycle timers and scripted replacement spawns

use super::combatant::{Controller, Lifecycle, WanderState};
use super::geometry::Vec2;
use super::room_state::{PendingSpawn, RoomState};
use super::{CombatantId, RoomEvent};

/// Seconds a combatant stays dead before respawning
pub const RESPAWN_DELAY: f64 = 1.0;
/// Seconds of invulnerability after a respawn
pub const INVULNERABILITY_PERIOD: f64 = 1.0;

/// Transition a combatant to Dead at the current clock.
/// Scripted deaths schedule replacements when the room has a scripted population.
pub fn mark_dead(room: &mut RoomState, id: CombatantId) -> bool {
    let now = room.clock;
    let Some(combatant) = room.combatants.get_mut(&id) else {
        return false;
    };
    if combatant.lifecycle.is_dead() {
        return false;
    }

    combatant.health = 0.0;
    combatant.velocity = Vec2::ZERO;
    combatant.lifecycle = Lifecycle::Dead { since: now };
    combatant.deaths += 1;
    let scripted = combatant.is_scripted();
    room.total_deaths += 1;

    if scripted {
        if let Some(config) = room.scripted {
            // Present plus pending never exceeds the cap
            let committed = room.scripted_count() + room.pending_scripted_count();
            let headroom = room.scripted_cap().saturating_sub(committed);
            let count = (config.replacements as usize).min(headroom) as u32;
            if count > 0 {
                room.pending_scripted.push(PendingSpawn {
                    due: now + RESPAWN_DELAY,
                    count,
                });
            }
        }
    }

    true
}

/// Advance lifecycle timers and add due scripted combatants
pub fn update(room: &mut RoomState) -> Vec<RoomEvent> {
    let now = room.clock;
    let mut events = Vec::new();

    let ids: Vec<CombatantId> = room.combatants.keys().copied().collect();
    for id in ids {
        let Some(lifecycle) = room.combatants.get(&id).map(|c| c.lifecycle) else {
            continue;
        };

        match lifecycle {
            Lifecycle::Dead { since } if now - since >= RESPAWN_DELAY => {
                let spawn = room.find_spawn_point();
                if let Some(c) = room.combatants.get_mut(&id) {
                    c.position = spawn;
                    c.velocity = Vec2::ZERO;
                    c.health = c.max_health;
                    c.lifecycle = Lifecycle::Invulnerable {
                        until: now + INVULNERABILITY_PERIOD,
                    };
                    if let Controller::Scripted(wander) = &mut c.controller {
                        *wander = WanderState::default();
                    }
                    events.push(RoomEvent::Respawned {
                        combatant_id: id,
                        x: spawn.x,
                        y: spawn.y,
                    });
                }
            }
            Lifecycle::Invulnerable { until } if now >= until => {
                if let Some(c) = room.combatants.get_mut(&id) {
                    c.lifecycle = Lifecycle::Alive;
                    events.push(RoomEvent::Vulnerable { combatant_id: id });
                }
            }
            _ => {}
        }
    }

    let due: u32 = room
        .pending_scripted
        .iter()
        .filter(|p| p.due <= now)
        .map(|p| p.count)
        .sum();
    room.pending_scripted.retain(|p| p.due > now);

    for _ in 0..due {
        match room.add_scripted() {
            Some(combatant_id) => events.push(RoomEvent::ScriptedSpawned { combatant_id }),
            None => break,
        }
    }

    events
}
