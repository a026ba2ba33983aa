//! Authoritative per-room entity store and derived queries

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::config::rooms::{ArenaConfig, ScriptedConfig};
use crate::ws::protocol::Observation;

use super::combat::Projectile;
use super::combatant::{Combatant, Controller, WanderState};
use super::geometry::{circle_intersects_rect, circles_overlap, segment_intersects_rect, Obstacle, Vec2};
use super::{CombatantId, ProjectileId};

/// Thickness of the four boundary walls
pub const WALL_THICKNESS: f32 = 20.0;
/// Clearance radius required around a spawn point
pub const SPAWN_CLEARANCE: f32 = 20.0;
/// Spacing of the spawn search grid
pub const SPAWN_GRID_STEP: f32 = 40.0;
/// Projectiles farther than this are left out of observations
pub const OBSERVATION_RADIUS: f32 = 300.0;
/// Combatants needed before a room leaves the waiting state
pub const MIN_ACTIVE_COMBATANTS: usize = 2;
/// First id handed to scripted combatants; external ids stay below it
pub const SCRIPTED_ID_BASE: CombatantId = 10_000;
/// External combatants a room can hold before its id range is exhausted
pub const MAX_EXTERNAL_COMBATANTS: usize = SCRIPTED_ID_BASE as usize - 1;

/// Scripted combatants waiting to be added once `due` is reached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingSpawn {
    pub due: f64,
    pub count: u32,
}

/// Room statistics for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    pub tick: u64,
    pub uptime_secs: f64,
    pub speed_multiplier: f32,
    pub total_combatants: usize,
    pub alive_combatants: usize,
    pub scripted_combatants: usize,
    pub active_projectiles: usize,
    pub total_kills: u64,
    pub total_deaths: u64,
    pub total_shots_fired: u64,
}

/// Room state (owned by the room loop, shared behind a lock)
pub struct RoomState {
    pub room_id: String,
    pub width: f32,
    pub height: f32,
    pub obstacles: Vec<Obstacle>,
    /// Ordered by id so every scan is stable
    pub combatants: BTreeMap<CombatantId, Combatant>,
    pub projectiles: Vec<Projectile>,
    pub tick: u64,
    /// Simulation time in seconds
    pub clock: f64,
    pub speed_multiplier: f32,
    pub scripted: Option<ScriptedConfig>,
    pub pending_scripted: Vec<PendingSpawn>,
    pub rng: ChaCha8Rng,
    pub total_kills: u64,
    pub total_deaths: u64,
    pub total_shots_fired: u64,
    next_external_id: CombatantId,
    next_scripted_id: CombatantId,
    next_projectile_id: ProjectileId,
}

impl RoomState {
    pub fn new(room_id: impl Into<String>, arena: &ArenaConfig, seed: u64) -> Self {
        Self {
            room_id: room_id.into(),
            width: arena.width,
            height: arena.height,
            obstacles: build_obstacles(arena),
            combatants: BTreeMap::new(),
            projectiles: Vec::new(),
            tick: 0,
            clock: 0.0,
            speed_multiplier: 1.0,
            scripted: None,
            pending_scripted: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            total_kills: 0,
            total_deaths: 0,
            total_shots_fired: 0,
            next_external_id: 1,
            next_scripted_id: SCRIPTED_ID_BASE,
            next_projectile_id: 1,
        }
    }

    pub fn with_scripted(mut self, scripted: Option<ScriptedConfig>) -> Self {
        self.scripted = scripted;
        self
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Add a combatant at a freshly searched spawn point.
    /// `None` only when every id in the combatant's range is taken.
    pub fn add_combatant(&mut self, participant_id: &str, name: &str, scripted: bool) -> Option<CombatantId> {
        let id = if scripted {
            self.allocate_scripted_id()?
        } else {
            self.allocate_external_id()?
        };
        let position = self.find_spawn_point();

        let (participant_id, controller) = if scripted {
            (
                format!("scripted-{}", id),
                Controller::Scripted(WanderState::default()),
            )
        } else {
            (participant_id.to_string(), Controller::External)
        };

        let combatant = Combatant::new(id, participant_id, name.to_string(), position, controller);
        self.combatants.insert(id, combatant);
        Some(id)
    }

    /// Add one scripted combatant unless the room's scripted cap is reached
    pub fn add_scripted(&mut self) -> Option<CombatantId> {
        if self.scripted_count() >= self.scripted_cap() {
            return None;
        }
        let next = self.next_scripted_id;
        self.add_combatant("", &format!("Dummy #{}", next), true)
    }

    /// Upper bound on scripted combatants present plus pending
    pub fn scripted_cap(&self) -> usize {
        self.scripted.map(|s| s.cap as usize).unwrap_or(usize::MAX)
    }

    /// Scripted combatants scheduled but not yet added
    pub fn pending_scripted_count(&self) -> usize {
        self.pending_scripted.iter().map(|p| p.count as usize).sum()
    }

    pub fn remove_combatant(&mut self, id: CombatantId) -> Option<Combatant> {
        self.combatants.remove(&id)
    }

    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.get(&id)
    }

    pub fn combatant_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.combatants.get_mut(&id)
    }

    pub fn add_projectile(&mut self, owner_id: CombatantId, position: Vec2, velocity: Vec2) -> ProjectileId {
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        self.projectiles
            .push(Projectile::new(id, owner_id, position, velocity, self.clock));
        self.total_shots_fired += 1;
        id
    }

    pub fn remove_projectile(&mut self, id: ProjectileId) -> bool {
        let before = self.projectiles.len();
        self.projectiles.retain(|p| p.id != id);
        self.projectiles.len() != before
    }

    /// Count combatants in the Alive state
    pub fn alive_count(&self) -> usize {
        self.combatants
            .values()
            .filter(|c| c.lifecycle.is_alive())
            .count()
    }

    pub fn scripted_count(&self) -> usize {
        self.combatants.values().filter(|c| c.is_scripted()).count()
    }

    /// Combatants bound to connected participants
    pub fn external_count(&self) -> usize {
        self.combatants.len() - self.scripted_count()
    }

    /// Whether enough combatants are present for real observations
    pub fn is_active(&self) -> bool {
        self.combatants.len() >= MIN_ACTIVE_COMBATANTS
    }

    /// Circle fits inside the arena and clears every obstacle
    pub fn is_position_clear(&self, position: Vec2, radius: f32) -> bool {
        if position.x - radius < 0.0 || position.x + radius > self.width {
            return false;
        }
        if position.y - radius < 0.0 || position.y + radius > self.height {
            return false;
        }
        !self
            .obstacles
            .iter()
            .any(|o| circle_intersects_rect(position, radius, o))
    }

    /// Grid search for a clear spawn point, falling back to the arena centre
    pub fn find_spawn_point(&mut self) -> Vec2 {
        let cols = (self.width / SPAWN_GRID_STEP).floor() as usize;
        let rows = (self.height / SPAWN_GRID_STEP).floor() as usize;
        let total = cols * rows;
        if total == 0 {
            return self.center();
        }

        let start = self.rng.gen_range(0..total);
        let candidate = |k: usize| {
            let idx = (start + k) % total;
            Vec2::new(
                ((idx % cols) as f32 + 0.5) * SPAWN_GRID_STEP,
                ((idx / cols) as f32 + 0.5) * SPAWN_GRID_STEP,
            )
        };

        // First pass keeps away from other combatants too
        for k in 0..total {
            let point = candidate(k);
            if self.is_position_clear(point, SPAWN_CLEARANCE) && !self.overlaps_combatant(point) {
                return point;
            }
        }

        for k in 0..total {
            let point = candidate(k);
            if self.is_position_clear(point, SPAWN_CLEARANCE) {
                return point;
            }
        }

        self.center()
    }

    fn overlaps_combatant(&self, point: Vec2) -> bool {
        self.combatants
            .values()
            .filter(|c| !c.lifecycle.is_dead())
            .any(|c| circles_overlap(point, SPAWN_CLEARANCE, c.position, c.radius))
    }

    /// True iff the segment a-b crosses no obstacle edge
    pub fn has_line_of_sight(&self, a: Vec2, b: Vec2) -> bool {
        !self
            .obstacles
            .iter()
            .any(|o| segment_intersects_rect(a, b, o))
    }

    /// Nearest Alive combatant owned by a different participant.
    /// Ties keep the lowest id.
    pub fn nearest_enemy(&self, id: CombatantId) -> Option<&Combatant> {
        let me = self.combatants.get(&id)?;
        let mut nearest: Option<(&Combatant, f32)> = None;

        for other in self.combatants.values() {
            if other.id == id
                || other.participant_id == me.participant_id
                || !other.lifecycle.is_alive()
            {
                continue;
            }
            let distance = me.position.distance(other.position);
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((other, distance));
            }
        }

        nearest.map(|(c, _)| c)
    }

    /// Assemble the observation for a combatant
    pub fn observation_for(&self, id: CombatantId) -> Option<Observation> {
        let me = self.combatants.get(&id)?;

        let (nearest_enemy_pos, nearest_enemy_health, has_line_of_sight) =
            match self.nearest_enemy(id) {
                Some(enemy) => (
                    enemy.position,
                    enemy.health,
                    self.has_line_of_sight(me.position, enemy.position),
                ),
                None => (Vec2::ZERO, 0.0, false),
            };

        let projectiles = self
            .projectiles
            .iter()
            .filter(|p| p.position.distance(me.position) <= OBSERVATION_RADIUS)
            .map(|p| p.position)
            .collect();

        Some(Observation {
            tick: self.tick,
            self_pos: me.position,
            self_health: me.health,
            nearest_enemy_pos,
            nearest_enemy_health,
            projectiles,
            obstacles: self.obstacles_flat(),
            has_line_of_sight,
            arena_width: self.width,
            arena_height: self.height,
        })
    }

    /// Neutral observation sent while the room is under-populated
    pub fn waiting_observation_for(&self, id: CombatantId) -> Option<Observation> {
        let me = self.combatants.get(&id)?;
        Some(Observation {
            tick: self.tick,
            self_pos: me.position,
            self_health: me.health,
            nearest_enemy_pos: Vec2::ZERO,
            nearest_enemy_health: 0.0,
            projectiles: Vec::new(),
            obstacles: self.obstacles_flat(),
            has_line_of_sight: false,
            arena_width: self.width,
            arena_height: self.height,
        })
    }

    pub fn obstacles_flat(&self) -> Vec<f32> {
        self.obstacles
            .iter()
            .flat_map(|o| [o.x, o.y, o.width, o.height])
            .collect()
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            tick: self.tick,
            uptime_secs: self.clock,
            speed_multiplier: self.speed_multiplier,
            total_combatants: self.combatants.len(),
            alive_combatants: self.alive_count(),
            scripted_combatants: self.scripted_count(),
            active_projectiles: self.projectiles.len(),
            total_kills: self.total_kills,
            total_deaths: self.total_deaths,
            total_shots_fired: self.total_shots_fired,
        }
    }

    /// Ids 1..SCRIPTED_ID_BASE, wrapping; gives up after one full cycle
    fn allocate_external_id(&mut self) -> Option<CombatantId> {
        for _ in 1..SCRIPTED_ID_BASE {
            let id = self.next_external_id;
            self.next_external_id = if id + 1 >= SCRIPTED_ID_BASE { 1 } else { id + 1 };
            if !self.combatants.contains_key(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Ids from SCRIPTED_ID_BASE upward, wrapping back to it
    fn allocate_scripted_id(&mut self) -> Option<CombatantId> {
        // Scanning one more id than the population always reaches a free one
        for _ in 0..=self.combatants.len() {
            let id = self.next_scripted_id;
            self.next_scripted_id = id.checked_add(1).unwrap_or(SCRIPTED_ID_BASE);
            if !self.combatants.contains_key(&id) {
                return Some(id);
            }
        }
        None
    }
}

/// Boundary walls plus configured (or default) interior obstacles
fn build_obstacles(arena: &ArenaConfig) -> Vec<Obstacle> {
    let (w, h) = (arena.width, arena.height);
    let mut obstacles = vec![
        Obstacle::new(0.0, 0.0, w, WALL_THICKNESS),
        Obstacle::new(0.0, h - WALL_THICKNESS, w, WALL_THICKNESS),
        Obstacle::new(0.0, 0.0, WALL_THICKNESS, h),
        Obstacle::new(w - WALL_THICKNESS, 0.0, WALL_THICKNESS, h),
    ];

    match &arena.obstacles {
        Some(configured) => obstacles.extend(configured.iter().copied()),
        None => {
            let (cx, cy) = (w / 2.0, h / 2.0);
            obstacles.push(Obstacle::new(cx - 60.0, cy - 15.0, 120.0, 30.0));
            obstacles.push(Obstacle::new(cx - 15.0, cy - 80.0, 30.0, 160.0));
        }
    }

    obstacles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combatant::Lifecycle;

    fn arena_with(obstacles: Vec<Obstacle>) -> ArenaConfig {
        ArenaConfig {
            width: 800.0,
            height: 600.0,
            obstacles: Some(obstacles),
        }
    }

    fn place(room: &mut RoomState, id: CombatantId, x: f32, y: f32) {
        room.combatant_mut(id).unwrap().position = Vec2::new(x, y);
    }

    #[test]
    fn test_boundary_walls_always_present() {
        let room = RoomState::new("r", &arena_with(vec![]), 1);
        assert_eq!(room.obstacles.len(), 4);

        let room = RoomState::new("r", &ArenaConfig::default(), 1);
        assert_eq!(room.obstacles.len(), 6);
    }

    #[test]
    fn test_spawn_avoids_obstacle() {
        let obstacle = Obstacle::new(300.0, 200.0, 120.0, 30.0);
        for seed in 0..20 {
            let mut room = RoomState::new("arena1", &arena_with(vec![obstacle]), seed);
            let id = room.add_combatant("p1", "Alpha", false).unwrap();
            let pos = room.combatant(id).unwrap().position;
            assert!(!circle_intersects_rect(pos, SPAWN_CLEARANCE, &obstacle));
            assert!(room.is_position_clear(pos, SPAWN_CLEARANCE));
        }
    }

    #[test]
    fn test_spawn_falls_back_to_center() {
        let blocker = Obstacle::new(0.0, 0.0, 800.0, 600.0);
        let mut room = RoomState::new("r", &arena_with(vec![blocker]), 3);
        let id = room.add_combatant("p1", "Alpha", false).unwrap();
        assert_eq!(room.combatant(id).unwrap().position, Vec2::new(400.0, 300.0));
    }

    #[test]
    fn test_id_ranges_are_disjoint() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        let a = room.add_combatant("p1", "A", false).unwrap();
        let b = room.add_combatant("p2", "B", false).unwrap();
        let s = room.add_combatant("", "Dummy", true).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert!(s >= SCRIPTED_ID_BASE);
        assert!(room.combatant(s).unwrap().participant_id.starts_with("scripted-"));
    }

    #[test]
    fn test_exhausted_external_range_returns_none() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        for id in 1..SCRIPTED_ID_BASE {
            let combatant = Combatant::new(
                id,
                format!("p{}", id),
                "Filler".to_string(),
                Vec2::new(400.0, 300.0),
                Controller::External,
            );
            room.combatants.insert(id, combatant);
        }
        assert_eq!(room.external_count(), MAX_EXTERNAL_COMBATANTS);

        assert_eq!(room.add_combatant("late", "Late", false), None);
        // Scripted range is unaffected
        assert!(room.add_combatant("", "Dummy", true).unwrap() >= SCRIPTED_ID_BASE);

        room.remove_combatant(4321);
        assert_eq!(room.add_combatant("late", "Late", false), Some(4321));
    }

    #[test]
    fn test_scripted_cap() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1).with_scripted(Some(
            ScriptedConfig {
                initial: 1,
                replacements: 2,
                cap: 2,
            },
        ));
        assert!(room.add_scripted().is_some());
        assert!(room.add_scripted().is_some());
        assert!(room.add_scripted().is_none());
        assert_eq!(room.scripted_count(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        let id = room.add_combatant("p1", "A", false).unwrap();
        assert!(room.remove_combatant(id).is_some());
        assert!(room.remove_combatant(id).is_none());

        let pid = room.add_projectile(id, Vec2::new(50.0, 50.0), Vec2::ZERO);
        assert!(room.remove_projectile(pid));
        assert!(!room.remove_projectile(pid));
    }

    #[test]
    fn test_observation_without_enemy_uses_zero_sentinel() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        let id = room.add_combatant("p1", "A", false).unwrap();
        let obs = room.observation_for(id).unwrap();
        assert_eq!(obs.nearest_enemy_pos, Vec2::ZERO);
        assert_eq!(obs.nearest_enemy_health, 0.0);
        assert!(!obs.has_line_of_sight);
        assert_eq!(obs.obstacles.len(), 16);
        assert_eq!(obs.arena_width, 800.0);
    }

    #[test]
    fn test_nearest_enemy_selection() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        let me = room.add_combatant("p1", "Me", false).unwrap();
        let far = room.add_combatant("p2", "Far", false).unwrap();
        let near = room.add_combatant("p3", "Near", false).unwrap();
        let dead = room.add_combatant("p4", "Dead", false).unwrap();
        let teammate = room.add_combatant("p1", "Mine", false).unwrap();
        place(&mut room, me, 100.0, 100.0);
        place(&mut room, far, 600.0, 100.0);
        place(&mut room, near, 300.0, 100.0);
        place(&mut room, dead, 120.0, 100.0);
        place(&mut room, teammate, 110.0, 100.0);
        room.combatant_mut(dead).unwrap().lifecycle = Lifecycle::Dead { since: 0.0 };

        assert_eq!(room.nearest_enemy(me).unwrap().id, near);
        let obs = room.observation_for(me).unwrap();
        assert_eq!(obs.nearest_enemy_pos, Vec2::new(300.0, 100.0));
        assert!(obs.has_line_of_sight);
    }

    #[test]
    fn test_nearest_enemy_tie_keeps_scan_order() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        let me = room.add_combatant("p1", "Me", false).unwrap();
        let first = room.add_combatant("p2", "First", false).unwrap();
        let second = room.add_combatant("p3", "Second", false).unwrap();
        place(&mut room, me, 400.0, 300.0);
        place(&mut room, first, 300.0, 300.0);
        place(&mut room, second, 500.0, 300.0);
        assert_eq!(room.nearest_enemy(me).unwrap().id, first);
    }

    #[test]
    fn test_line_of_sight_blocked_by_obstacle() {
        let mut room = RoomState::new("r", &arena_with(vec![Obstacle::new(300.0, 200.0, 120.0, 30.0)]), 1);
        let a = room.add_combatant("p1", "A", false).unwrap();
        let b = room.add_combatant("p2", "B", false).unwrap();
        place(&mut room, a, 360.0, 100.0);
        place(&mut room, b, 360.0, 400.0);
        assert!(!room.has_line_of_sight(Vec2::new(360.0, 100.0), Vec2::new(360.0, 400.0)));
        assert!(!room.observation_for(a).unwrap().has_line_of_sight);
    }

    #[test]
    fn test_observation_limits_projectiles_by_radius() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        let me = room.add_combatant("p1", "Me", false).unwrap();
        place(&mut room, me, 100.0, 100.0);
        room.add_projectile(99, Vec2::new(200.0, 100.0), Vec2::ZERO);
        room.add_projectile(99, Vec2::new(700.0, 500.0), Vec2::ZERO);
        let obs = room.observation_for(me).unwrap();
        assert_eq!(obs.projectiles, vec![Vec2::new(200.0, 100.0)]);
    }

    #[test]
    fn test_waiting_observation_is_neutral() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        let me = room.add_combatant("p1", "Me", false).unwrap();
        let other = room.add_combatant("p2", "Other", false).unwrap();
        place(&mut room, other, 200.0, 200.0);
        room.add_projectile(other, Vec2::new(210.0, 200.0), Vec2::ZERO);

        let obs = room.waiting_observation_for(me).unwrap();
        assert_eq!(obs.nearest_enemy_pos, Vec2::ZERO);
        assert!(obs.projectiles.is_empty());
        assert!(!obs.has_line_of_sight);
    }

    #[test]
    fn test_activity_threshold() {
        let mut room = RoomState::new("r", &arena_with(vec![]), 1);
        room.add_combatant("p1", "A", false).unwrap();
        assert!(!room.is_active());
        room.add_combatant("p2", "B", false).unwrap();
        assert!(room.is_active());
    }
}
