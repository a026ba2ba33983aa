//! Room registry - admission control and participant bindings

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::rooms::{RoomConfig, RoomsConfig};
use crate::game::combatant::Lifecycle;
use crate::game::room_state::MIN_ACTIVE_COMBATANTS;
use crate::game::snapshot::RoomSnapshot;
use crate::game::{CombatantId, Engine, RoomHandle, RoomLoop, RoomState};

/// Display names are cut to this many characters
pub const MAX_NAME_CHARS: usize = 16;
/// Longest accepted participant id
pub const MAX_PARTICIPANT_ID_LEN: usize = 64;
/// Bounds for a room's time-scale multiplier
pub const MIN_SPEED_MULTIPLIER: f32 = 0.25;
pub const MAX_SPEED_MULTIPLIER: f32 = 8.0;

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct JoinRequest {
    pub participant_id: String,
    pub display_name: String,
    pub room_id: String,
    #[serde(default)]
    pub room_password: String,
}

/// Successful registration
#[derive(Debug, Clone, Serialize)]
pub struct JoinAccepted {
    pub combatant_id: CombatantId,
    pub room: RoomInfo,
}

/// Admission failures. None of them mutate registry state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JoinError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Participant {participant_id} is already in a room")]
    DuplicateParticipant { participant_id: String },

    #[error("Room '{room_id}' not found")]
    RoomNotFound { room_id: String },

    #[error("Invalid password for room '{room_id}'")]
    BadPassword { room_id: String },

    #[error("Room '{room_id}' is full ({capacity} participants)")]
    RoomFull { room_id: String, capacity: usize },
}

impl JoinError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            JoinError::InvalidRequest(_) => "invalid_request",
            JoinError::DuplicateParticipant { .. } => "duplicate_participant",
            JoinError::RoomNotFound { .. } => "room_not_found",
            JoinError::BadPassword { .. } => "bad_password",
            JoinError::RoomFull { .. } => "room_full",
        }
    }
}

/// Read-only projection of one configured room
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    pub room_id: String,
    /// Whether the room has been created by a first join
    pub materialized: bool,
    pub password_protected: bool,
    pub participants: usize,
    pub capacity: usize,
    pub combatants: usize,
    pub alive: usize,
    pub scripted: usize,
    pub active: bool,
    pub required: usize,
    pub tick: u64,
    pub speed_multiplier: f32,
    pub arena_width: f32,
    pub arena_height: f32,
    pub created_at: Option<DateTime<Utc>>,
}

/// Where a participant's combatant lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub room_id: String,
    pub combatant_id: CombatantId,
}

/// Per-participant combat record
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantStats {
    pub participant_id: String,
    pub room_id: String,
    pub combatant_id: CombatantId,
    pub name: String,
    pub kills: u32,
    pub deaths: u32,
    /// Kills per death; equals kills while deaths is zero
    pub kd_ratio: f32,
    pub health: f32,
    pub lifecycle: Lifecycle,
}

/// A materialized room and the task running it
struct RoomSlot {
    config: RoomConfig,
    handle: RoomHandle,
    task: Mutex<Option<JoinHandle<()>>>,
    created_at: DateTime<Utc>,
}

/// Registry of configured rooms and participant bindings
pub struct RoomRegistry {
    config: RoomsConfig,
    rooms: DashMap<String, Arc<RoomSlot>>,
    bindings: DashMap<String, Binding>,
    /// Participant id -> the one connection streaming for it
    sessions: DashMap<String, Uuid>,
    engine: Engine,
}

impl RoomRegistry {
    pub fn new(config: RoomsConfig) -> Self {
        Self {
            config,
            rooms: DashMap::new(),
            bindings: DashMap::new(),
            sessions: DashMap::new(),
            engine: Engine::new(),
        }
    }

    /// Admit a participant into a configured room
    pub fn join(&self, request: JoinRequest) -> Result<JoinAccepted, JoinError> {
        let participant_id = sanitize_participant_id(&request.participant_id)
            .ok_or_else(|| JoinError::InvalidRequest("participant_id is required".to_string()))?;
        let name = sanitize_name(&request.display_name)
            .ok_or_else(|| JoinError::InvalidRequest("display_name is required".to_string()))?;
        let room_id = request.room_id.trim().to_string();
        if room_id.is_empty() {
            return Err(JoinError::InvalidRequest("room_id is required".to_string()));
        }

        // Holding the vacant entry serializes concurrent joins for this participant
        let binding_entry = match self.bindings.entry(participant_id.clone()) {
            Entry::Occupied(_) => {
                return Err(JoinError::DuplicateParticipant { participant_id });
            }
            Entry::Vacant(vacant) => vacant,
        };

        let config = self
            .config
            .get(&room_id)
            .ok_or_else(|| JoinError::RoomNotFound {
                room_id: room_id.clone(),
            })?;
        if config.password != request.room_password {
            return Err(JoinError::BadPassword { room_id });
        }

        let (slot, created) = self.materialize(&room_id, config);

        let combatant_id = {
            let mut state = slot.handle.state.lock();
            if state.external_count() >= config.max_participants {
                return Err(JoinError::RoomFull {
                    room_id,
                    capacity: config.max_participants,
                });
            }

            let id = state
                .add_combatant(&participant_id, &name, false)
                .ok_or_else(|| JoinError::RoomFull {
                    room_id: room_id.clone(),
                    capacity: config.max_participants,
                })?;
            if created {
                let initial = config.scripted.map(|s| s.initial).unwrap_or(0);
                for _ in 0..initial {
                    state.add_scripted();
                }
            }
            id
        };

        binding_entry.insert(Binding {
            room_id: room_id.clone(),
            combatant_id,
        });

        info!(
            room_id = %room_id,
            participant_id = %participant_id,
            combatant_id,
            "Participant joined room"
        );

        let room = self.info_for(&room_id, config, Some(&slot));
        Ok(JoinAccepted { combatant_id, room })
    }

    /// Unbind a participant and remove its combatant. Rooms persist.
    pub fn leave(&self, participant_id: &str) -> bool {
        match self.bindings.remove(participant_id) {
            Some((_, binding)) => {
                self.release(participant_id, &binding);
                true
            }
            None => false,
        }
    }

    /// Like `leave`, but only while the participant is still bound to `expected`.
    /// A newer registration under the same participant id is left alone.
    pub fn leave_binding(&self, participant_id: &str, expected: &Binding) -> bool {
        match self
            .bindings
            .remove_if(participant_id, |_, current| current == expected)
        {
            Some((_, binding)) => {
                self.release(participant_id, &binding);
                true
            }
            None => false,
        }
    }

    /// Claim the participant's single streaming slot for a connection
    pub fn attach_session(&self, participant_id: &str, connection_id: Uuid) -> bool {
        match self.sessions.entry(participant_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(connection_id);
                true
            }
        }
    }

    /// Release the streaming slot if `connection_id` still holds it
    pub fn detach_session(&self, participant_id: &str, connection_id: Uuid) {
        self.sessions
            .remove_if(participant_id, |_, current| *current == connection_id);
    }

    fn release(&self, participant_id: &str, binding: &Binding) {
        match self.slot(&binding.room_id) {
            Some(slot) => {
                slot.handle.state.lock().remove_combatant(binding.combatant_id);
            }
            None => {
                warn!(room_id = %binding.room_id, "Binding pointed at a missing room");
            }
        }

        info!(
            room_id = %binding.room_id,
            participant_id = %participant_id,
            combatant_id = binding.combatant_id,
            "Participant left room"
        );
    }

    pub fn binding(&self, participant_id: &str) -> Option<Binding> {
        self.bindings.get(participant_id).map(|b| b.value().clone())
    }

    /// Handle to a materialized room
    pub fn room_handle(&self, room_id: &str) -> Option<RoomHandle> {
        self.slot(room_id).map(|slot| slot.handle.clone())
    }

    /// Projection of a configured room, materialized or not
    pub fn room_info(&self, room_id: &str) -> Option<RoomInfo> {
        let config = self.config.get(room_id)?;
        let slot = self.slot(room_id);
        Some(self.info_for(room_id, config, slot.as_ref()))
    }

    /// Every configured room, ordered by id
    pub fn all_rooms(&self) -> Vec<RoomInfo> {
        self.config
            .iter()
            .map(|(room_id, config)| {
                let slot = self.slot(room_id);
                self.info_for(room_id, config, slot.as_ref())
            })
            .collect()
    }

    pub fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.slot(room_id).map(|slot| slot.handle.snapshot())
    }

    pub fn participant_stats(&self, participant_id: &str) -> Option<ParticipantStats> {
        let binding = self.binding(participant_id)?;
        let slot = self.slot(&binding.room_id)?;
        let state = slot.handle.state.lock();
        let combatant = state.combatant(binding.combatant_id)?;

        let kd_ratio = if combatant.deaths == 0 {
            combatant.kills as f32
        } else {
            combatant.kills as f32 / combatant.deaths as f32
        };

        Some(ParticipantStats {
            participant_id: participant_id.to_string(),
            room_id: binding.room_id.clone(),
            combatant_id: combatant.id,
            name: combatant.name.clone(),
            kills: combatant.kills,
            deaths: combatant.deaths,
            kd_ratio,
            health: combatant.health,
            lifecycle: combatant.lifecycle,
        })
    }

    /// Set a room's time-scale multiplier, clamped into range.
    /// Returns the applied value, or None when the room isn't running.
    pub fn set_speed(&self, room_id: &str, multiplier: f32) -> Option<f32> {
        let slot = self.slot(room_id)?;
        let applied = if multiplier.is_finite() {
            multiplier.clamp(MIN_SPEED_MULTIPLIER, MAX_SPEED_MULTIPLIER)
        } else {
            1.0
        };
        slot.handle.state.lock().speed_multiplier = applied;
        info!(room_id = %room_id, speed_multiplier = applied, "Room speed changed");
        Some(applied)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_participants(&self) -> usize {
        self.bindings.len()
    }

    /// Stop every room loop and wait for them to finish
    pub async fn shutdown(&self) {
        self.engine.shutdown();

        let tasks: Vec<(String, JoinHandle<()>)> = self
            .rooms
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .task
                    .lock()
                    .take()
                    .map(|task| (entry.key().clone(), task))
            })
            .collect();

        for (room_id, task) in tasks {
            if let Err(e) = task.await {
                warn!(room_id = %room_id, error = %e, "Room loop ended abnormally");
            }
        }

        info!("All room loops stopped");
    }

    fn slot(&self, room_id: &str) -> Option<Arc<RoomSlot>> {
        self.rooms.get(room_id).map(|slot| slot.value().clone())
    }

    /// Get the room's slot, creating it and spawning its loop on first use
    fn materialize(&self, room_id: &str, config: &RoomConfig) -> (Arc<RoomSlot>, bool) {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                let state = RoomState::new(room_id, &config.arena, rand::random::<u64>())
                    .with_scripted(config.scripted);
                let (room_loop, handle) = RoomLoop::new(state);
                let task = self.engine.spawn_room(room_loop);

                let slot = Arc::new(RoomSlot {
                    config: config.clone(),
                    handle,
                    task: Mutex::new(Some(task)),
                    created_at: Utc::now(),
                });
                vacant.insert(slot.clone());

                info!(room_id = %room_id, "Room materialized");
                (slot, true)
            }
        }
    }

    fn info_for(&self, room_id: &str, config: &RoomConfig, slot: Option<&Arc<RoomSlot>>) -> RoomInfo {
        let mut info = RoomInfo {
            room_id: room_id.to_string(),
            materialized: false,
            password_protected: !config.password.is_empty(),
            participants: 0,
            capacity: config.max_participants,
            combatants: 0,
            alive: 0,
            scripted: 0,
            active: false,
            required: MIN_ACTIVE_COMBATANTS,
            tick: 0,
            speed_multiplier: 1.0,
            arena_width: config.arena.width,
            arena_height: config.arena.height,
            created_at: None,
        };

        if let Some(slot) = slot {
            let state = slot.handle.state.lock();
            info.materialized = true;
            info.capacity = slot.config.max_participants;
            info.participants = state.external_count();
            info.combatants = state.combatants.len();
            info.alive = state.alive_count();
            info.scripted = state.scripted_count();
            info.active = state.is_active();
            info.tick = state.tick;
            info.speed_multiplier = state.speed_multiplier;
            info.created_at = Some(slot.created_at);
        }

        info
    }
}

/// Trim, drop control characters, cap length. `None` if nothing remains.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn sanitize_participant_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    if id.is_empty() || id.len() > MAX_PARTICIPANT_ID_LEN || id.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(id.to_string())
}
