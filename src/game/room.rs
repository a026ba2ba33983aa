//! Per-room authoritative tick loop

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::ws::protocol::Action;

use super::physics;
use super::room_state::RoomState;
use super::snapshot::RoomSnapshot;
use super::{CombatantId, QueuedAction, RoomEvent};

/// Capacity of each room's action queue
pub const ACTION_QUEUE_CAPACITY: usize = 256;

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Arc<str>,
    pub state: Arc<Mutex<RoomState>>,
    input_tx: mpsc::Sender<QueuedAction>,
}

impl RoomHandle {
    /// Queue an action for the next tick without waiting.
    /// Returns false when the queue is full or the loop has stopped.
    pub fn queue_action(&self, combatant_id: CombatantId, action: Action) -> bool {
        self.input_tx
            .try_send(QueuedAction {
                combatant_id,
                action,
            })
            .is_ok()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::capture(&self.state.lock())
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_active()
    }
}

/// The authoritative loop for one room
pub struct RoomLoop {
    id: Arc<str>,
    state: Arc<Mutex<RoomState>>,
    input_rx: mpsc::Receiver<QueuedAction>,
}

impl RoomLoop {
    pub fn new(state: RoomState) -> (Self, RoomHandle) {
        let (input_tx, input_rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        let id: Arc<str> = Arc::from(state.room_id.as_str());
        let state = Arc::new(Mutex::new(state));

        let handle = RoomHandle {
            id: id.clone(),
            state: state.clone(),
            input_tx,
        };

        (Self { id, state, input_rx }, handle)
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(room_id = %self.id, "Room loop started");

        let shared = self.state.clone();
        let mut last_tick = Instant::now();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let period = {
                let state = shared.lock();
                physics::tick_period(state.alive_count(), state.speed_multiplier)
            };

            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let now = Instant::now();
            let elapsed = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;

            let events = {
                let mut state = shared.lock();
                let mut events = self.process_inputs(&mut state);

                // Empty rooms don't simulate
                if !state.combatants.is_empty() {
                    let dt = elapsed * state.speed_multiplier;
                    events.extend(physics::update(&mut state, dt));
                }
                events
            };

            self.log_events(&events);
        }

        info!(room_id = %self.id, "Room loop stopped");
    }

    /// Drain queued actions; they apply before this tick's integration
    fn process_inputs(&mut self, state: &mut RoomState) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        let active = state.is_active();

        while let Ok(queued) = self.input_rx.try_recv() {
            if !active {
                continue;
            }
            if let Some(event) = physics::apply_action(state, queued.combatant_id, &queued.action) {
                events.push(event);
            }
        }

        events
    }

    fn log_events(&self, events: &[RoomEvent]) {
        for event in events {
            match event {
                RoomEvent::Shot {
                    shooter_id,
                    projectile_id,
                } => {
                    debug!(room_id = %self.id, shooter_id, projectile_id, "Shot fired");
                }
                RoomEvent::Hit {
                    shooter_id,
                    target_id,
                    damage,
                } => {
                    debug!(room_id = %self.id, shooter_id, target_id, damage, "Hit registered");
                }
                RoomEvent::Kill {
                    killer_id,
                    victim_id,
                } => {
                    info!(room_id = %self.id, killer_id, victim_id, "Combatant killed");
                }
                RoomEvent::Respawned { combatant_id, x, y } => {
                    info!(room_id = %self.id, combatant_id, x, y, "Combatant respawned");
                }
                RoomEvent::Vulnerable { combatant_id } => {
                    debug!(room_id = %self.id, combatant_id, "Invulnerability ended");
                }
                RoomEvent::ScriptedSpawned { combatant_id } => {
                    info!(room_id = %self.id, combatant_id, "Scripted combatant spawned");
                }
            }
        }
    }
}
