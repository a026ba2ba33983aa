//! Per-connection protocol adapter between a socket and a room

use tracing::debug;

use crate::game::room_state::MIN_ACTIVE_COMBATANTS;
use crate::game::{CombatantId, RoomHandle};
use crate::util::rate_limit::ActionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Action queued for the next tick
    Queued,
    /// Room is waiting for players; action silently dropped
    Ignored,
    /// Dropped and logged
    Dropped(DropReason),
    /// Send this back to the client
    Reply(ServerMsg),
    /// Client asked to leave
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    RateLimited,
    Malformed,
    QueueFull,
}

/// One participant's view of its room
pub struct SyncSession {
    participant_id: String,
    combatant_id: CombatantId,
    room: RoomHandle,
    limiter: ActionRateLimiter,
}

impl SyncSession {
    pub fn new(participant_id: String, combatant_id: CombatantId, room: RoomHandle) -> Self {
        Self {
            participant_id,
            combatant_id,
            room,
            limiter: ActionRateLimiter::new(),
        }
    }

    #[cfg(test)]
    pub fn with_limiter(mut self, limiter: ActionRateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn combatant_id(&self) -> CombatantId {
        self.combatant_id
    }

    pub fn welcome(&self) -> ServerMsg {
        ServerMsg::Welcome {
            participant_id: self.participant_id.clone(),
            combatant_id: self.combatant_id,
            room_id: self.room.id.to_string(),
            server_time: unix_millis(),
        }
    }

    /// Message for the next send interval; `None` once the combatant is gone
    pub fn outbound(&self) -> Option<ServerMsg> {
        let state = self.room.state.lock();
        if state.is_active() {
            state
                .observation_for(self.combatant_id)
                .map(ServerMsg::Observation)
        } else {
            let combatants = state.combatants.len();
            state
                .waiting_observation_for(self.combatant_id)
                .map(|observation| ServerMsg::Waiting {
                    combatants,
                    required: MIN_ACTIVE_COMBATANTS,
                    observation,
                })
        }
    }

    /// Parse one text frame; unparseable input is answered with an error
    pub fn inbound_text(&self, text: &str) -> Inbound {
        match serde_json::from_str::<ClientMsg>(text) {
            Ok(msg) => self.inbound(msg),
            Err(e) => {
                debug!(participant_id = %self.participant_id, error = %e, "Unparseable client message");
                Inbound::Reply(ServerMsg::Error {
                    code: "malformed_message".to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    pub fn inbound(&self, msg: ClientMsg) -> Inbound {
        if !self.limiter.check() {
            debug!(participant_id = %self.participant_id, "Rate limited inbound message");
            return Inbound::Dropped(DropReason::RateLimited);
        }

        match msg {
            ClientMsg::Action(action) => {
                let Some(action) = action.sanitized() else {
                    debug!(participant_id = %self.participant_id, "Dropped non-finite action");
                    return Inbound::Dropped(DropReason::Malformed);
                };
                if !self.room.is_active() {
                    return Inbound::Ignored;
                }
                if self.room.queue_action(self.combatant_id, action) {
                    Inbound::Queued
                } else {
                    debug!(participant_id = %self.participant_id, "Room action queue full");
                    Inbound::Dropped(DropReason::QueueFull)
                }
            }
            ClientMsg::Ping { t } => Inbound::Reply(ServerMsg::Pong { t }),
            ClientMsg::Leave => Inbound::Leave,
        }
    }
}
