//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::lobby::registry::Binding;
use crate::util::time::observation_interval;
use crate::ws::protocol::ServerMsg;
use crate::ws::session::{Inbound, SyncSession};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Participant id used at registration
    pub participant_id: String,
}

/// WebSocket upgrade handler. The participant must already be registered.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(binding) = state.registry.binding(&query.participant_id) else {
        warn!(participant_id = %query.participant_id, "WebSocket upgrade for unregistered participant");
        return (StatusCode::NOT_FOUND, "Participant is not registered").into_response();
    };
    let Some(room) = state.registry.room_handle(&binding.room_id) else {
        error!(room_id = %binding.room_id, "Bound room is not running");
        return (StatusCode::SERVICE_UNAVAILABLE, "Room is not running").into_response();
    };

    let session = SyncSession::new(query.participant_id, binding.combatant_id, room);
    ws.on_upgrade(move |socket| handle_socket(socket, session, binding, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, session: SyncSession, binding: Binding, state: AppState) {
    let connection_id = Uuid::new_v4();
    let participant_id = session.participant_id().to_string();
    let (mut ws_sink, ws_stream) = socket.split();

    // One streaming connection per participant
    if !state.registry.attach_session(&participant_id, connection_id) {
        warn!(%connection_id, participant_id = %participant_id, "Participant already has a live connection");
        let refusal = ServerMsg::Error {
            code: "already_connected".to_string(),
            message: "Another connection is already streaming for this participant".to_string(),
        };
        let _ = send_msg(&mut ws_sink, &refusal).await;
        let _ = ws_sink.close().await;
        return;
    }

    info!(
        %connection_id,
        participant_id = %participant_id,
        combatant_id = session.combatant_id(),
        "New WebSocket connection"
    );

    match send_msg(&mut ws_sink, &session.welcome()).await {
        Ok(()) => run_session(connection_id, session, ws_sink, ws_stream).await,
        Err(e) => error!(%connection_id, error = %e, "Failed to send welcome"),
    }

    // Cleanup on disconnect; a newer registration for this participant is kept
    state.registry.detach_session(&participant_id, connection_id);
    state.registry.leave_binding(&participant_id, &binding);

    info!(%connection_id, participant_id = %participant_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection_id: Uuid,
    session: SyncSession,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
) {
    let session = std::sync::Arc::new(session);

    // Replies (pong) are routed through the writer so the sink has one owner
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMsg>(16);

    // Spawn writer task: room state -> WebSocket at a fixed rate
    let writer_session = session.clone();
    let writer_handle = tokio::spawn(async move {
        let mut ticker = interval(observation_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(msg) = writer_session.outbound() else {
                        debug!(%connection_id, "Combatant removed, stopping writer");
                        break;
                    };
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(%connection_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(msg) = reply else { break };
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(%connection_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> room action queue
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                match session.inbound_text(&text) {
                    Inbound::Queued | Inbound::Ignored => {}
                    Inbound::Dropped(reason) => {
                        debug!(%connection_id, ?reason, "Dropped client message");
                    }
                    Inbound::Reply(msg) => {
                        if reply_tx.try_send(msg).is_err() {
                            debug!(%connection_id, "Reply channel full");
                        }
                    }
                    Inbound::Leave => {
                        info!(%connection_id, "Client requested leave");
                        break;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(%connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(%connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(%connection_id, error = %e, "WebSocket error");
                break;
            }
        }

        if writer_handle.is_finished() {
            break;
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
