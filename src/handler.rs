// ====================================================================================
// src/handler.rs - WebSocket 连接与消息分发
// ====================================================================================
use crate::{
    error::GameError,
    hub::Notifier,
    models::{ClientMessage, ConnectionId, ServerMessage, Submission},
    orchestrator::ActionOutcome,
    state::AppState,
};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

// RAII Guard for connection counting
struct ConnectionGuard {
    count: Arc<AtomicU32>,
}

impl ConnectionGuard {
    fn new(count: Arc<AtomicU32>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self { count }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }
}

impl TryFrom<Message> for ClientMessage {
    type Error = Option<serde_json::Error>;

    // 非文本帧返回 Err(None)，直接忽略
    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        match msg {
            Message::Text(text) => serde_json::from_str(&text).map_err(Some),
            _ => Err(None),
        }
    }
}

// 处理单个WebSocket连接
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let _conn_guard = ConnectionGuard::new(state.total_connections.clone());
    let conn_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.outbound_buffer);
    state.hub.register(conn_id, tx);
    tracing::debug!(%conn_id, "connection opened");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
        match ClientMessage::try_from(msg) {
            Ok(client_msg) => dispatch(&state, conn_id, client_msg).await,
            Err(Some(e)) => state.hub.send_to(
                &conn_id,
                ServerMessage::Error { code: "BAD_MESSAGE".to_string(), message: e.to_string() },
            ),
            Err(None) => {}
        }
    }

    // 断线等同于主动离开
    leave_room(&state, conn_id).await;
    state.hub.unregister(&conn_id);
    writer.abort();
    tracing::debug!(%conn_id, "connection closed");
}

/// Runs one client request and pushes the resulting notifications.
pub async fn dispatch(state: &AppState, conn_id: ConnectionId, message: ClientMessage) {
    let result = match message {
        ClientMessage::CreateRoom { room_name } => create_room(state, conn_id, &room_name).await,
        ClientMessage::JoinRoom { room_name, player_name } => {
            join_room(state, conn_id, &room_name, &player_name).await
        }
        ClientMessage::LeaveRoom => {
            leave_room(state, conn_id).await;
            Ok(())
        }
        ClientMessage::GetAvailableRooms => {
            let rooms = state.orchestrator.list_rooms().await;
            state.hub.send_to(&conn_id, ServerMessage::AvailableRooms { rooms });
            Ok(())
        }
        ClientMessage::SubmitSentence { sentence } => submit_sentence(state, conn_id, sentence).await,
        ClientMessage::UpdateCurrentSentence { words } => {
            if let Err(e) = state.orchestrator.update_draft(&conn_id, words).await {
                tracing::debug!(%conn_id, "draft update ignored: {}", e);
            }
            Ok(())
        }
        ClientMessage::CastVote { voted_player_name } => state
            .orchestrator
            .cast_vote(&conn_id, &voted_player_name)
            .await
            .map(|outcome| publish(state, outcome)),
        ClientMessage::ReadyUp => state
            .orchestrator
            .ready_up(&conn_id)
            .await
            .map(|outcome| publish(state, outcome)),
        ClientMessage::GetGameState => {
            let snapshot = state.orchestrator.round_state(&conn_id).await;
            state.hub.send_to(&conn_id, ServerMessage::GameState(snapshot));
            Ok(())
        }
        ClientMessage::SendMessage { message } => send_chat(state, conn_id, message),
    };

    if let Err(e) = result {
        tracing::debug!(%conn_id, code = e.code(), "request failed: {}", e);
        state.hub.send_to(
            &conn_id,
            ServerMessage::Error { code: e.code().to_string(), message: e.to_string() },
        );
    }
}

async fn create_room(state: &AppState, conn_id: ConnectionId, room_name: &str) -> Result<(), GameError> {
    let room = state.orchestrator.create_room(room_name)?;
    state.hub.send_to(&conn_id, ServerMessage::RoomCreated { room });
    broadcast_rooms(state).await;
    Ok(())
}

async fn join_room(
    state: &AppState,
    conn_id: ConnectionId,
    room_name: &str,
    player_name: &str,
) -> Result<(), GameError> {
    // 先入组，加入过程中触发的房间广播也能送达
    let group = room_name.trim();
    state.hub.add_to_group(conn_id, group);
    let outcome = match state.orchestrator.join(conn_id, room_name, player_name).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let still_member = state
                .orchestrator
                .binding(&conn_id)
                .is_some_and(|p| p.room_name == group);
            if !still_member {
                state.hub.remove_from_group(&conn_id, group);
            }
            return Err(e);
        }
    };
    let room = outcome.player.room_name.clone();

    state
        .hub
        .broadcast_to_room(&room, ServerMessage::PlayersUpdated { players: outcome.players });
    state.hub.send_to(
        &conn_id,
        ServerMessage::JoinedRoom {
            player_info: outcome.player,
            game_state: outcome.snapshot.clone(),
        },
    );
    if outcome.changed {
        state
            .hub
            .broadcast_to_room(&room, ServerMessage::GameStateUpdated(outcome.snapshot));
    }
    broadcast_rooms(state).await;
    Ok(())
}

pub async fn leave_room(state: &AppState, conn_id: ConnectionId) {
    let outcome = state.orchestrator.leave(&conn_id).await;
    let Some(player) = outcome.player else { return };

    state.hub.remove_from_group(&conn_id, &player.room_name);
    if outcome.room_deleted {
        tracing::debug!(%conn_id, room = %player.room_name, "last player gone, room group dropped");
    }
    if let Some(players) = outcome.remaining_players {
        state
            .hub
            .broadcast_to_room(&player.room_name, ServerMessage::PlayersUpdated { players });
    }
    if let (true, Some(snapshot)) = (outcome.changed, outcome.snapshot) {
        state
            .hub
            .broadcast_to_room(&player.room_name, ServerMessage::GameStateUpdated(snapshot));
    }
    broadcast_rooms(state).await;
}

async fn submit_sentence(state: &AppState, conn_id: ConnectionId, sentence: Submission) -> Result<(), GameError> {
    let outcome = state.orchestrator.submit_sentence(&conn_id, sentence).await?;
    publish(state, outcome);
    Ok(())
}

fn send_chat(state: &AppState, conn_id: ConnectionId, message: String) -> Result<(), GameError> {
    if message.trim().is_empty() {
        return Ok(());
    }
    let player = state.orchestrator.binding(&conn_id).ok_or(GameError::NotInRoom)?;
    state.hub.broadcast_to_room(
        &player.room_name,
        ServerMessage::ReceiveMessage { player_name: player.player_name, message },
    );
    Ok(())
}

fn publish(state: &AppState, outcome: ActionOutcome) {
    if outcome.changed {
        state
            .hub
            .broadcast_to_room(&outcome.room, ServerMessage::GameStateUpdated(outcome.snapshot));
    }
}

pub async fn broadcast_rooms(state: &AppState) {
    let rooms = state.orchestrator.list_rooms().await;
    state.hub.broadcast_to_all(ServerMessage::AvailableRoomsUpdated { rooms });
}
