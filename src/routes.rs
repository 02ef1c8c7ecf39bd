// ====================================================================================
// src/routes.rs - HTTP路由处理
// ====================================================================================
use crate::{
    error::GameError,
    handler,
    models::{CreateRoomRequest, RoomSummary},
    state::AppState,
};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub fn router(state: Arc<AppState>) -> Router {
    // 定义CORS策略
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/:room_name", get(get_room))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors)
}

// 健康检查
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

// WebSocket处理器
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    // 负载保护检查
    if state.total_connections.load(Ordering::Relaxed) >= state.config.max_connections {
        tracing::warn!("connection limit reached, rejecting upgrade");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Server is at capacity", "code": "UNAVAILABLE" })),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handler::handle_socket(socket, state))
}

// 查询所有房间
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummary>> {
    Json(state.orchestrator.list_rooms().await)
}

// 查询单个房间
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_name): Path<String>,
) -> Result<Json<RoomSummary>, GameError> {
    state
        .orchestrator
        .room(&room_name)
        .await
        .map(Json)
        .ok_or(GameError::NotFound(room_name))
}

// 创建房间
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomSummary>), GameError> {
    let room = state.orchestrator.create_room(&payload.room_name)?;
    handler::broadcast_rooms(&state).await;
    Ok((StatusCode::CREATED, Json(room)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::ServerMessage;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn app() -> Arc<AppState> {
        AppState::new(Config::from_lookup(|_| None).unwrap())
    }

    #[tokio::test]
    async fn create_room_over_http_notifies_sockets() {
        let state = app();
        let (tx, mut rx) = mpsc::channel(8);
        state.hub.register(Uuid::new_v4(), tx);

        let (status, Json(room)) = create_room(
            State(state.clone()),
            Json(CreateRoomRequest { room_name: " Lobby ".into() }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(room.name, "Lobby");
        assert!(room.players.is_empty());

        match rx.try_recv().unwrap() {
            ServerMessage::AvailableRoomsUpdated { rooms } => assert_eq!(rooms, vec![room]),
            other => panic!("unexpected message {other:?}"),
        }

        let Json(rooms) = list_rooms(State(state.clone())).await;
        assert_eq!(rooms.len(), 1);

        let Json(lobby) = get_room(State(state.clone()), Path("Lobby".into())).await.unwrap();
        assert_eq!(lobby.max_players, 4);
        let missing = get_room(State(state), Path("Nope".into())).await.unwrap_err();
        assert_eq!(missing, GameError::NotFound("Nope".into()));
    }

    #[tokio::test]
    async fn duplicate_room_is_a_conflict() {
        let state = app();
        state.orchestrator.create_room("Lobby").unwrap();

        let err = create_room(
            State(state),
            Json(CreateRoomRequest { room_name: "Lobby".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
