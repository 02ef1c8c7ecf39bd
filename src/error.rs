// ====================================================================================
// src/error.rs - 自定义错误类型
// ====================================================================================
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Room '{0}' already exists")]
    AlreadyExists(String),
    #[error("Room '{0}' not found")]
    NotFound(String),
    #[error("Room is full")]
    RoomFull,
    #[error("Player name '{0}' is already taken in this room")]
    NameTaken(String),
    #[error("Not allowed during the {0} phase")]
    WrongPhase(&'static str),
    #[error("You cannot vote for yourself")]
    SelfVote,
    #[error("You have already voted")]
    AlreadyVoted,
    #[error("Cannot vote for '{0}': no sentence was submitted")]
    InvalidTarget(String),
    #[error("Connection is not in a room")]
    NotInRoom,
    #[error("Connection has already joined a room")]
    AlreadyJoined,
}

impl GameError {
    // 客户端用来区分错误的稳定代码
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidInput(_) => "INVALID_INPUT",
            GameError::AlreadyExists(_) => "ALREADY_EXISTS",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::RoomFull => "ROOM_FULL",
            GameError::NameTaken(_) => "NAME_TAKEN",
            GameError::WrongPhase(_) => "WRONG_PHASE",
            GameError::SelfVote => "SELF_VOTE",
            GameError::AlreadyVoted => "ALREADY_VOTED",
            GameError::InvalidTarget(_) => "INVALID_TARGET",
            GameError::NotInRoom => "NOT_IN_ROOM",
            GameError::AlreadyJoined => "ALREADY_JOINED",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GameError::InvalidInput(_) | GameError::SelfVote | GameError::InvalidTarget(_) => {
                StatusCode::BAD_REQUEST
            }
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::NotInRoom => StatusCode::FORBIDDEN,
            GameError::AlreadyExists(_)
            | GameError::RoomFull
            | GameError::NameTaken(_)
            | GameError::WrongPhase(_)
            | GameError::AlreadyVoted
            | GameError::AlreadyJoined => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(code = self.code(), "request rejected: {}", self);
        let body = Json(json!({ "error": self.to_string(), "code": self.code() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            GameError::NotFound("R".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GameError::AlreadyExists("R".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GameError::InvalidInput("blank".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(GameError::SelfVote.code(), "SELF_VOTE");
        assert_eq!(GameError::WrongPhase("VOTING").code(), "WRONG_PHASE");
        assert_eq!(
            GameError::WrongPhase("VOTING").to_string(),
            "Not allowed during the VOTING phase"
        );
    }
}
