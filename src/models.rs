// ====================================================================================
// src/models.rs - 数据模型定义
// ====================================================================================
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Pending,
    Submitting,
    Voting,
    Results,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "PENDING",
            Phase::Submitting => "SUBMITTING",
            Phase::Voting => "VOTING",
            Phase::Results => "RESULTS",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// 房间成员信息
#[derive(Debug, Clone)]
pub struct Room {
    pub name: String,
    pub players: Vec<String>,
    pub max_players: usize,
}

impl Room {
    pub fn new(name: String, max_players: usize) -> Self {
        Self { name, players: Vec::new(), max_players }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn contains(&self, player: &str) -> bool {
        self.players.iter().any(|p| p == player)
    }

    // 返回是否真的移除了
    pub fn remove(&mut self, player: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p != player);
        self.players.len() != before
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            name: self.name.clone(),
            players: self.players.clone(),
            max_players: self.max_players,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub name: String,
    pub players: Vec<String>,
    pub max_players: usize,
}

// 连接绑定的玩家身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub player_name: String,
    pub room_name: String,
}

/// What clients see of a room's round. Deadlines are absolute UTC instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStateSnapshot {
    pub current_phase: Phase,
    pub available_words: Vec<String>,
    pub round_start_time: Option<DateTime<Utc>>,
    pub pending_end_time: Option<DateTime<Utc>>,
    pub submission_end_time: Option<DateTime<Utc>>,
    pub voting_end_time: Option<DateTime<Utc>>,
    pub results_end_time: Option<DateTime<Utc>>,
    pub submitted_players: BTreeSet<String>,
    pub submitted_sentences: BTreeMap<String, String>,
    pub votes: BTreeMap<String, u32>,
    pub voted_players: BTreeSet<String>,
    pub winners: BTreeSet<String>,
    pub ready_players: BTreeSet<String>,
}

// 提交内容：整句文本或词块列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Submission {
    Text(String),
    Chips(Vec<String>),
}

// 客户端 -> 服务器
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    CreateRoom { room_name: String },
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_name: String, player_name: String },
    LeaveRoom,
    GetAvailableRooms,
    SubmitSentence { sentence: Submission },
    UpdateCurrentSentence { words: Vec<String> },
    #[serde(rename_all = "camelCase")]
    CastVote { voted_player_name: String },
    ReadyUp,
    GetGameState,
    SendMessage { message: String },
}

// 服务器 -> 客户端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    RoomCreated { room: RoomSummary },
    AvailableRooms { rooms: Vec<RoomSummary> },
    AvailableRoomsUpdated { rooms: Vec<RoomSummary> },
    #[serde(rename_all = "camelCase")]
    JoinedRoom { player_info: PlayerInfo, game_state: RoundStateSnapshot },
    PlayersUpdated { players: Vec<String> },
    GameStateUpdated(RoundStateSnapshot),
    GameState(Option<RoundStateSnapshot>),
    #[serde(rename_all = "camelCase")]
    ReceiveMessage { player_name: String, message: String },
    Error { code: String, message: String },
}

// HTTP 请求模型
#[derive(Deserialize)]
pub struct CreateRoomRequest {
    pub room_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_use_type_and_payload() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "JoinRoom",
            "payload": { "roomName": "R", "playerName": "A" }
        }))
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::JoinRoom { ref room_name, ref player_name } if room_name == "R" && player_name == "A"
        ));

        let msg: ClientMessage = serde_json::from_value(json!({ "type": "ReadyUp" })).unwrap();
        assert!(matches!(msg, ClientMessage::ReadyUp));
    }

    #[test]
    fn submission_accepts_text_or_chips() {
        let text: ClientMessage = serde_json::from_value(json!({
            "type": "SubmitSentence",
            "payload": { "sentence": "the fox" }
        }))
        .unwrap();
        assert!(matches!(
            text,
            ClientMessage::SubmitSentence { sentence: Submission::Text(ref s) } if s == "the fox"
        ));

        let chips: ClientMessage = serde_json::from_value(json!({
            "type": "SubmitSentence",
            "payload": { "sentence": ["un-", "happy"] }
        }))
        .unwrap();
        assert!(matches!(
            chips,
            ClientMessage::SubmitSentence { sentence: Submission::Chips(ref c) } if c.len() == 2
        ));
    }

    #[test]
    fn error_message_shape() {
        let value = serde_json::to_value(ServerMessage::Error {
            code: "ROOM_FULL".into(),
            message: "Room is full".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "type": "Error", "payload": { "code": "ROOM_FULL", "message": "Room is full" } })
        );
    }

    #[test]
    fn room_membership_helpers() {
        let mut room = Room::new("R".into(), 2);
        room.players.push("A".into());
        assert!(room.contains("A"));
        assert!(!room.is_full());
        room.players.push("B".into());
        assert!(room.is_full());
        assert!(room.remove("A"));
        assert!(!room.remove("A"));
        assert_eq!(room.summary().players, vec!["B".to_string()]);
    }
}
