// ====================================================================================
// src/orchestrator.rs - 房间与回合编排
// ====================================================================================
//! The authoritative engine behind every room operation.
//!
//! Lock order: the session registry is touched before a room lock is taken or
//! after it is released, never while waiting for one. Inside a room lock the
//! scheduler map may be touched. Nothing awaits a room lock while holding a
//! directory, registry or scheduler map reference.
//!
//! Every mutating call returns a snapshot taken under the lock. Broadcasting
//! is left to the caller, except for timer-driven transitions, which notify
//! the room themselves once the lock is released.

use crate::{
    config::GameConfig,
    directory::{RoomDirectory, RoomEntry},
    error::GameError,
    hub::Notifier,
    models::{
        ConnectionId, Phase, PlayerInfo, Room, RoomSummary, RoundStateSnapshot, ServerMessage,
        Submission,
    },
    round::{Deadline, RoundState},
    scheduler::RoundScheduler,
    session::SessionRegistry,
    words::{assemble, WordBank},
};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub player: PlayerInfo,
    pub snapshot: RoundStateSnapshot,
    pub players: Vec<String>,
    // 是否启动了开局倒计时
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LeaveOutcome {
    pub player: Option<PlayerInfo>,
    pub changed: bool,
    pub snapshot: Option<RoundStateSnapshot>,
    pub remaining_players: Option<Vec<String>>,
    pub room_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub room: String,
    pub snapshot: RoundStateSnapshot,
    pub changed: bool,
}

pub struct RoomOrchestrator {
    config: GameConfig,
    words: WordBank,
    directory: RoomDirectory,
    sessions: SessionRegistry,
    scheduler: RoundScheduler,
    notifier: Arc<dyn Notifier>,
}

fn non_blank(value: &str, what: &str) -> Result<String, GameError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GameError::InvalidInput(format!("{what} must not be blank")));
    }
    Ok(trimmed.to_string())
}

impl RoomOrchestrator {
    pub fn new(config: GameConfig, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new(Self {
            words: WordBank::new(config.words_per_round),
            config,
            directory: RoomDirectory::new(),
            sessions: SessionRegistry::new(),
            scheduler: RoundScheduler::new(),
            notifier,
        })
    }

    // ------------------------------------------------------------ 房间目录

    pub fn create_room(&self, name: &str) -> Result<RoomSummary, GameError> {
        let name = non_blank(name, "Room name")?;
        let room = Room::new(name, self.config.max_players);
        let summary = room.summary();
        self.directory.create(room, RoundState::new(self.words.draw()))?;
        tracing::info!(room = %summary.name, "room created");
        Ok(summary)
    }

    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms = Vec::with_capacity(self.directory.len());
        for entry in self.directory.entries() {
            let guard = entry.lock().await;
            if !guard.closed {
                rooms.push(guard.room.summary());
            }
        }
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    pub async fn room(&self, name: &str) -> Option<RoomSummary> {
        let entry = self.directory.get(name)?;
        let guard = entry.lock().await;
        (!guard.closed).then(|| guard.room.summary())
    }

    pub fn binding(&self, conn_id: &ConnectionId) -> Option<PlayerInfo> {
        self.sessions.lookup(conn_id)
    }

    // ------------------------------------------------------------ 加入 / 离开

    pub async fn join(
        self: &Arc<Self>,
        conn_id: ConnectionId,
        room_name: &str,
        player_name: &str,
    ) -> Result<JoinOutcome, GameError> {
        let info = PlayerInfo {
            player_name: non_blank(player_name, "Player name")?,
            room_name: non_blank(room_name, "Room name")?,
        };

        // 先占用绑定，失败时再释放
        self.sessions.bind(conn_id, info.clone())?;
        let result = self.join_room(info).await;
        if result.is_err() {
            self.sessions.unbind(&conn_id);
        }
        result
    }

    async fn join_room(self: &Arc<Self>, info: PlayerInfo) -> Result<JoinOutcome, GameError> {
        let not_found = || GameError::NotFound(info.room_name.clone());
        let entry = self.directory.get(&info.room_name).ok_or_else(not_found)?;
        let mut guard = entry.lock().await;
        let RoomEntry { room, round, closed } = &mut *guard;

        if *closed {
            return Err(not_found());
        }
        if room.is_full() {
            return Err(GameError::RoomFull);
        }
        if room.contains(&info.player_name) {
            return Err(GameError::NameTaken(info.player_name.clone()));
        }
        room.players.push(info.player_name.clone());
        tracing::info!(room = %room.name, player = %info.player_name, "player joined ({}/{})", room.players.len(), room.max_players);

        let changed = match round.start_countdown(room.players.len(), Utc::now()) {
            Some(deadline) => {
                tracing::info!(room = %room.name, "room reached {} players, starting countdown", room.players.len());
                self.arm(&room.name, deadline);
                true
            }
            None => false,
        };

        Ok(JoinOutcome {
            snapshot: round.snapshot(&self.config.timings),
            players: room.players.clone(),
            player: info,
            changed,
        })
    }

    /// Unbinds the connection and removes its player. Also used on disconnect.
    pub async fn leave(self: &Arc<Self>, conn_id: &ConnectionId) -> LeaveOutcome {
        let Some(info) = self.sessions.unbind(conn_id) else {
            return LeaveOutcome::default();
        };
        let Some(entry) = self.directory.get(&info.room_name) else {
            return LeaveOutcome { player: Some(info), ..Default::default() };
        };

        let mut guard = entry.lock().await;
        let RoomEntry { room, round, closed } = &mut *guard;
        if *closed || !room.remove(&info.player_name) {
            return LeaveOutcome { player: Some(info), ..Default::default() };
        }
        tracing::info!(room = %room.name, player = %info.player_name, "player left");

        if room.players.is_empty() {
            *closed = true;
            self.scheduler.cancel(&room.name);
            self.directory.remove(&room.name, &entry);
            tracing::info!(room = %room.name, "room is empty, removed");
            return LeaveOutcome { player: Some(info), room_deleted: true, ..Default::default() };
        }

        let mut changed = round.prune_player(&info.player_name);
        if round.abort_countdown(room.players.len()) {
            tracing::info!(room = %room.name, "player count dropped below 2, countdown cancelled");
            self.scheduler.cancel(&room.name);
            changed = true;
        }
        // 离开者可能是唯一还未完成当前阶段的人
        if let Some(deadline) = self.advance_if_complete(room, round, Utc::now()) {
            self.arm(&room.name, deadline);
            changed = true;
        }

        LeaveOutcome {
            player: Some(info),
            changed,
            snapshot: Some(round.snapshot(&self.config.timings)),
            remaining_players: Some(room.players.clone()),
            room_deleted: false,
        }
    }

    // ------------------------------------------------------------ 玩家操作

    pub async fn submit_sentence(
        self: &Arc<Self>,
        conn_id: &ConnectionId,
        submission: Submission,
    ) -> Result<ActionOutcome, GameError> {
        let (info, mut guard) = self.member(conn_id).await?;
        let RoomEntry { room, round, .. } = &mut *guard;

        let sentence = match submission {
            Submission::Text(text) => text,
            Submission::Chips(chips) => assemble(&chips),
        };
        round.submit(&info.player_name, sentence)?;
        tracing::debug!(room = %room.name, player = %info.player_name, "sentence submitted");

        if let Some(deadline) = self.advance_if_complete(room, round, Utc::now()) {
            self.arm(&room.name, deadline);
        }
        Ok(ActionOutcome { room: room.name.clone(), snapshot: round.snapshot(&self.config.timings), changed: true })
    }

    // 高频调用，不广播
    pub async fn update_draft(&self, conn_id: &ConnectionId, chips: Vec<String>) -> Result<(), GameError> {
        let (info, mut guard) = self.member(conn_id).await?;
        guard.round.update_draft(&info.player_name, chips);
        Ok(())
    }

    pub async fn cast_vote(
        self: &Arc<Self>,
        conn_id: &ConnectionId,
        target: &str,
    ) -> Result<ActionOutcome, GameError> {
        let (info, mut guard) = self.member(conn_id).await?;
        let RoomEntry { room, round, .. } = &mut *guard;

        round.cast_vote(&info.player_name, target.trim())?;
        tracing::debug!(room = %room.name, voter = %info.player_name, "vote cast");

        if let Some(deadline) = self.advance_if_complete(room, round, Utc::now()) {
            self.arm(&room.name, deadline);
        }
        Ok(ActionOutcome { room: room.name.clone(), snapshot: round.snapshot(&self.config.timings), changed: true })
    }

    pub async fn ready_up(self: &Arc<Self>, conn_id: &ConnectionId) -> Result<ActionOutcome, GameError> {
        let (info, mut guard) = self.member(conn_id).await?;
        let RoomEntry { room, round, .. } = &mut *guard;

        let mut changed = round.ready(&info.player_name)?;
        if let Some(deadline) = self.advance_if_complete(room, round, Utc::now()) {
            self.arm(&room.name, deadline);
            changed = true;
        }
        Ok(ActionOutcome { room: room.name.clone(), snapshot: round.snapshot(&self.config.timings), changed })
    }

    pub async fn round_state(&self, conn_id: &ConnectionId) -> Option<RoundStateSnapshot> {
        let (_, guard) = self.member(conn_id).await.ok()?;
        Some(guard.round.snapshot(&self.config.timings))
    }

    // 解析连接所在房间并持有房间锁
    async fn member(&self, conn_id: &ConnectionId) -> Result<(PlayerInfo, OwnedMutexGuard<RoomEntry>), GameError> {
        let info = self.sessions.require(conn_id)?;
        let entry = self.directory.get(&info.room_name).ok_or(GameError::NotInRoom)?;
        let guard = entry.lock_owned().await;
        if guard.closed || !guard.room.contains(&info.player_name) {
            return Err(GameError::NotInRoom);
        }
        Ok((info, guard))
    }

    // ------------------------------------------------------------ 状态机推进

    /// Moves to the next phase when every current player has finished this one.
    fn advance_if_complete(&self, room: &Room, round: &mut RoundState, now: DateTime<Utc>) -> Option<Deadline> {
        let timings = &self.config.timings;
        let players = &room.players;

        let next = if round.all_submitted(players) {
            round.start_voting(now, timings)
        } else if round.all_voted(players) {
            round.start_results(now, timings)
        } else if round.all_ready(players) {
            round.start_submitting(self.words.draw(), now, timings)
        } else {
            return None;
        };
        tracing::info!(room = %room.name, "all players done, moving to {}", next.phase);
        Some(next)
    }

    fn delay_for(&self, phase: Phase) -> Duration {
        let timings = &self.config.timings;
        match phase {
            Phase::Pending => timings.pending,
            Phase::Submitting => timings.submission,
            Phase::Voting => timings.voting,
            Phase::Results => timings.results,
        }
    }

    fn arm(self: &Arc<Self>, room: &str, deadline: Deadline) {
        let weak = Arc::downgrade(self);
        let room_name = room.to_string();
        let on_fire = async move {
            if let Some(this) = weak.upgrade() {
                this.on_deadline(room_name, deadline).await;
            }
        }
        .boxed();
        self.scheduler.arm(room, deadline, self.delay_for(deadline.phase), on_fire);
    }

    async fn on_deadline(self: Arc<Self>, room_name: String, deadline: Deadline) {
        let Some(entry) = self.directory.get(&room_name) else {
            tracing::debug!(room = %room_name, "timer fired for a removed room");
            return;
        };

        let snapshot = {
            let mut guard = entry.lock().await;
            let RoomEntry { room, round, closed } = &mut *guard;
            if *closed {
                return;
            }
            self.scheduler.release(&room_name, deadline);
            // 玩家操作已先一步推进了阶段
            if round.current_deadline() != Some(deadline) {
                tracing::debug!(room = %room_name, phase = %deadline.phase, "stale timer ignored");
                return;
            }

            let timings = &self.config.timings;
            let now = Utc::now();
            let next = match deadline.phase {
                Phase::Pending if room.players.len() >= 2 => {
                    Some(round.start_submitting(self.words.draw(), now, timings))
                }
                Phase::Pending => {
                    round.abort_countdown(room.players.len());
                    None
                }
                Phase::Submitting => {
                    round.auto_submit(&room.players);
                    Some(round.start_voting(now, timings))
                }
                Phase::Voting => Some(round.start_results(now, timings)),
                Phase::Results => Some(round.start_submitting(self.words.draw(), now, timings)),
            };

            match next {
                Some(next) => {
                    tracing::info!(room = %room_name, "{} timer expired, moving to {}", deadline.phase, next.phase);
                    self.arm(&room_name, next);
                }
                None => tracing::info!(room = %room_name, "countdown expired with too few players"),
            }
            round.snapshot(timings)
        };

        self.notifier
            .broadcast_to_room(&room_name, ServerMessage::GameStateUpdated(snapshot));
    }
}
