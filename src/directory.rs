// ====================================================================================
// src/directory.rs - 房间目录
// ====================================================================================
use crate::{
    error::GameError,
    models::Room,
    round::RoundState,
};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

// 一把锁同时保护房间成员与回合状态
#[derive(Debug)]
pub struct RoomEntry {
    pub room: Room,
    pub round: RoundState,
    // 房间已被删除；持有旧引用的请求据此返回 NotFound
    pub closed: bool,
}

pub type SharedRoom = Arc<Mutex<RoomEntry>>;

#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: DashMap<String, SharedRoom>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, room: Room, round: RoundState) -> Result<SharedRoom, GameError> {
        match self.rooms.entry(room.name.clone()) {
            Entry::Occupied(_) => Err(GameError::AlreadyExists(room.name)),
            Entry::Vacant(slot) => {
                let entry = Arc::new(Mutex::new(RoomEntry { room, round, closed: false }));
                slot.insert(entry.clone());
                Ok(entry)
            }
        }
    }

    // 只克隆 Arc，不要跨 await 持有 DashMap 引用
    pub fn get(&self, name: &str) -> Option<SharedRoom> {
        self.rooms.get(name).map(|entry| entry.value().clone())
    }

    /// Removes `name` only if it still maps to `entry`.
    pub fn remove(&self, name: &str, entry: &SharedRoom) -> bool {
        self.rooms
            .remove_if(name, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    pub fn entries(&self) -> Vec<SharedRoom> {
        self.rooms.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }
}
