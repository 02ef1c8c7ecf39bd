// ====================================================================================
// src/hub.rs - 连接分组与广播
// ====================================================================================
use crate::models::{ConnectionId, ServerMessage};
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outbound side of the engine: pushes messages to a room or to everyone.
///
/// Implementations must not block; the orchestrator calls these after
/// releasing room locks, but often from inside a timer task.
pub trait Notifier: Send + Sync {
    fn broadcast_to_room(&self, room: &str, message: ServerMessage);
    fn broadcast_to_all(&self, message: ServerMessage);
}

// 所有在线连接及其所属房间分组
#[derive(Default)]
pub struct Hub {
    connections: DashMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    groups: DashMap<String, HashSet<ConnectionId>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn_id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.connections.insert(conn_id, sender);
    }

    pub fn unregister(&self, conn_id: &ConnectionId) {
        self.connections.remove(conn_id);
        self.groups.retain(|_, members| {
            members.remove(conn_id);
            !members.is_empty()
        });
    }

    pub fn add_to_group(&self, conn_id: ConnectionId, room: &str) {
        self.groups.entry(room.to_string()).or_default().insert(conn_id);
    }

    pub fn remove_from_group(&self, conn_id: &ConnectionId, room: &str) {
        self.groups.remove_if_mut(room, |_, members| {
            members.remove(conn_id);
            members.is_empty()
        });
    }

    pub fn send_to(&self, conn_id: &ConnectionId, message: ServerMessage) {
        let sender = self.connections.get(conn_id).map(|s| s.value().clone());
        if let Some(sender) = sender {
            deliver(conn_id, &sender, message);
        }
    }

    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // 先收集发送端，避免在投递时持有分片锁
    fn senders_for(&self, members: &[ConnectionId]) -> Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> {
        members
            .iter()
            .filter_map(|id| self.connections.get(id).map(|s| (*id, s.value().clone())))
            .collect()
    }
}

fn deliver(conn_id: &ConnectionId, sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    match sender.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::warn!(%conn_id, "outbound queue full, dropping message");
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(%conn_id, "connection already closed");
        }
    }
}

impl Notifier for Hub {
    fn broadcast_to_room(&self, room: &str, message: ServerMessage) {
        let members: Vec<ConnectionId> = self
            .groups
            .get(room)
            .map(|g| g.iter().copied().collect())
            .unwrap_or_default();
        for (conn_id, sender) in self.senders_for(&members) {
            deliver(&conn_id, &sender, message.clone());
        }
    }

    fn broadcast_to_all(&self, message: ServerMessage) {
        let members: Vec<ConnectionId> = self.connections.iter().map(|c| *c.key()).collect();
        for (conn_id, sender) in self.senders_for(&members) {
            deliver(&conn_id, &sender, message.clone());
        }
    }
}
