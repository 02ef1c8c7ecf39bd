// ====================================================================================
// src/session.rs - 连接与玩家绑定
// ====================================================================================
use crate::{
    error::GameError,
    models::{ConnectionId, PlayerInfo},
};
use dashmap::{mapref::entry::Entry, DashMap};

/// Maps a live connection to the player and room it joined.
///
/// Never touched while a room lock is held: callers bind before locking the
/// room and unbind either before locking or after releasing it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    bindings: DashMap<ConnectionId, PlayerInfo>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, conn_id: ConnectionId, info: PlayerInfo) -> Result<(), GameError> {
        match self.bindings.entry(conn_id) {
            Entry::Occupied(_) => Err(GameError::AlreadyJoined),
            Entry::Vacant(slot) => {
                slot.insert(info);
                Ok(())
            }
        }
    }

    pub fn unbind(&self, conn_id: &ConnectionId) -> Option<PlayerInfo> {
        self.bindings.remove(conn_id).map(|(_, info)| info)
    }

    pub fn lookup(&self, conn_id: &ConnectionId) -> Option<PlayerInfo> {
        self.bindings.get(conn_id).map(|info| info.clone())
    }

    pub fn require(&self, conn_id: &ConnectionId) -> Result<PlayerInfo, GameError> {
        self.lookup(conn_id).ok_or(GameError::NotInRoom)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn info(player: &str) -> PlayerInfo {
        PlayerInfo { player_name: player.into(), room_name: "R".into() }
    }

    #[test]
    fn one_binding_per_connection() {
        let registry = SessionRegistry::new();
        let conn = Uuid::new_v4();

        registry.bind(conn, info("A")).unwrap();
        assert_eq!(registry.bind(conn, info("B")), Err(GameError::AlreadyJoined));
        assert_eq!(registry.lookup(&conn), Some(info("A")));

        assert_eq!(registry.unbind(&conn), Some(info("A")));
        assert_eq!(registry.unbind(&conn), None);
        assert_eq!(registry.require(&conn), Err(GameError::NotInRoom));
    }

    #[test]
    fn same_name_on_different_connections() {
        let registry = SessionRegistry::new();
        registry.bind(Uuid::new_v4(), info("A")).unwrap();
        registry.bind(Uuid::new_v4(), info("A")).unwrap();
        assert_eq!(registry.len(), 2);
    }
}
