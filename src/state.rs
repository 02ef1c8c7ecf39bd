// ====================================================================================
// src/state.rs - 共享应用状态
// ====================================================================================
use crate::{config::Config, hub::Hub, orchestrator::RoomOrchestrator};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

pub struct AppState {
    pub orchestrator: Arc<RoomOrchestrator>,
    pub hub: Arc<Hub>,
    pub total_connections: Arc<AtomicU32>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let hub = Arc::new(Hub::new());
        // 定时器触发的状态变化也经由 hub 推送
        let orchestrator = RoomOrchestrator::new(config.game.clone(), hub.clone());
        Arc::new(Self {
            orchestrator,
            hub,
            total_connections: Arc::new(AtomicU32::new(0)),
            config,
        })
    }
}
