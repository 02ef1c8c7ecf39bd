// ====================================================================================
// src/main.rs - 应用入口
// ====================================================================================
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod directory;
mod error;
mod handler;
mod hub;
mod models;
mod orchestrator;
mod round;
mod routes;
mod scheduler;
mod session;
mod state;
mod words;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志记录
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "word_party=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env()?;
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!(
        max_players = config.game.max_players,
        words_per_round = config.game.words_per_round,
        "配置加载完成"
    );

    let app_state = AppState::new(config);
    let app = routes::router(app_state);

    // 启动服务器
    tracing::debug!("服务器正在监听于 {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
