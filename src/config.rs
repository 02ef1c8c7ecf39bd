// ====================================================================================
// src/config.rs - 配置管理
// ====================================================================================
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub max_connections: u32,
    // 每个连接的出站消息队列长度
    pub outbound_buffer: usize,
    pub game: GameConfig,
}

// 引擎只关心这部分配置
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub max_players: usize,
    pub words_per_round: usize,
    pub timings: RoundTimings,
}

/// Length of each timed phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundTimings {
    pub pending: Duration,
    pub submission: Duration,
    pub voting: Duration,
    pub results: Duration,
}

impl Default for RoundTimings {
    fn default() -> Self {
        Self {
            pending: Duration::from_secs(30),
            submission: Duration::from_secs(60),
            voting: Duration::from_secs(20),
            results: Duration::from_secs(30),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            words_per_round: 15,
            timings: RoundTimings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // 尝试加载 .env 文件，如果失败则忽略（可能文件不存在）
        if let Err(e) = dotenvy::dotenv() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // 从任意键值来源读取配置，便于测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let game = GameConfig {
            max_players: parse_or(&lookup, "MAX_PLAYERS_PER_ROOM", 4)?,
            words_per_round: parse_or(&lookup, "WORDS_PER_ROUND", 15)?,
            timings: RoundTimings {
                pending: Duration::from_secs(parse_or(&lookup, "PENDING_TIMER_SECONDS", 30)?),
                submission: Duration::from_secs(parse_or(&lookup, "SUBMISSION_TIMER_SECONDS", 60)?),
                voting: Duration::from_secs(parse_or(&lookup, "VOTING_TIMER_SECONDS", 20)?),
                results: Duration::from_secs(parse_or(&lookup, "RESULTS_TIMER_SECONDS", 30)?),
            },
        };

        if game.max_players == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_PLAYERS_PER_ROOM",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            max_connections: parse_or(&lookup, "MAX_CONNECTIONS", 10_000)?,
            outbound_buffer: parse_or(&lookup, "OUTBOUND_BUFFER", 64)?,
            game,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.game.max_players, 4);
        assert_eq!(config.game.words_per_round, 15);
        assert_eq!(config.game.timings, RoundTimings::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("MAX_PLAYERS_PER_ROOM", "6"),
            ("VOTING_TIMER_SECONDS", " 5 "),
            ("BIND_ADDRESS", "127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(config.game.max_players, 6);
        assert_eq!(config.game.timings.voting, Duration::from_secs(5));
        assert_eq!(config.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn garbage_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("SUBMISSION_TIMER_SECONDS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "SUBMISSION_TIMER_SECONDS", .. }
        ));

        assert!(Config::from_lookup(lookup_from(&[("MAX_PLAYERS_PER_ROOM", "0")])).is_err());
    }
}
