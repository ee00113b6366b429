use lodestone_protocol_v1_21::DEFAULT_PROTOCOL_VERSION;
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub username: String,
    /// Fixed UUID; otherwise derived offline-style from the username.
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default = "default_view_distance")]
    pub view_distance: i8,
}

#[derive(Debug, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_spawn_stagger_ms")]
    pub spawn_stagger_ms: u64,
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    25565
}

fn default_protocol_version() -> i32 {
    DEFAULT_PROTOCOL_VERSION
}

fn default_view_distance() -> i8 {
    8
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_spawn_stagger_ms() -> u64 {
    500
}

fn default_keep_alive_interval_ms() -> u64 {
    15_000
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            protocol_version: default_protocol_version(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            spawn_stagger_ms: default_spawn_stagger_ms(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 25565);
        assert_eq!(config.server.protocol_version, DEFAULT_PROTOCOL_VERSION);
        assert!(config.bots.is_empty());
        assert_eq!(config.supervisor.max_reconnect_attempts, 5);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "mc.example.net"
            port = 25570
            protocol_version = 772

            [[bots]]
            username = "lode-1"

            [[bots]]
            username = "lode-2"
            uuid = "f81d4fae-7dec-11d0-a765-00a0c91e6bf6"
            view_distance = 4

            [supervisor]
            reconnect_delay_ms = 1000
            max_reconnect_attempts = 2

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "mc.example.net");
        assert_eq!(config.bots.len(), 2);
        assert_eq!(config.bots[0].username, "lode-1");
        assert!(config.bots[0].uuid.is_none());
        assert_eq!(config.bots[1].view_distance, 4);
        assert!(config.bots[1].uuid.is_some());
        assert_eq!(config.supervisor.reconnect_delay_ms, 1000);
        assert_eq!(config.log.level, "debug");
    }
}
