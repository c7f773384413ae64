//! Configuration system.
//!
//! Loads server configuration from JSON strings/files. Command-line flags
//! are applied on top by the binaries.

use std::{path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::rules::DEFAULT_TICK_MS;

/// How often a dead player in reach of an entity is told about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathPolicy {
    /// `death` is sent once, on the hit that takes health to zero. Dead
    /// players are no longer valid targets for collisions.
    #[default]
    Once,
    /// Dead players stay valid targets: every trigger in range sends
    /// `damage 0` followed by `death` again and restarts the cooldown.
    RepeatWhileInRange,
}

/// Accepts the same snake_case names as config files.
impl FromStr for DeathPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .with_context(|| format!("unknown death policy {s:?}"))
    }
}

/// Root server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Session listen address, e.g. `0.0.0.0:3000`.
    pub server_addr: String,
    /// Liveness endpoint address. Disabled when unset.
    #[serde(default)]
    pub health_addr: Option<String>,
    /// Fixed simulation period in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Number of NPC entities created at startup.
    #[serde(default = "default_entity_count")]
    pub entity_count: usize,
    /// Entities spawn with `x,z` in `[-entity_half_extent, entity_half_extent]`.
    #[serde(default = "default_entity_half_extent")]
    pub entity_half_extent: f32,
    /// Seed for spawn positions, speeds and usernames. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub death_policy: DeathPolicy,
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

fn default_entity_count() -> usize {
    5
}

fn default_entity_half_extent() -> f32 {
    20.0
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3000".to_string(),
            health_addr: None,
            tick_ms: default_tick_ms(),
            entity_count: default_entity_count(),
            entity_half_extent: default_entity_half_extent(),
            seed: None,
            death_policy: DeathPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Replaces the port of `server_addr`, keeping its host.
    pub fn set_port(&mut self, port: u16) {
        let host = self
            .server_addr
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or("0.0.0.0");
        self.server_addr = format!("{host}:{port}");
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Simulation seconds consumed by one tick.
    pub fn tick_delta(&self) -> f32 {
        self.tick_interval().as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_fills_defaults() {
        let cfg = ServerConfig::from_json_str(r#"{"server_addr":"0.0.0.0:4000"}"#).unwrap();
        assert_eq!(cfg.tick_ms, 16);
        assert_eq!(cfg.entity_count, 5);
        assert_eq!(cfg.death_policy, DeathPolicy::Once);
        assert!(cfg.health_addr.is_none());
        assert!((cfg.tick_delta() - 0.016).abs() < 1e-6);
    }

    #[test]
    fn death_policy_reads_snake_case() {
        let cfg = ServerConfig::from_json_str(
            r#"{"server_addr":"0.0.0.0:4000","death_policy":"repeat_while_in_range"}"#,
        )
        .unwrap();
        assert_eq!(cfg.death_policy, DeathPolicy::RepeatWhileInRange);
    }

    #[test]
    fn death_policy_parses_flag_values() {
        assert_eq!("once".parse::<DeathPolicy>().unwrap(), DeathPolicy::Once);
        assert_eq!(
            "repeat_while_in_range".parse::<DeathPolicy>().unwrap(),
            DeathPolicy::RepeatWhileInRange
        );
        assert!("repeat-while-in-range".parse::<DeathPolicy>().is_err());
        assert!("Once".parse::<DeathPolicy>().is_err());
    }

    #[test]
    fn set_port_keeps_host() {
        let mut cfg = ServerConfig::default();
        cfg.set_port(8080);
        assert_eq!(cfg.server_addr, "127.0.0.1:8080");
    }
}
