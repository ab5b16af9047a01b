//! Configuration system for constellation nodes.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CONSTELLATION_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/constellation/config.toml
//!   3. ~/.config/constellation/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::identity::{default_device_name, is_known_function};
use crate::node::NodeId;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub gossip: GossipConfig,
    pub churn: ChurnConfig,
    pub routing: RoutingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Device name. Empty = "sat-<port>".
    pub name: String,
    /// Declared capability. Must be one of the known functions.
    pub function: String,
    /// Path to the X25519 private key. Auto-generated on first run.
    pub keypair_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address peers use to reach this node.
    pub ip: String,
    pub port: u16,
    /// Listen address for the HTTP server.
    pub bind: String,
    /// "http" or "https" for outbound peer requests.
    pub scheme: String,
    /// Peers commonly run self-signed certificates.
    pub accept_invalid_certs: bool,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessMode {
    /// One ICMP echo via the system `ping` binary.
    Ping,
    /// Address resolution only.
    Resolve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Hosts to scan.
    pub candidates: Vec<String>,
    pub min_port: u16,
    pub max_port: u16,
    /// Stop a scan after this many satellites are found.
    pub max_results: usize,
    pub interval_secs: u64,
    pub probe_timeout_ms: u64,
    /// Share of each scan held back for churn to promote later.
    pub pending_fraction: f64,
    /// Concurrent probes per scan.
    pub concurrency: usize,
    pub liveness: LivenessMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    pub heartbeat_interval_secs: u64,
    /// Neighbours silent for longer than this are dropped on the next push.
    pub liveness_timeout_secs: u64,
    /// Also blocklist neighbours dropped for staleness.
    pub blocklist_stale_neighbours: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    pub enabled: bool,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    /// Eviction only happens while more neighbours than this remain.
    pub min_neighbours: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Max path length for generated multi-hop routes.
    pub hop_bound: usize,
    /// Independent per-hop probability of a simulated failure.
    pub failure_probability: f64,
    pub max_alternate_attempts: u32,
    pub max_route_attempts: u32,
    /// Relayed messages are rejected once this many hops are recorded.
    pub relay_hop_ceiling: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// false = in-memory only.
    pub persist: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            function: "disaster-imaging".to_string(),
            keypair_path: config_dir().join("keypair"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 33001,
            bind: "0.0.0.0".to_string(),
            scheme: "http".to_string(),
            accept_invalid_certs: true,
            request_timeout_ms: 3000,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            candidates: vec!["127.0.0.1".to_string()],
            min_port: 33001,
            max_port: 33100,
            max_results: 5,
            interval_secs: 60,
            probe_timeout_ms: 1000,
            pending_fraction: 0.05,
            concurrency: 16,
            liveness: LivenessMode::Ping,
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            liveness_timeout_secs: 90,
            blocklist_stale_neighbours: false,
        }
    }
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 20,
            max_interval_secs: 30,
            min_neighbours: 1,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            hop_bound: 3,
            failure_probability: 0.2,
            max_alternate_attempts: 3,
            max_route_attempts: 3,
            relay_hop_ceiling: 16,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: data_dir(),
            persist: true,
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl NodeConfig {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.network.ip.clone(), self.network.port)
    }

    pub fn device_name(&self) -> String {
        if self.identity.name.is_empty() {
            default_device_name(self.network.port)
        } else {
            self.identity.name.clone()
        }
    }

    /// Per-node persistence directory: `<data_dir>/<ip>_<port>`.
    pub fn node_data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .join(format!("{}_{}", self.network.ip, self.network.port))
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl GossipConfig {
    pub fn liveness_window_ms(&self) -> u64 {
        self.liveness_timeout_secs.saturating_mul(1000)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("constellation")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("constellation")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            NodeConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CONSTELLATION_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&NodeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CONSTELLATION_* overrides, then the short legacy names
    /// (`PORT`, `IP`, `DEVICE_FUNCTION`) where the long form is unset.
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let long_or_short = |long: &str, short: &str| var(long).or_else(|| var(short));
        let flag = |v: String| v == "true" || v == "1";

        if let Some(v) = var("CONSTELLATION_IDENTITY__NAME") {
            self.identity.name = v;
        }
        if let Some(v) = long_or_short("CONSTELLATION_IDENTITY__FUNCTION", "DEVICE_FUNCTION") {
            self.identity.function = v;
        }
        if let Some(v) = var("CONSTELLATION_IDENTITY__KEYPAIR_PATH") {
            self.identity.keypair_path = PathBuf::from(v);
        }
        if let Some(v) = long_or_short("CONSTELLATION_NETWORK__IP", "IP") {
            self.network.ip = v;
        }
        if let Some(p) = long_or_short("CONSTELLATION_NETWORK__PORT", "PORT").and_then(|v| v.parse().ok()) {
            self.network.port = p;
        }
        if let Some(v) = var("CONSTELLATION_NETWORK__BIND") {
            self.network.bind = v;
        }
        if let Some(v) = var("CONSTELLATION_NETWORK__SCHEME") {
            self.network.scheme = v;
        }
        if let Some(v) = var("CONSTELLATION_DISCOVERY__CANDIDATES") {
            self.discovery.candidates = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(p) = var("CONSTELLATION_DISCOVERY__MIN_PORT").and_then(|v| v.parse().ok()) {
            self.discovery.min_port = p;
        }
        if let Some(p) = var("CONSTELLATION_DISCOVERY__MAX_PORT").and_then(|v| v.parse().ok()) {
            self.discovery.max_port = p;
        }
        if let Some(v) = var("CONSTELLATION_DISCOVERY__LIVENESS") {
            match v.as_str() {
                "ping" => self.discovery.liveness = LivenessMode::Ping,
                "resolve" => self.discovery.liveness = LivenessMode::Resolve,
                _ => {}
            }
        }
        if let Some(s) = var("CONSTELLATION_GOSSIP__HEARTBEAT_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.gossip.heartbeat_interval_secs = s;
        }
        if let Some(s) = var("CONSTELLATION_GOSSIP__LIVENESS_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.gossip.liveness_timeout_secs = s;
        }
        if let Some(v) = var("CONSTELLATION_CHURN__ENABLED") {
            self.churn.enabled = flag(v);
        }
        if let Some(h) = var("CONSTELLATION_ROUTING__HOP_BOUND").and_then(|v| v.parse().ok()) {
            self.routing.hop_bound = h;
        }
        if let Some(p) = var("CONSTELLATION_ROUTING__FAILURE_PROBABILITY").and_then(|v| v.parse().ok()) {
            self.routing.failure_probability = p;
        }
        if let Some(v) = var("CONSTELLATION_STORAGE__DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("CONSTELLATION_STORAGE__PERSIST") {
            self.storage.persist = flag(v);
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !is_known_function(&self.identity.function) {
            return invalid(format!("unknown function {:?}", self.identity.function));
        }
        if self.discovery.min_port > self.discovery.max_port {
            return invalid(format!(
                "discovery.min_port {} exceeds max_port {}",
                self.discovery.min_port, self.discovery.max_port
            ));
        }
        if self.routing.hop_bound == 0 {
            return invalid("routing.hop_bound must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.routing.failure_probability) {
            return invalid(format!(
                "routing.failure_probability {} outside [0, 1]",
                self.routing.failure_probability
            ));
        }
        if !(0.0..=1.0).contains(&self.discovery.pending_fraction) {
            return invalid(format!(
                "discovery.pending_fraction {} outside [0, 1]",
                self.discovery.pending_fraction
            ));
        }
        if self.churn.min_interval_secs > self.churn.max_interval_secs {
            return invalid(format!(
                "churn.min_interval_secs {} exceeds max_interval_secs {}",
                self.churn.min_interval_secs, self.churn.max_interval_secs
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_policy() {
        let config = NodeConfig::default();
        assert_eq!(config.network.port, 33001);
        assert_eq!(config.routing.hop_bound, 3);
        assert_eq!(config.gossip.liveness_timeout_secs, 90);
        assert_eq!(config.discovery.max_results, 5);
        assert!((config.routing.failure_probability - 0.2).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn long_env_names_win_over_short() {
        let mut config = NodeConfig::default();
        config.apply_env_overrides(env(&[
            ("PORT", "33010"),
            ("CONSTELLATION_NETWORK__PORT", "33020"),
            ("DEVICE_FUNCTION", "whale-tracking"),
            ("CONSTELLATION_DISCOVERY__CANDIDATES", "10.0.0.1, 10.0.0.2"),
        ]));
        assert_eq!(config.network.port, 33020);
        assert_eq!(config.identity.function, "whale-tracking");
        assert_eq!(config.discovery.candidates, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn device_name_falls_back_to_port() {
        let mut config = NodeConfig::default();
        config.network.port = 33042;
        assert_eq!(config.device_name(), "sat-33042");
        config.identity.name = "orbiter".to_string();
        assert_eq!(config.device_name(), "orbiter");
        assert!(config
            .node_data_dir()
            .ends_with(format!("{}_33042", config.network.ip)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.identity.function = "toaster".to_string();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.routing.hop_bound = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.routing.failure_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.churn.min_interval_secs = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let tmp = std::env::temp_dir().join(format!("constellation-config-test-{}", std::process::id()));
        let config_path = tmp.join("config.toml");
        std::fs::create_dir_all(&tmp).unwrap();

        unsafe {
            std::env::set_var("CONSTELLATION_CONFIG", config_path.to_str().unwrap());
        }

        let path = NodeConfig::write_default_if_missing().expect("write_default_if_missing failed");
        assert!(path.exists());

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, 33001);
        assert_eq!(parsed.discovery.liveness, LivenessMode::Ping);

        unsafe {
            std::env::remove_var("CONSTELLATION_CONFIG");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
