use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::layout::TreeLayout;

pub const ENV_CONTAINER: &str = "FACTORY_CNT";
pub const ENV_MOBIUS_BASE_URL: &str = "MOBIUS_BASE_URL";
pub const ENV_MOBIUS_ORIGIN: &str = "MOBIUS_ORIGIN";
pub const ENV_MOBIUS_ADMIN_ORIGIN: &str = "MOBIUS_ADMIN_ORIGIN";
pub const ENV_RCON_HOST: &str = "FACTORIO_RCON_HOST";
pub const ENV_RCON_PORT: &str = "FACTORIO_RCON_PORT";
pub const ENV_RCON_PASSWORD: &str = "FACTORIO_RCON_PASSWORD";
pub const ENV_SNAPSHOT_COMMAND: &str = "FACTORIO_SNAPSHOT_COMMAND";
pub const ENV_POLL_MS: &str = "FACTORIO_RCON_POLL_MS";
pub const ENV_MQTT_HOST: &str = "FACTORY_MQTT_HOST";
pub const ENV_MQTT_PORT: &str = "FACTORY_MQTT_PORT";
pub const ENV_MQTT_CLIENT_ID: &str = "FACTORIO_TAS_CLIENT_ID";
pub const ENV_AE_ID_FILE: &str = "FACTORY_AE_ID_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid resource tree layout: {0}")]
    InvalidLayout(String),
}

/// Effective configuration of one bridge process.
///
/// Every field has a default so a partial TOML file (or none at all) is
/// enough to start the bridge against a local Mobius and Factorio server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub tree: TreeConfig,
    pub labels: LabelConfig,
    pub remote: RemoteConfig,
    pub notification: NotificationConfig,
    pub rcon: RconConfig,
    pub mqtt: MqttConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Path of the application entity every container hangs off.
    pub app_root: String,
    /// Name of the bridge's own root container.
    pub container: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            app_root: "/Mobius/ae1".to_string(),
            container: "factory_car".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub base_categories: Vec<String>,
    /// Categories whose entities carry a recipe that is folded into the label.
    pub discriminated_categories: Vec<String>,
    /// Entity fields consulted, in order, for the recipe.
    pub discriminator_fields: Vec<String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            base_categories: [
                "offshore_pumps",
                "steam_engines",
                "electric_furnaces",
                "electric_mining_drills",
                "boilers",
                "assemblers",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            discriminated_categories: vec![
                "assemblers".to_string(),
                "electric_furnaces".to_string(),
            ],
            discriminator_fields: [
                "recipe",
                "recipe_name",
                "current_recipe",
                "current_recipe_name",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub origin: String,
    /// Originator used when re-posting a record through the fallback path.
    pub fallback_origin: String,
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7599".to_string(),
            origin: "SM".to_string(),
            fallback_origin: "SM".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub resource_name: String,
    pub host: String,
    pub port: u16,
    /// Opaque receiver id appended to the notification URI.
    pub target: String,
    /// Stored AE registration (`{"ae": {"id": ...}}`) whose id replaces
    /// `target` when it can be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ae_id_file: Option<PathBuf>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            resource_name: "sub1".to_string(),
            host: "localhost".to_string(),
            port: 1883,
            target: "CAE1".to_string(),
            ae_id_file: None,
        }
    }
}

impl NotificationConfig {
    pub fn receiver_uri(&self) -> String {
        format!("mqtt://{}:{}/{}?ct=json", self.host, self.port, self.receiver_id())
    }

    /// The stored AE id when `ae_id_file` holds one, else `target`.
    pub fn receiver_id(&self) -> String {
        let Some(path) = &self.ae_id_file else {
            return self.target.clone();
        };
        match stored_ae_id(path) {
            Some(id) => id,
            None => {
                debug!(path = %path.display(), "no stored AE id; using {}", self.target);
                self.target.clone()
            }
        }
    }
}

fn stored_ae_id(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let stored: serde_json::Value = serde_json::from_str(&raw).ok()?;
    stored
        .pointer("/ae/id")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub command: String,
    pub poll_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 27015,
            password: String::new(),
            command: r#"/sc rcon.print(remote.call("device_scanner", "get_snapshot_json"))"#
                .to_string(),
            poll_interval_ms: 1_000,
            reconnect_delay_ms: 5_000,
            timeout_ms: 10_000,
        }
    }
}

impl RconConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: generated_client_id(),
            username: None,
            password: None,
            keep_alive_secs: 4,
            reconnect_delay_ms: 4_000,
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn generated_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("factorio_tas_{}", &id[..15])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upper bound on entities of one snapshot processed at the same time.
    pub concurrency: usize,
    pub stats_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            stats_interval_ms: 60_000,
        }
    }
}

impl RelayConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms.max(1_000))
    }
}

impl BridgeConfig {
    /// Reads a TOML file. Fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BridgeConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays the documented environment variables using `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = text(ENV_CONTAINER) {
            self.tree.container = value;
        }
        if let Some(value) = text(ENV_MOBIUS_BASE_URL) {
            self.remote.base_url = value;
        }
        if let Some(value) = text(ENV_MOBIUS_ORIGIN) {
            self.remote.origin = value;
        }
        if let Some(value) = text(ENV_MOBIUS_ADMIN_ORIGIN) {
            self.remote.fallback_origin = value;
        }
        if let Some(value) = text(ENV_RCON_HOST) {
            self.rcon.host = value;
        }
        if let Some(value) = text(ENV_RCON_PORT) {
            self.rcon.port = parse_env(ENV_RCON_PORT, &value)?;
        }
        if let Some(value) = text(ENV_RCON_PASSWORD) {
            self.rcon.password = value;
        }
        if let Some(value) = text(ENV_SNAPSHOT_COMMAND) {
            self.rcon.command = value;
        }
        if let Some(value) = text(ENV_POLL_MS) {
            self.rcon.poll_interval_ms = parse_env(ENV_POLL_MS, &value)?;
        }
        if let Some(value) = text(ENV_MQTT_HOST) {
            self.mqtt.host = value;
        }
        if let Some(value) = text(ENV_MQTT_PORT) {
            self.mqtt.port = parse_env(ENV_MQTT_PORT, &value)?;
        }
        if let Some(value) = text(ENV_MQTT_CLIENT_ID) {
            self.mqtt.client_id = value;
        }
        if let Some(value) = text(ENV_AE_ID_FILE) {
            self.notification.ae_id_file = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        TreeLayout::new(&self.tree.app_root, &self.tree.container)
            .map(|_| ())
            .map_err(|err| ConfigError::InvalidLayout(err.to_string()))
    }

    pub fn layout(&self) -> Result<TreeLayout, ConfigError> {
        TreeLayout::new(&self.tree.app_root, &self.tree.container)
            .map_err(|err| ConfigError::InvalidLayout(err.to_string()))
    }
}

fn parse_env<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = BridgeConfig::default();
        assert_eq!(config.tree.app_root, "/Mobius/ae1");
        assert_eq!(config.tree.container, "factory_car");
        assert_eq!(config.rcon.poll_interval(), Duration::from_secs(1));
        assert_eq!(
            config.notification.receiver_uri(),
            "mqtt://localhost:1883/CAE1?ct=json"
        );
        assert!(config.mqtt.client_id.starts_with("factorio_tas_"));
        assert_eq!(config.mqtt.client_id.len(), "factorio_tas_".len() + 15);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = BridgeConfig::default();
        config
            .apply_env(lookup(&[
                (ENV_CONTAINER, "plant_a"),
                (ENV_RCON_PORT, "27016"),
                (ENV_POLL_MS, "250"),
                (ENV_MOBIUS_ADMIN_ORIGIN, "CAdmin"),
            ]))
            .expect("apply env");
        assert_eq!(config.tree.container, "plant_a");
        assert_eq!(config.rcon.port, 27016);
        assert_eq!(config.rcon.poll_interval_ms, 250);
        assert_eq!(config.remote.fallback_origin, "CAdmin");
        assert_eq!(config.remote.origin, "SM");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = BridgeConfig::default();
        config
            .apply_env(lookup(&[(ENV_CONTAINER, "  ")]))
            .expect("apply env");
        assert_eq!(config.tree.container, "factory_car");
    }

    #[test]
    fn invalid_numeric_env_is_an_error() {
        let mut config = BridgeConfig::default();
        let err = config
            .apply_env(lookup(&[(ENV_RCON_PORT, "not-a-port")]))
            .expect_err("port must be numeric");
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: ENV_RCON_PORT,
                ..
            }
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.toml");
        std::fs::write(
            &path,
            "[tree]\ncontainer = \"line_b\"\n\n[relay]\nconcurrency = 4\n",
        )
        .expect("write config");
        let config = BridgeConfig::load(&path).expect("load");
        assert_eq!(config.tree.container, "line_b");
        assert_eq!(config.tree.app_root, "/Mobius/ae1");
        assert_eq!(config.relay.concurrency, 4);
        assert_eq!(config.labels, LabelConfig::default());
    }

    #[test]
    fn stored_ae_id_replaces_the_notification_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("aei.json");
        std::fs::write(&path, r#"{"ae": {"id": "S20240101"}}"#).expect("write aei");
        let mut config = BridgeConfig::default();
        config
            .apply_env(lookup(&[(ENV_AE_ID_FILE, path.to_str().expect("utf-8 path"))]))
            .expect("apply env");
        assert_eq!(
            config.notification.receiver_uri(),
            "mqtt://localhost:1883/S20240101?ct=json"
        );
    }

    #[test]
    fn unreadable_ae_id_file_falls_back_to_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let malformed = dir.path().join("aei.json");
        std::fs::write(&malformed, r#"{"ae": {}}"#).expect("write aei");
        let mut notification = NotificationConfig {
            ae_id_file: Some(dir.path().join("missing.json")),
            ..NotificationConfig::default()
        };
        assert_eq!(notification.receiver_id(), "CAE1");
        notification.ae_id_file = Some(malformed);
        assert_eq!(notification.receiver_id(), "CAE1");
    }

    #[test]
    fn empty_container_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "[tree]\ncontainer = \"\"\n").expect("write config");
        let err = BridgeConfig::load(&path).expect_err("empty container");
        assert!(matches!(err, ConfigError::InvalidLayout(_)));
    }
}
