//! Bridge settings: host/credentials, entity allow/deny lists, and the
//! feature black lists, loaded from a TOML file and overridable from the
//! command line, in the style of `tedge_mapper::MapperOpt`'s `clap::Parser`
//! derive.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "zigbee2mqtt".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_scenes_type() -> ScenesType {
    ScenesType::Scene
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScenesType {
    #[default]
    Scene,
    Light,
}

/// Deserialized from TOML with `serde` defaults mirroring the upstream
/// bridge's own defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub protocol_version: Option<u8>,
    #[serde(default = "default_topic")]
    pub base_topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Prefix for the generated MQTT client id; defaults to `base_topic`
    /// when unset so distinct bridges on the same broker don't collide.
    pub client_id_prefix: Option<String>,
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub reject_unauthorized: bool,

    #[serde(default)]
    pub white_list: Vec<String>,
    #[serde(default)]
    pub black_list: Vec<String>,
    #[serde(default)]
    pub switch_list: Vec<String>,
    #[serde(default)]
    pub light_list: Vec<String>,
    #[serde(default)]
    pub outlet_list: Vec<String>,
    #[serde(default)]
    pub feature_black_list: Vec<String>,
    #[serde(default)]
    pub device_feature_black_list: Vec<(String, String)>,

    pub postfix: Option<String>,
    #[serde(default = "default_scenes_type")]
    pub scenes_type: ScenesType,
    pub scenes_prefix: Option<String>,

    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub unregister_on_shutdown: bool,

    #[serde(default)]
    pub inject_devices: Option<PathBuf>,
    #[serde(default)]
    pub inject_payloads: Option<PathBuf>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings {
            host: default_host(),
            port: default_port(),
            protocol_version: None,
            base_topic: default_topic(),
            username: None,
            password: None,
            client_id_prefix: None,
            ca: None,
            cert: None,
            key: None,
            reject_unauthorized: true,
            white_list: Vec::new(),
            black_list: Vec::new(),
            switch_list: Vec::new(),
            light_list: Vec::new(),
            outlet_list: Vec::new(),
            feature_black_list: Vec::new(),
            device_feature_black_list: Vec::new(),
            postfix: None,
            scenes_type: ScenesType::default(),
            scenes_prefix: None,
            debug: false,
            unregister_on_shutdown: false,
            inject_devices: None,
            inject_payloads: None,
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl BridgeSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// The prefix used to generate this bridge's MQTT client id, falling
    /// back to `base_topic` so two bridges on the same broker don't share
    /// a default.
    pub fn client_id_prefix(&self) -> &str {
        self.client_id_prefix.as_deref().unwrap_or(&self.base_topic)
    }

    /// An entity's friendly name passes the allow/deny filter: `blackList`
    /// takes precedence; an empty `whiteList` allows all.
    pub fn entity_allowed(&self, friendly_name: &str) -> bool {
        if self.black_list.iter().any(|n| n == friendly_name) {
            return false;
        }
        self.white_list.is_empty() || self.white_list.iter().any(|n| n == friendly_name)
    }

    /// A (friendly_name, feature property) pair passes the per-feature
    /// black list filters.
    pub fn feature_allowed(&self, friendly_name: &str, property: &str) -> bool {
        if self.feature_black_list.iter().any(|p| p == property) {
            return false;
        }
        !self
            .device_feature_black_list
            .iter()
            .any(|(name, prop)| name == friendly_name && prop == property)
    }

    /// Strip blacklisted keys from an inbound attribute payload before it
    /// reaches the pipeline or gets retained as `last_payload`.
    pub fn filter_payload_fields(&self, friendly_name: &str, payload: serde_json::Value) -> serde_json::Value {
        match payload {
            serde_json::Value::Object(mut fields) => {
                fields.retain(|key, _| self.feature_allowed(friendly_name, key));
                serde_json::Value::Object(fields)
            }
            other => other,
        }
    }

    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<BridgeSettings> {
        let text = std::fs::read_to_string(path)?;
        let settings: BridgeSettings = toml::from_str(&text)?;
        Ok(settings)
    }
}

/// Command-line overlay, applied on top of the TOML file per
/// `tedge_mapper::MapperOpt`'s flatten-and-override idiom.
#[derive(Debug, Parser)]
#[clap(
    name = clap::crate_name!(),
    version = clap::crate_version!(),
    about = "Bridges a Zigbee2MQTT gateway's MQTT tree onto northbound entities"
)]
pub struct BridgeOpt {
    /// Path to the TOML settings file.
    #[clap(long, default_value = "zigbee-mapper.toml")]
    pub config_file: PathBuf,

    /// Override `host` from the config file.
    #[clap(long)]
    pub host: Option<String>,

    /// Override `port` from the config file.
    #[clap(long)]
    pub port: Option<u16>,

    /// Enable debug-level retained diagnostics regardless of the config file.
    #[clap(long)]
    pub debug: bool,
}

impl BridgeOpt {
    pub fn apply(&self, mut settings: BridgeSettings) -> BridgeSettings {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if self.debug {
            settings.debug = true;
        }
        settings
    }
}
