use super::exposes::Expose;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DeviceType {
    Coordinator,
    Router,
    EndDevice,
    GreenPower,
    #[serde(other)]
    Unknown,
}

/// The retained `bridge/devices` entry for a single device.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeDevice {
    pub ieee_address: String,
    pub friendly_name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub supported: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub interview_completed: bool,
    #[serde(default)]
    pub power_source: Option<String>,
    #[serde(default)]
    pub definition: Option<Definition>,
    #[serde(default)]
    pub endpoints: HashMap<String, Endpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub bindings: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub exposes: Vec<Expose>,
    #[serde(default)]
    pub options: Vec<serde_json::Value>,
}

impl BridgeDevice {
    /// A device is router-class if it is the coordinator or a configured
    /// mains-powered router.
    pub fn is_router_class(&self) -> bool {
        matches!(self.device_type, DeviceType::Coordinator | DeviceType::Router)
    }

    pub fn exposes(&self) -> &[Expose] {
        self.definition
            .as_ref()
            .map(|d| d.exposes.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_with_light_expose() {
        let json = r#"{
            "ieee_address": "0xabc",
            "friendly_name": "Lamp1",
            "type": "EndDevice",
            "supported": true,
            "disabled": false,
            "interview_completed": true,
            "definition": {
                "exposes": [{"type":"light","features":[{"name":"state","property":"state","access":7}]}]
            }
        }"#;
        let device: BridgeDevice = serde_json::from_str(json).unwrap();
        assert_eq!(device.friendly_name, "Lamp1");
        assert!(!device.is_router_class());
        assert_eq!(device.exposes().len(), 1);
    }

    #[test]
    fn coordinator_is_router_class() {
        let json = r#"{"ieee_address":"0x0","friendly_name":"Coordinator","type":"Coordinator"}"#;
        let device: BridgeDevice = serde_json::from_str(json).unwrap();
        assert!(device.is_router_class());
    }

    #[test]
    fn unknown_type_falls_back_gracefully() {
        let json = r#"{"ieee_address":"0x1","friendly_name":"X","type":"SomeFutureType"}"#;
        let device: BridgeDevice = serde_json::from_str(json).unwrap();
        assert_eq!(device.device_type, DeviceType::Unknown);
    }
}
