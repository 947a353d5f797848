use serde::Deserialize;

/// The retained `bridge/info` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeInfo {
    pub version: String,
    #[serde(rename = "zigbee_herdsman", default)]
    pub zigbee_herdsman_version: Option<String>,
    #[serde(default)]
    pub advanced: AdvancedConfig,
    #[serde(default)]
    pub permit_join: bool,
    #[serde(default)]
    pub permit_join_timeout: Option<u32>,
    #[serde(default)]
    pub config: BridgeConfigSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvancedConfig {
    #[serde(default = "default_output")]
    pub output: OutputMode,
    #[serde(default)]
    pub legacy_api: bool,
    #[serde(default)]
    pub legacy_availability_payload: bool,
}

fn default_output() -> OutputMode {
    OutputMode::Json
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Json,
    AttributeAndJson,
    Attribute,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfigSection {
    #[serde(default)]
    pub availability: bool,
}

/// A configuration error surfaced at `bridge/info` processing time: the
/// bridge requires JSON state payloads, so `advanced.output` must not be
/// `attribute`.
#[derive(Debug, thiserror::Error)]
pub enum BridgeInfoError {
    #[error("advanced.output=\"attribute\" is not supported: no JSON state payloads would be published")]
    AttributeOnlyOutput,
}

impl BridgeInfo {
    pub fn validate(&self) -> Result<(), BridgeInfoError> {
        if self.advanced.output == OutputMode::Attribute {
            return Err(BridgeInfoError::AttributeOnlyOutput);
        }
        Ok(())
    }

    pub fn availability_enabled(&self) -> bool {
        self.config.availability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_bridge_info() {
        let json = r#"{"version":"1.35.0","permit_join":true,"config":{"availability":true}}"#;
        let info: BridgeInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.version, "1.35.0");
        assert!(info.permit_join);
        assert!(info.availability_enabled());
        assert!(info.validate().is_ok());
    }

    #[test]
    fn attribute_only_output_is_a_configuration_error() {
        let json = r#"{"version":"1.35.0","advanced":{"output":"attribute"}}"#;
        let info: BridgeInfo = serde_json::from_str(json).unwrap();
        assert!(matches!(
            info.validate(),
            Err(BridgeInfoError::AttributeOnlyOutput)
        ));
    }

    #[test]
    fn attribute_and_json_output_is_valid() {
        let json = r#"{"version":"1.35.0","advanced":{"output":"attribute_and_json"}}"#;
        let info: BridgeInfo = serde_json::from_str(json).unwrap();
        assert!(info.validate().is_ok());
    }
}
