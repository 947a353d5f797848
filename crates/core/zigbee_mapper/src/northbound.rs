//! The northbound host contract: an external collaborator that
//! registers/unregisters bridged endpoints and exposes attribute set/get and
//! command handlers. The real fabric-side implementation lives outside this
//! repository; `NorthboundHost` is the seam this crate owns.

use crate::model::DeviceTypeCode;
use async_trait::async_trait;
use std::collections::HashMap;

/// Opaque handle to one bridged northbound endpoint.
pub type EndpointId = u64;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ColorMode {
    ColorTemperatureMireds,
    CurrentHueAndCurrentSaturation,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AirQualityLevel {
    Good,
    Moderate,
    Unhealthy,
    Hazardous,
    Unknown,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SwitchAction {
    Press,
    Release,
    LongPress,
    MultiPress(u8),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LockState {
    Locked,
    Unlocked,
}

/// One attribute write the entity update pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute {
    OnOff(bool),
    CurrentLevel(u8),
    ColorTemperatureMireds(u16),
    ColorMode(ColorMode),
    CurrentHue(u8),
    CurrentSaturation(u8),
    /// Celsius, scaled by 100 (`round(v * 100)`).
    TemperatureCentiCelsius(i32),
    /// Relative humidity percent, scaled by 100.
    HumidityCentiPercent(i32),
    /// Pascals.
    PressurePascal(i32),
    /// Illuminance measured value in the ZCL 0..0xFFFE log-lux encoding.
    IlluminanceMeasuredValue(u32),
    BooleanState(bool),
    Occupied(bool),
    AirQuality(AirQualityLevel),
    SwitchAction(SwitchAction),
    LockState(LockState),
    Reachable(bool),
}

/// Operation-level events the controller/pipeline emit alongside attribute
/// writes: permit-join lock/unlock, and availability fan-out.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OperationEvent {
    Lock,
    Unlock,
    ReachableChanged { endpoint: EndpointId, reachable: bool },
}

#[derive(Debug, thiserror::Error)]
pub enum NorthboundError {
    #[error("northbound host rejected endpoint registration for {entity_name:?}: {reason}")]
    RegistrationRejected { entity_name: String, reason: String },
    #[error("host version {actual:?} is incompatible with required {required:?}")]
    IncompatibleVersion { required: String, actual: String },
}

/// Validate the host's version string at construction time; the only
/// construction-time failure mode that is fatal.
pub fn validate_host_version(required_major: u32, actual: &str) -> Result<(), NorthboundError> {
    let actual_major = actual
        .split('.')
        .next()
        .and_then(|s| s.parse::<u32>().ok());
    match actual_major {
        Some(major) if major == required_major => Ok(()),
        _ => Err(NorthboundError::IncompatibleVersion {
            required: format!("{required_major}.x"),
            actual: actual.to_string(),
        }),
    }
}

/// The host fabric an entity is bridged onto: registers/unregisters
/// endpoints, applies attribute writes, and surfaces operation events.
#[async_trait]
pub trait NorthboundHost: Send + Sync {
    fn host_version(&self) -> &str;

    /// Hint the host's UI to select this device, step 1 of registration.
    async fn select_device_hint(&mut self, entity_name: &str);

    async fn register_endpoint(
        &mut self,
        entity_name: &str,
        device_type: DeviceTypeCode,
    ) -> Result<EndpointId, NorthboundError>;

    async fn unregister_endpoint(&mut self, endpoint: EndpointId);

    async fn set_attribute(&mut self, endpoint: EndpointId, attribute: Attribute);

    async fn emit_event(&mut self, endpoint: EndpointId, event: OperationEvent);
}

/// In-memory host used by integration tests and as a harness for
/// `injectDevices`/`injectPayloads` test runs.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub version: String,
    next_id: EndpointId,
    pub hints: Vec<String>,
    pub registered: HashMap<EndpointId, (String, DeviceTypeCode)>,
    pub attribute_writes: Vec<(EndpointId, Attribute)>,
    pub events: Vec<(EndpointId, OperationEvent)>,
}

impl RecordingHost {
    pub fn new(version: impl Into<String>) -> Self {
        RecordingHost {
            version: version.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl NorthboundHost for RecordingHost {
    fn host_version(&self) -> &str {
        &self.version
    }

    async fn select_device_hint(&mut self, entity_name: &str) {
        self.hints.push(entity_name.to_string());
    }

    async fn register_endpoint(
        &mut self,
        entity_name: &str,
        device_type: DeviceTypeCode,
    ) -> Result<EndpointId, NorthboundError> {
        self.next_id += 1;
        let id = self.next_id;
        self.registered
            .insert(id, (entity_name.to_string(), device_type));
        Ok(id)
    }

    async fn unregister_endpoint(&mut self, endpoint: EndpointId) {
        self.registered.remove(&endpoint);
    }

    async fn set_attribute(&mut self, endpoint: EndpointId, attribute: Attribute) {
        self.attribute_writes.push((endpoint, attribute));
    }

    async fn emit_event(&mut self, endpoint: EndpointId, event: OperationEvent) {
        self.events.push((endpoint, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_major_version_accepted() {
        assert!(validate_host_version(2, "2.4.1").is_ok());
    }

    #[test]
    fn incompatible_major_version_rejected() {
        assert!(validate_host_version(2, "1.9.0").is_err());
    }

    #[tokio::test]
    async fn recording_host_tracks_registration_and_writes() {
        let mut host = RecordingHost::new("2.0.0");
        let id = host
            .register_endpoint("Lamp1", DeviceTypeCode::OnOffLight)
            .await
            .unwrap();
        host.set_attribute(id, Attribute::OnOff(true)).await;
        assert_eq!(host.attribute_writes.len(), 1);
        assert!(host.registered.contains_key(&id));
    }
}
