//! Bridge state controller: owns the bridge-wide snapshots (`bridge/info`,
//! the device/group lists, the availability map) and the idempotent
//! registration sweep, collapsed into one struct driven by a single
//! `tokio::select!` loop in `engine.rs` rather than an actor mesh — the
//! bridge runs a single-threaded, lock-free event loop with a fixed
//! topology, so the actor/builder/service-provider machinery `tedge_actors`
//! offers has no counterpart here.

use crate::config::BridgeSettings;
use crate::device_types;
use crate::model::{Availability, BridgeDevice, BridgeGroup, BridgeInfo, DeviceTypeCode, Entity, EntitySource};
use crate::northbound::{Attribute, NorthboundHost, OperationEvent};
use crate::registry::EntityRegistry;
use serde_json::Value;
use std::collections::HashMap;

/// A `set`/`get` publish the controller asked for, to be enqueued on the
/// transport by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub topic_suffix: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
pub struct BridgeController {
    settings: BridgeSettings,
    pub registry: EntityRegistry,
    online: Option<bool>,
    info: Option<BridgeInfo>,
    devices: Option<Vec<BridgeDevice>>,
    groups: Option<Vec<BridgeGroup>>,
    devices_registered: bool,
    groups_registered: bool,
    availability: HashMap<String, Availability>,
    permit_join: bool,
}

impl BridgeController {
    pub fn new(settings: BridgeSettings) -> Self {
        BridgeController {
            settings,
            ..Default::default()
        }
    }

    /// Startup readiness: true once online, info, and at least one of
    /// devices/groups are all defined.
    pub fn ready_for_registration(&self) -> bool {
        self.online.is_some() && self.info.is_some() && (self.devices.is_some() || self.groups.is_some())
    }

    pub fn on_bridge_state(&mut self, online: bool) {
        self.online = Some(online);
    }

    pub fn is_online(&self) -> Option<bool> {
        self.online
    }

    pub fn on_bridge_info(&mut self, info: BridgeInfo) -> Result<(), crate::model::bridge_info::BridgeInfoError> {
        info.validate()?;
        if info.advanced.legacy_api {
            tracing::warn!("bridge/info advanced.legacy_api is deprecated");
        }
        if info.advanced.legacy_availability_payload {
            tracing::warn!("bridge/info advanced.legacy_availability_payload is deprecated");
        }
        self.permit_join = info.permit_join;
        self.info = Some(info);
        Ok(())
    }

    /// Replace the device snapshot and, on the first snapshot, run the
    /// registration sweep; later snapshots are taken as reconfigurations,
    /// gated by the `devicesRegistered` sentinel below.
    pub async fn on_bridge_devices(
        &mut self,
        devices: Vec<BridgeDevice>,
        host: &mut dyn NorthboundHost,
    ) {
        self.devices = Some(devices.clone());
        if !self.devices_registered {
            for device in &devices {
                self.register_device(device, host).await;
            }
            self.devices_registered = true;
        }
    }

    pub async fn on_bridge_groups(&mut self, groups: Vec<BridgeGroup>, host: &mut dyn NorthboundHost) {
        self.groups = Some(groups.clone());
        if !self.groups_registered {
            for group in &groups {
                self.register_group(group, host).await;
            }
            self.groups_registered = true;
        }
    }

    async fn register_device(&mut self, device: &BridgeDevice, host: &mut dyn NorthboundHost) {
        if self.registry.contains(&device.friendly_name) {
            return;
        }
        if !self.settings.entity_allowed(&device.friendly_name) || !self.settings.entity_allowed(&device.ieee_address)
        {
            return;
        }
        host.select_device_hint(&device.friendly_name).await;

        let exposes = device_types::filter_exposes(device.exposes(), &device.friendly_name, &self.settings);
        let mut resolved_types = device_types::resolve_device_types(&device.friendly_name, &exposes, &self.settings);
        if resolved_types.is_empty() && device.is_router_class() {
            // A router (or the coordinator itself) has nothing to offer
            // northbound via its own exposes, but `permit_join` still needs
            // a door-lock representation to mirror onto.
            resolved_types.insert(DeviceTypeCode::Lock);
        }
        if resolved_types.is_empty() {
            return;
        }

        let mut entity = Entity::new(
            device.friendly_name.clone(),
            EntitySource::Device { ieee_address: device.ieee_address.clone() },
            device.is_router_class(),
        );
        entity.device_types = resolved_types.clone();

        for device_type in resolved_types {
            match host.register_endpoint(&device.friendly_name, device_type).await {
                Ok(endpoint_id) => entity.bridged_endpoints.push((device_type, endpoint_id)),
                Err(err) => tracing::warn!("registration rejected for {:?}: {err}", device.friendly_name),
            }
        }

        if !entity.bridged_endpoints.is_empty() {
            let _ = self.registry.register(entity);
        }
    }

    async fn register_group(&mut self, group: &BridgeGroup, host: &mut dyn NorthboundHost) {
        if self.registry.contains(&group.friendly_name) {
            return;
        }
        if !self.settings.entity_allowed(&group.friendly_name) {
            return;
        }
        host.select_device_hint(&group.friendly_name).await;

        // Groups expose whatever their scenes/members imply; lacking a
        // per-member expose list here, a group is bridged as a generic
        // on/off light, matching the upstream default `scenesType`.
        let device_type = crate::model::DeviceTypeCode::OnOffLight;
        let mut entity = Entity::new(
            group.friendly_name.clone(),
            EntitySource::Group { id: group.id },
            false,
        );
        match host.register_endpoint(&group.friendly_name, device_type).await {
            Ok(endpoint_id) => {
                entity.device_types.insert(device_type);
                entity.bridged_endpoints.push((device_type, endpoint_id));
                let _ = self.registry.register(entity);
            }
            Err(err) => tracing::warn!("registration rejected for group {:?}: {err}", group.friendly_name),
        }
    }

    async fn unregister_entity(&mut self, friendly_name: &str, host: &mut dyn NorthboundHost) {
        if let Ok(entity) = self.registry.unregister(friendly_name) {
            for endpoint_id in entity.all_endpoints() {
                host.unregister_endpoint(endpoint_id).await;
            }
        }
    }

    pub async fn on_device_interview_successful(&mut self, ieee_address: &str, host: &mut dyn NorthboundHost) {
        let Some(devices) = &self.devices else { return };
        if let Some(device) = devices
            .iter()
            .find(|d| d.ieee_address == ieee_address && d.supported)
            .cloned()
        {
            self.register_device(&device, host).await;
        }
    }

    /// A friendly-name rename is a delete+create of the entity, but its
    /// availability and last retained payload must survive the round trip.
    pub async fn on_device_rename(&mut self, ieee_address: &str, from: &str, to: &str, host: &mut dyn NorthboundHost) {
        let retained_payload = self.registry.get(from).and_then(|e| e.last_payload.clone());
        let retained_availability = self.availability.remove(from);

        self.unregister_entity(from, host).await;
        if let Some(devices) = self.devices.clone() {
            if let Some(device) = devices.iter().find(|d| d.ieee_address == ieee_address) {
                let mut renamed = device.clone();
                renamed.friendly_name = to.to_string();
                self.register_device(&renamed, host).await;
            }
        }

        if let Some(entity) = self.registry.get_mut(to) {
            entity.last_payload = retained_payload;
            if let Some(availability) = retained_availability {
                entity.availability = availability;
            }
        }
        if let Some(availability) = retained_availability {
            self.availability.insert(to.to_string(), availability);
        }
    }

    pub async fn on_device_removed(&mut self, friendly_name: &str, host: &mut dyn NorthboundHost) {
        self.unregister_entity(friendly_name, host).await;
    }

    pub async fn on_group_added(&mut self, group: &BridgeGroup, host: &mut dyn NorthboundHost) {
        self.register_group(group, host).await;
    }

    pub async fn on_group_removed(&mut self, friendly_name: &str, host: &mut dyn NorthboundHost) {
        self.unregister_entity(friendly_name, host).await;
    }

    pub async fn on_group_renamed(&mut self, from: &str, to_group: &BridgeGroup, host: &mut dyn NorthboundHost) {
        self.unregister_entity(from, host).await;
        self.register_group(to_group, host).await;
    }

    /// Membership changes rewire which devices feed a group's endpoint, so
    /// the safest fix is unregister-then-reregister.
    pub async fn on_group_membership_changed(&mut self, group: &BridgeGroup, host: &mut dyn NorthboundHost) {
        self.unregister_entity(&group.friendly_name, host).await;
        self.register_group(group, host).await;
    }

    /// `permit_join(device?, time, value)`: mirror `value` onto every
    /// router-class entity matching `device`, or all routers if absent.
    pub async fn on_permit_join(&mut self, device: Option<&str>, value: bool, host: &mut dyn NorthboundHost) {
        self.permit_join = value;
        let event = if value { OperationEvent::Unlock } else { OperationEvent::Lock };
        let targets: Vec<_> = self
            .registry
            .iter()
            .filter(|e| e.is_router && device.map(|name| name == e.entity_name).unwrap_or(true))
            .flat_map(|e| e.all_endpoints())
            .collect();
        for endpoint_id in targets {
            host.set_attribute(
                endpoint_id,
                Attribute::LockState(if value {
                    crate::northbound::LockState::Unlocked
                } else {
                    crate::northbound::LockState::Locked
                }),
            )
            .await;
            host.emit_event(endpoint_id, event.clone()).await;
        }
    }

    /// `availability(entity, flag)`: record and fan out `reachable` writes
    /// to every endpoint this entity is bridged onto.
    pub async fn on_availability(&mut self, entity_name: &str, online: bool, host: &mut dyn NorthboundHost) {
        // When the bridge isn't tracking availability, entities default to
        // online regardless of what the (unsolicited) payload claims.
        let online = match &self.info {
            Some(info) if !info.availability_enabled() => true,
            _ => online,
        };
        self.availability.insert(entity_name.to_string(), Availability::from_bool(online));
        if let Some(entity) = self.registry.get(entity_name) {
            for endpoint_id in entity.all_endpoints() {
                host.set_attribute(endpoint_id, Attribute::Reachable(online)).await;
                host.emit_event(
                    endpoint_id,
                    OperationEvent::ReachableChanged { endpoint: endpoint_id, reachable: online },
                )
                .await;
            }
        }
    }

    /// Apply an inbound `MESSAGE-<entity>` payload, stashing it for replay
    /// and returning the attribute writes to apply.
    pub fn record_payload(&mut self, entity_name: &str, payload: Value) -> Vec<crate::pipeline::AttributeWrite> {
        let payload = self.settings.filter_payload_fields(entity_name, payload);
        let writes = crate::pipeline::apply_inbound(&payload);
        if let Some(entity) = self.registry.get_mut(entity_name) {
            entity.last_payload = Some(payload);
        }
        writes
    }

    /// `onConfigure`: one state-refresh `get` publish per gettable feature
    /// for devices, `{state:""}` for groups.
    pub fn configure_requests(&self) -> Vec<(String, PublishRequest)> {
        let mut requests = Vec::new();
        for entity in self.registry.device_entities() {
            let Some(devices) = &self.devices else { continue };
            let Some(device) = devices.iter().find(|d| Some(d.ieee_address.as_str()) == entity.ieee_address())
            else {
                continue;
            };
            for expose in device.exposes() {
                for feature in expose.leaf_features() {
                    if feature.is_gettable() {
                        if let Some(property) = &feature.property {
                            requests.push((
                                entity.entity_name.clone(),
                                PublishRequest {
                                    topic_suffix: format!("{}/get", entity.entity_name),
                                    payload: serde_json::json!({ property: "" }),
                                },
                            ));
                        }
                    }
                }
            }
        }
        for entity in self.registry.group_entities() {
            requests.push((
                entity.entity_name.clone(),
                PublishRequest {
                    topic_suffix: format!("{}/get", entity.entity_name),
                    payload: serde_json::json!({"state": ""}),
                },
            ));
        }
        requests
    }

    /// One-shot replay (~10s after `onConfigure`): re-apply the retained
    /// availability and last payload per entity, so devices resume the
    /// attributes observed before process start.
    pub async fn replay(&self, host: &mut dyn NorthboundHost) {
        for entity in self.registry.iter() {
            if let Some(availability) = self.availability.get(&entity.entity_name) {
                let online = matches!(availability, Availability::Online);
                for endpoint_id in entity.all_endpoints() {
                    host.set_attribute(endpoint_id, Attribute::Reachable(online)).await;
                }
            }
            if let Some(payload) = &entity.last_payload {
                for write in crate::pipeline::apply_inbound(payload) {
                    let types: Vec<_> = write.device_types.clone();
                    for endpoint_id in entity.endpoints_for_types(&types) {
                        host.set_attribute(endpoint_id, write.attribute).await;
                    }
                }
            }
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Look up a group in the last `bridge/groups` snapshot by friendly
    /// name, used to reconstruct the full group object a group-response
    /// handler only got the name of.
    pub fn find_group(&self, friendly_name: &str) -> Option<&BridgeGroup> {
        self.groups.as_ref()?.iter().find(|g| g.friendly_name == friendly_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::northbound::RecordingHost;

    fn sample_device(name: &str) -> BridgeDevice {
        let json = format!(
            r#"{{
                "ieee_address": "0x{name}",
                "friendly_name": "{name}",
                "type": "Router",
                "supported": true,
                "definition": {{
                    "exposes": [{{"type":"light","features":[{{"property":"state","access":7}}]}}]
                }}
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn registration_sweep_registers_devices_once() {
        let mut controller = BridgeController::new(BridgeSettings::default());
        let mut host = RecordingHost::new("2.0.0");
        let devices = vec![sample_device("Lamp1")];
        controller.on_bridge_devices(devices.clone(), &mut host).await;
        assert!(controller.registry.contains("Lamp1"));
        assert_eq!(host.registered.len(), 1);

        // Replaying the same snapshot must not re-register.
        controller.on_bridge_devices(devices, &mut host).await;
        assert_eq!(host.registered.len(), 1);
    }

    #[tokio::test]
    async fn black_listed_device_is_never_registered() {
        let mut settings = BridgeSettings::default();
        settings.black_list.push("Lamp1".to_string());
        let mut controller = BridgeController::new(settings);
        let mut host = RecordingHost::new("2.0.0");
        controller.on_bridge_devices(vec![sample_device("Lamp1")], &mut host).await;
        assert!(!controller.registry.contains("Lamp1"));
    }

    #[tokio::test]
    async fn availability_fan_out_sets_reachable_and_emits_event() {
        let mut controller = BridgeController::new(BridgeSettings::default());
        let mut host = RecordingHost::new("2.0.0");
        controller.on_bridge_devices(vec![sample_device("Lamp1")], &mut host).await;
        controller.on_availability("Lamp1", false, &mut host).await;
        assert!(host
            .attribute_writes
            .iter()
            .any(|(_, attr)| *attr == Attribute::Reachable(false)));
    }

    #[tokio::test]
    async fn permit_join_mirrors_lock_state_onto_routers() {
        let mut controller = BridgeController::new(BridgeSettings::default());
        let mut host = RecordingHost::new("2.0.0");
        controller.on_bridge_devices(vec![sample_device("Lamp1")], &mut host).await;
        controller.on_permit_join(None, true, &mut host).await;
        assert!(host.events.iter().any(|(_, event)| *event == OperationEvent::Unlock));
    }

    #[tokio::test]
    async fn router_with_no_exposes_still_gets_a_lock_endpoint() {
        let mut controller = BridgeController::new(BridgeSettings::default());
        let mut host = RecordingHost::new("2.0.0");
        let coordinator: BridgeDevice =
            serde_json::from_str(r#"{"ieee_address":"0x0","friendly_name":"Coordinator","type":"Coordinator"}"#)
                .unwrap();
        controller.on_bridge_devices(vec![coordinator], &mut host).await;
        assert!(controller.registry.contains("Coordinator"));
        assert_eq!(host.registered.len(), 1);
    }

    #[tokio::test]
    async fn rename_preserves_availability_and_last_payload() {
        let mut controller = BridgeController::new(BridgeSettings::default());
        let mut host = RecordingHost::new("2.0.0");
        let device = sample_device("Lamp1");
        controller.on_bridge_devices(vec![device.clone()], &mut host).await;
        controller.on_availability("Lamp1", false, &mut host).await;
        controller.record_payload("Lamp1", serde_json::json!({"state": "ON"}));

        controller.on_device_rename("0xLamp1", "Lamp1", "Lamp1-new", &mut host).await;

        assert!(!controller.registry.contains("Lamp1"));
        let entity = controller.registry.get("Lamp1-new").expect("renamed entity");
        assert_eq!(entity.availability, Availability::Offline);
        assert_eq!(entity.last_payload, Some(serde_json::json!({"state": "ON"})));
    }

    #[tokio::test]
    async fn availability_defaults_online_when_tracking_disabled() {
        let mut controller = BridgeController::new(BridgeSettings::default());
        let mut host = RecordingHost::new("2.0.0");
        controller.on_bridge_devices(vec![sample_device("Lamp1")], &mut host).await;
        controller
            .on_bridge_info(BridgeInfo {
                version: "1.0".into(),
                zigbee_herdsman_version: None,
                advanced: Default::default(),
                permit_join: false,
                permit_join_timeout: None,
                config: Default::default(),
            })
            .unwrap();

        controller.on_availability("Lamp1", false, &mut host).await;
        assert!(host
            .attribute_writes
            .iter()
            .any(|(_, attr)| *attr == Attribute::Reachable(true)));
    }

    #[test]
    fn ready_for_registration_requires_online_info_and_snapshot() {
        let mut controller = BridgeController::new(BridgeSettings::default());
        assert!(!controller.ready_for_registration());
        controller.on_bridge_state(true);
        assert!(!controller.ready_for_registration());
        controller.on_bridge_info(BridgeInfo {
            version: "1.0".into(),
            zigbee_herdsman_version: None,
            advanced: Default::default(),
            permit_join: false,
            permit_join_timeout: None,
            config: Default::default(),
        }).unwrap();
        assert!(!controller.ready_for_registration());
        controller.devices = Some(vec![]);
        assert!(controller.ready_for_registration());
    }
}
