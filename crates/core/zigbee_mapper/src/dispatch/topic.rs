use serde_json::Value;

/// A topic, already stripped of the configured base topic (e.g.
/// `zigbee2mqtt`), classified into the bridge's handling categories.
/// Debug-only branches (`bridge/logging`, `bridge/config`,
/// `bridge/definitions`) collapse into `Debug`; anything this bridge has no
/// opinion about collapses into `Ignored`.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchedTopic {
    BridgeState,
    BridgeInfo,
    BridgeDevices,
    BridgeGroups,
    BridgeExtensions,
    /// `bridge/event`: sub-kind is carried in the payload's `type` field, so
    /// classification defers to `classify_bridge_event` once the payload is
    /// parsed.
    BridgeEvent,
    ResponseNetworkMap(NetworkMapFormat),
    ResponsePermitJoin,
    ResponseDeviceRename,
    ResponseDeviceRemove,
    ResponseDeviceOptions,
    ResponseGroupAdd,
    ResponseGroupRemove,
    ResponseGroupRename,
    ResponseGroupAddMember,
    ResponseGroupRemoveMember,
    RequestInformational,
    Debug,
    EntityState { entity_name: String },
    EntityAvailability { entity_name: String },
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMapFormat {
    Graphviz,
    Plantuml,
    Raw,
}

impl DispatchedTopic {
    /// Classify a topic already stripped of its base-topic prefix and
    /// leading slash, e.g. `"bridge/devices"` or `"Lamp1/availability"`.
    pub fn classify(topic: &str) -> DispatchedTopic {
        use DispatchedTopic::*;
        match topic {
            "bridge/state" => BridgeState,
            "bridge/info" => BridgeInfo,
            "bridge/devices" => BridgeDevices,
            "bridge/groups" => BridgeGroups,
            "bridge/extensions" => BridgeExtensions,
            "bridge/event" => BridgeEvent,
            "bridge/response/networkmap/graphviz" => ResponseNetworkMap(NetworkMapFormat::Graphviz),
            "bridge/response/networkmap/plantuml" => ResponseNetworkMap(NetworkMapFormat::Plantuml),
            "bridge/response/networkmap/raw" => ResponseNetworkMap(NetworkMapFormat::Raw),
            "bridge/response/permit_join" => ResponsePermitJoin,
            "bridge/response/device/rename" => ResponseDeviceRename,
            "bridge/response/device/remove" => ResponseDeviceRemove,
            "bridge/response/device/options" => ResponseDeviceOptions,
            "bridge/response/group/add" => ResponseGroupAdd,
            "bridge/response/group/remove" => ResponseGroupRemove,
            "bridge/response/group/rename" => ResponseGroupRename,
            "bridge/response/group/members/add" => ResponseGroupAddMember,
            "bridge/response/group/members/remove" => ResponseGroupRemoveMember,
            _ if topic.starts_with("bridge/request/") => RequestInformational,
            _ if topic.starts_with("bridge/logging")
                || topic.starts_with("bridge/config")
                || topic.starts_with("bridge/definitions") =>
            {
                Debug
            }
            _ if topic.starts_with("bridge/") => Ignored,
            _ => classify_entity_topic(topic),
        }
    }
}

fn classify_entity_topic(topic: &str) -> DispatchedTopic {
    match topic.rsplit_once('/') {
        None => DispatchedTopic::EntityState {
            entity_name: topic.to_string(),
        },
        Some((entity_name, "availability")) => DispatchedTopic::EntityAvailability {
            entity_name: entity_name.to_string(),
        },
        Some((_, "get")) | Some((_, "set")) => DispatchedTopic::Ignored,
        Some(_) => DispatchedTopic::Ignored,
    }
}

/// `bridge/event`'s sub-kind, carried in the payload's `type` field rather
/// than the topic. Kept as its own enum (not folded into `DispatchedTopic`)
/// since `classify` never produces these directly — only
/// `classify_bridge_event` does, once the payload is in hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEventKind {
    DeviceLeave,
    DeviceJoined,
    DeviceAnnounce,
    DeviceInterview,
    Other,
}

pub fn classify_bridge_event(payload: &Value) -> BridgeEventKind {
    match payload.get("type").and_then(Value::as_str) {
        Some("device_leave") => BridgeEventKind::DeviceLeave,
        Some("device_joined") => BridgeEventKind::DeviceJoined,
        Some("device_announce") => BridgeEventKind::DeviceAnnounce,
        Some("device_interview") => BridgeEventKind::DeviceInterview,
        _ => BridgeEventKind::Other,
    }
}

/// An entity payload is either a JSON object/array (the normal case) or a
/// bare string (legacy `availability` payloads, e.g. `"online"`/`"offline"`
/// when `legacy_availability_payload` is set).
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    Json(Value),
    Bare(String),
}

impl ParsedPayload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParsedPayload::Json(value) => Some(value),
            ParsedPayload::Bare(_) => None,
        }
    }
}

/// Parse an MQTT payload as JSON, falling back to a bare string for the
/// handful of topics that aren't JSON-encoded.
pub fn parse_payload(raw: &str) -> ParsedPayload {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => ParsedPayload::Json(value),
        Err(_) => ParsedPayload::Bare(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_bridge_topics() {
        assert_eq!(DispatchedTopic::classify("bridge/state"), DispatchedTopic::BridgeState);
        assert_eq!(DispatchedTopic::classify("bridge/devices"), DispatchedTopic::BridgeDevices);
        assert_eq!(DispatchedTopic::classify("bridge/groups"), DispatchedTopic::BridgeGroups);
        assert_eq!(DispatchedTopic::classify("bridge/event"), DispatchedTopic::BridgeEvent);
        assert_eq!(
            DispatchedTopic::classify("bridge/response/networkmap/graphviz"),
            DispatchedTopic::ResponseNetworkMap(NetworkMapFormat::Graphviz)
        );
        assert_eq!(
            DispatchedTopic::classify("bridge/response/permit_join"),
            DispatchedTopic::ResponsePermitJoin
        );
    }

    #[test]
    fn classifies_debug_only_branches() {
        assert_eq!(DispatchedTopic::classify("bridge/logging"), DispatchedTopic::Debug);
        assert_eq!(DispatchedTopic::classify("bridge/config"), DispatchedTopic::Debug);
        assert_eq!(DispatchedTopic::classify("bridge/definitions"), DispatchedTopic::Debug);
    }

    #[test]
    fn classifies_entity_topics() {
        assert_eq!(
            DispatchedTopic::classify("Lamp1"),
            DispatchedTopic::EntityState { entity_name: "Lamp1".to_string() }
        );
        assert_eq!(
            DispatchedTopic::classify("Lamp1/availability"),
            DispatchedTopic::EntityAvailability { entity_name: "Lamp1".to_string() }
        );
        assert_eq!(DispatchedTopic::classify("Lamp1/set"), DispatchedTopic::Ignored);
        assert_eq!(DispatchedTopic::classify("Lamp1/get"), DispatchedTopic::Ignored);
    }

    #[test]
    fn classifies_bridge_event_subtypes() {
        assert_eq!(classify_bridge_event(&json!({"type": "device_leave"})), BridgeEventKind::DeviceLeave);
        assert_eq!(
            classify_bridge_event(&json!({"type": "device_interview"})),
            BridgeEventKind::DeviceInterview
        );
        assert_eq!(classify_bridge_event(&json!({"type": "unknown"})), BridgeEventKind::Other);
    }

    #[test]
    fn parses_bare_string_availability_payload() {
        assert_eq!(parse_payload("online"), ParsedPayload::Bare("online".to_string()));
        assert_eq!(parse_payload(r#"{"state":"ON"}"#), ParsedPayload::Json(json!({"state":"ON"})));
    }
}
