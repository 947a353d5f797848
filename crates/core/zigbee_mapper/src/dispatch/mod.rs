//! Classifies incoming MQTT messages against the bridge's topic tree,
//! grounded on `tedge_mapper::c8y::topic::C8yTopic`'s `TryFrom<&str>`
//! pattern: a pure function from a topic (stripped of the configured base
//! topic) to a typed enum, independent of payload parsing.

mod topic;

pub use topic::classify_bridge_event;
pub use topic::parse_payload;
pub use topic::BridgeEventKind;
pub use topic::DispatchedTopic;
pub use topic::NetworkMapFormat;
pub use topic::ParsedPayload;
