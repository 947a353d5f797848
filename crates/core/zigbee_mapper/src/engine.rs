//! The single cooperative event loop tying the transport, controller,
//! dispatcher and diagnostics together. A fixed three-timer, one-select
//! topology: no actor graph, no message boxes, one writer to the MQTT
//! client.

use crate::config::BridgeSettings;
use crate::controller::BridgeController;
use crate::diagnostics::Diagnostics;
use crate::dispatch::{self, BridgeEventKind, DispatchedTopic, NetworkMapFormat, ParsedPayload};
use crate::error::BridgeError;
use crate::model::{BridgeDevice, BridgeGroup, BridgeInfo};
use crate::northbound::NorthboundHost;
use crate::transport::{Transport, TransportEvent, QUEUE_TICK_PERIOD};
use mqtt_channel::{ConnectionEvent, Message, Topic};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{interval, sleep, Instant};

/// ~10s one-shot replay delay after `onConfigure`.
const REPLAY_DELAY: Duration = Duration::from_secs(10);

pub struct Engine<H: NorthboundHost> {
    transport: Transport,
    controller: BridgeController,
    diagnostics: Diagnostics,
    host: H,
    base_topic: String,
}

impl<H: NorthboundHost> Engine<H> {
    pub async fn connect(
        settings: BridgeSettings,
        host: H,
        data_path: std::path::PathBuf,
    ) -> Result<Engine<H>, BridgeError> {
        crate::northbound::validate_host_version(2, host.host_version())?;

        let base_topic = settings.base_topic.clone();
        let debug = settings.debug;
        let client_id = mqtt_channel::Config::generate_client_id(settings.client_id_prefix());
        let mut mqtt_config = mqtt_channel::Config::default()
            .with_host(&settings.host)
            .with_port(settings.port)
            .with_subscriptions(mqtt_channel::TopicFilter::new(&format!("{base_topic}/#"))?)
            .with_credentials(settings.username.clone(), settings.password.clone())
            .with_session_name(client_id);
        if let Some(protocol_version) = settings.protocol_version {
            mqtt_config = mqtt_config.with_protocol_version(protocol_version);
        }
        if settings.ca.is_some() || settings.cert.is_some() || settings.key.is_some() {
            mqtt_config = mqtt_config.with_tls_material(mqtt_channel::TlsMaterial {
                ca: settings.ca.clone(),
                cert: settings.cert.clone(),
                key: settings.key.clone(),
                reject_unauthorized: settings.reject_unauthorized,
            });
        }

        let transport = Transport::connect(&mqtt_config).await?;
        let diagnostics = Diagnostics::new(data_path, debug);

        Ok(Engine {
            transport,
            controller: BridgeController::new(settings),
            diagnostics,
            host,
            base_topic,
        })
    }

    /// `onStart`: wait, bounded by `connectTimeout`, until the bridge is
    /// ready for the registration sweep.
    pub async fn on_start(&mut self) -> Result<(), BridgeError> {
        let deadline = Instant::now() + self.controller.settings().connect_timeout();
        loop {
            if self.controller.ready_for_registration() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::StartupTimedOut(self.controller.settings().connect_timeout()));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::select! {
                _ = sleep(remaining) => {}
                message = self.transport.next_message() => {
                    if let Some(message) = message {
                        self.handle_message(message).await;
                    }
                }
            }
        }
    }

    /// `onConfigure`: request a state refresh for every registered entity,
    /// then schedule the one-shot replay timer.
    pub async fn on_configure(&mut self) {
        for (entity_name, request) in self.controller.configure_requests() {
            if let Ok(topic) = Topic::new(&format!("{}/{}", self.base_topic, request.topic_suffix)) {
                self.transport.enqueue(Message::new(&topic, request.payload.to_string().into_bytes()));
            }
            tracing::debug!("requested state refresh for {entity_name}");
        }
    }

    /// Translate a northbound command into its outbound MQTT publication and
    /// enqueue it for the next queue tick: `moveToLevel{level}` etc. become
    /// `<entity>/set` bodies, lock/unlock become `bridge/request/permit_join`.
    pub fn dispatch_command(&mut self, entity_name: &str, command: &crate::pipeline::Command) {
        use crate::pipeline::EncodedCommand;
        let (suffix, payload) = match crate::pipeline::encode_outbound(command) {
            EncodedCommand::EntitySet(payload) => (format!("{entity_name}/set"), payload),
            EncodedCommand::BridgeRequest { suffix, payload } => (suffix.to_string(), payload),
        };
        let Ok(topic) = Topic::new(&format!("{}/{}", self.base_topic, suffix)) else {
            tracing::warn!("invalid topic for command to {entity_name:?}");
            return;
        };
        self.diagnostics.log_outbound_publish(&topic.name, &payload);
        self.transport.enqueue(Message::new(&topic, payload.to_string().into_bytes()));
    }

    /// Run the event loop until shutdown is signalled. Exposed separately
    /// from `connect`/`on_start`/`on_configure` so callers can drive startup
    /// explicitly (as the test harness and `main.rs` both do).
    pub async fn run_until_shutdown(&mut self) -> Result<(), BridgeError> {
        let mut queue_tick = interval(QUEUE_TICK_PERIOD);
        let mut heartbeat_tick = interval(self.transport.keepalive());
        let mut replay_fired = false;
        let replay_sleep = sleep(REPLAY_DELAY);
        tokio::pin!(replay_sleep);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    return Ok(());
                }
                () = &mut replay_sleep, if !replay_fired => {
                    replay_fired = true;
                    self.controller.replay(&mut self.host).await;
                }
                event = self.transport.next_event(&mut queue_tick, &mut heartbeat_tick) => {
                    match event {
                        TransportEvent::Message(message) => self.handle_message(message).await,
                        TransportEvent::Connection(event) => self.handle_connection_event(event),
                        TransportEvent::Error(err) => tracing::warn!("MQTT error: {err}"),
                        TransportEvent::QueueTick | TransportEvent::Heartbeat => {}
                        TransportEvent::Closed => {
                            tracing::warn!("MQTT connection channel closed, shutting down");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    pub async fn shutdown(self) {
        if self.controller.settings().unregister_on_shutdown {
            tracing::info!("unregisterOnShutdown set, but host-side teardown is out of scope here");
        }
        self.transport.close().await;
    }

    fn handle_connection_event(&self, event: ConnectionEvent) {
        tracing::debug!("mqtt connection event: {event:?}");
    }

    async fn handle_message(&mut self, message: Message) {
        let Some(topic) = message.topic.name.strip_prefix(&format!("{}/", self.base_topic)) else {
            return;
        };
        let topic = topic.to_string();
        let Ok(raw) = message.payload_str() else {
            tracing::warn!("dropping non-utf8 payload on {}", message.topic.name);
            return;
        };

        match dispatch::DispatchedTopic::classify(&topic) {
            DispatchedTopic::BridgeState => {
                let online = match dispatch::parse_payload(raw) {
                    ParsedPayload::Json(value) => value.get("state").and_then(|s| s.as_str()).map(|s| s == "online"),
                    ParsedPayload::Bare(text) => Some(text == "online"),
                }
                .unwrap_or(false);
                self.controller.on_bridge_state(online);
            }
            DispatchedTopic::BridgeInfo => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    self.diagnostics.persist_bridge_info(&value);
                    match serde_json::from_value::<BridgeInfo>(value) {
                        Ok(info) => {
                            if let Err(err) = self.controller.on_bridge_info(info) {
                                tracing::error!("bridge/info rejected: {err}");
                            }
                        }
                        Err(err) => tracing::warn!("malformed bridge/info payload: {err}"),
                    }
                }
            }
            DispatchedTopic::BridgeDevices => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    self.diagnostics.persist_bridge_devices(&value);
                    match serde_json::from_value::<Vec<BridgeDevice>>(value) {
                        Ok(devices) => self.controller.on_bridge_devices(devices, &mut self.host).await,
                        Err(err) => tracing::warn!("malformed bridge/devices payload: {err}"),
                    }
                }
            }
            DispatchedTopic::BridgeGroups => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    self.diagnostics.persist_bridge_groups(&value);
                    match serde_json::from_value::<Vec<BridgeGroup>>(value) {
                        Ok(groups) => self.controller.on_bridge_groups(groups, &mut self.host).await,
                        Err(err) => tracing::warn!("malformed bridge/groups payload: {err}"),
                    }
                }
            }
            DispatchedTopic::BridgeExtensions => {
                tracing::debug!("bridge/extensions: {raw}");
            }
            DispatchedTopic::RequestInformational => {
                tracing::info!("bridge request/event: {raw}");
            }
            DispatchedTopic::BridgeEvent => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    match dispatch::classify_bridge_event(&value) {
                        BridgeEventKind::DeviceLeave => {
                            if let Some(friendly_name) = data_str(&value, "friendly_name") {
                                self.controller.on_device_removed(friendly_name, &mut self.host).await;
                            }
                        }
                        BridgeEventKind::DeviceInterview => {
                            let status = data_str(&value, "status");
                            let ieee = data_str(&value, "ieee_address");
                            if status == Some("successful") {
                                if let Some(ieee) = ieee {
                                    self.controller.on_device_interview_successful(ieee, &mut self.host).await;
                                }
                            }
                        }
                        BridgeEventKind::DeviceJoined | BridgeEventKind::DeviceAnnounce => {
                            tracing::debug!("bridge/event: {raw}");
                        }
                        BridgeEventKind::Other => {}
                    }
                }
            }
            DispatchedTopic::ResponseNetworkMap(format) => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    let text = value.get("data").and_then(|d| d.as_str()).unwrap_or(raw).to_string();
                    match format {
                        NetworkMapFormat::Graphviz => self.diagnostics.persist_networkmap_graphviz(&text),
                        NetworkMapFormat::Plantuml => self.diagnostics.persist_networkmap_plantuml(&text),
                        NetworkMapFormat::Raw => self.diagnostics.persist_networkmap_raw(&value),
                    }
                }
            }
            DispatchedTopic::ResponsePermitJoin => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    let device = data_str(&value, "device");
                    let enabled = value
                        .get("data")
                        .and_then(|d| d.get("value"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    self.controller.on_permit_join(device, enabled, &mut self.host).await;
                }
            }
            DispatchedTopic::ResponseDeviceRename => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    if let (Some(ieee), Some(from), Some(to)) = (
                        data_str(&value, "ieee_address"),
                        data_str(&value, "from"),
                        data_str(&value, "to"),
                    ) {
                        self.controller.on_device_rename(ieee, from, to, &mut self.host).await;
                    }
                }
            }
            DispatchedTopic::ResponseDeviceRemove => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    if status_is_ok(&value) {
                        if let Some(friendly_name) = data_str(&value, "friendly_name") {
                            self.controller.on_device_removed(friendly_name, &mut self.host).await;
                        }
                    }
                }
            }
            DispatchedTopic::ResponseGroupAdd => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    if let Some(friendly_name) = data_str(&value, "friendly_name") {
                        match self.controller.find_group(friendly_name).cloned() {
                            Some(group) => self.controller.on_group_added(&group, &mut self.host).await,
                            None => tracing::warn!("group/add response for unknown group {friendly_name:?}"),
                        }
                    }
                }
            }
            DispatchedTopic::ResponseGroupRemove => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    if status_is_ok(&value) {
                        if let Some(friendly_name) = data_str(&value, "friendly_name") {
                            self.controller.on_group_removed(friendly_name, &mut self.host).await;
                        }
                    }
                }
            }
            DispatchedTopic::ResponseGroupRename => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    if status_is_ok(&value) {
                        if let (Some(from), Some(to)) = (data_str(&value, "from"), data_str(&value, "to")) {
                            match self.controller.find_group(to).cloned() {
                                Some(group) => self.controller.on_group_renamed(from, &group, &mut self.host).await,
                                None => tracing::warn!("group/rename response for unknown group {to:?}"),
                            }
                        }
                    }
                }
            }
            DispatchedTopic::ResponseGroupAddMember | DispatchedTopic::ResponseGroupRemoveMember => {
                if let ParsedPayload::Json(value) = dispatch::parse_payload(raw) {
                    if status_is_ok(&value) {
                        if let Some(friendly_name) = data_str(&value, "group") {
                            match self.controller.find_group(friendly_name).cloned() {
                                Some(group) => self.controller.on_group_membership_changed(&group, &mut self.host).await,
                                None => tracing::warn!("group/members response for unknown group {friendly_name:?}"),
                            }
                        }
                    }
                }
            }
            DispatchedTopic::ResponseDeviceOptions => {
                tracing::debug!("device/options response on {topic}: {raw}");
            }
            DispatchedTopic::Debug => {
                tracing::debug!("{topic}: {raw}");
            }
            DispatchedTopic::EntityState { entity_name } => {
                if !self.controller.settings().entity_allowed(&entity_name) {
                    return;
                }
                let payload = match dispatch::parse_payload(raw) {
                    ParsedPayload::Json(value) => value,
                    ParsedPayload::Bare(text) => serde_json::json!({ "state": text }),
                };
                let writes = self.controller.record_payload(&entity_name, payload.clone());
                if writes.is_empty() {
                    self.diagnostics.log_unknown_payload(&entity_name, &payload);
                    return;
                }
                if let Some(entity) = self.controller.registry.get(&entity_name) {
                    for write in writes {
                        for endpoint_id in entity.endpoints_for_types(&write.device_types) {
                            self.host.set_attribute(endpoint_id, write.attribute).await;
                        }
                    }
                }
            }
            DispatchedTopic::EntityAvailability { entity_name } => {
                let online = match dispatch::parse_payload(raw) {
                    ParsedPayload::Json(value) => value.get("state").and_then(Value::as_str).map(|s| s == "online"),
                    ParsedPayload::Bare(text) => Some(text == "online"),
                }
                .unwrap_or(false);
                self.controller.on_availability(&entity_name, online, &mut self.host).await;
            }
            DispatchedTopic::Ignored => {}
        }
    }
}

fn data_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get("data").and_then(|d| d.get(field)).and_then(Value::as_str)
}

fn status_is_ok(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some("ok")
}
