use std::collections::HashSet;

/// The northbound device-type codes an entity's exposes can resolve to.
/// Evaluated first-match-wins by the declarative table in `device_types.rs`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DeviceTypeCode {
    OnOffLight,
    DimmableLight,
    ColorTemperatureLight,
    ColorLight,
    Outlet,
    Switch,
    ContactSensor,
    WaterLeakSensor,
    SmokeSensor,
    CarbonMonoxideSensor,
    TemperatureSensor,
    HumiditySensor,
    PressureSensor,
    IlluminanceSensor,
    OccupancySensor,
    AirQualitySensor,
    Cover,
    Lock,
    Thermostat,
    GenericSwitch,
}

/// Tri-state availability: unknown until the first `availability` message
/// arrives for an entity.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum Availability {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl Availability {
    pub fn from_bool(online: bool) -> Self {
        if online {
            Availability::Online
        } else {
            Availability::Offline
        }
    }
}

/// Which kind of upstream object this entity was registered from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EntitySource {
    Device { ieee_address: String },
    Group { id: u32 },
}

/// A single bridged entity: the northbound-facing projection of either a
/// `BridgeDevice` or a `BridgeGroup`.
#[derive(Debug, Clone)]
pub struct Entity {
    pub entity_name: String,
    pub source: EntitySource,
    pub is_router: bool,
    pub availability: Availability,
    pub last_payload: Option<serde_json::Value>,
    pub device_types: HashSet<DeviceTypeCode>,
    /// The bridged northbound endpoint(s) this entity registered, one per
    /// resolved device type.
    pub bridged_endpoints: Vec<(DeviceTypeCode, crate::northbound::EndpointId)>,
}

impl Entity {
    pub fn new(entity_name: String, source: EntitySource, is_router: bool) -> Self {
        Entity {
            entity_name,
            source,
            is_router,
            availability: Availability::Unknown,
            last_payload: None,
            device_types: HashSet::new(),
            bridged_endpoints: Vec::new(),
        }
    }

    pub fn ieee_address(&self) -> Option<&str> {
        match &self.source {
            EntitySource::Device { ieee_address } => Some(ieee_address),
            EntitySource::Group { .. } => None,
        }
    }

    pub fn group_id(&self) -> Option<u32> {
        match &self.source {
            EntitySource::Device { .. } => None,
            EntitySource::Group { id } => Some(*id),
        }
    }

    /// The bridged endpoints whose device type is in `types`, the set a
    /// single inbound attribute update should broadcast to.
    pub fn endpoints_for_types<'a>(
        &'a self,
        types: &'a [DeviceTypeCode],
    ) -> impl Iterator<Item = crate::northbound::EndpointId> + 'a {
        self.bridged_endpoints
            .iter()
            .filter(move |(dt, _)| types.contains(dt))
            .map(|(_, id)| *id)
    }

    pub fn all_endpoints(&self) -> impl Iterator<Item = crate::northbound::EndpointId> + '_ {
        self.bridged_endpoints.iter().map(|(_, id)| *id)
    }
}
