//! Top-level error type, modeled on `tedge_mapper::core::error::MapperError`:
//! one `thiserror` enum wrapping every fallible collaborator, reserved for
//! the handful of failures that warrant aborting the bridge outright.
//! Everything else is logged and the event loop continues.

use crate::model::bridge_info::BridgeInfoError;
use crate::northbound::NorthboundError;
use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Mqtt(#[from] mqtt_channel::MqttError),

    #[error(transparent)]
    Northbound(#[from] NorthboundError),

    #[error(transparent)]
    BridgeInfo(#[from] BridgeInfoError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] anyhow::Error),

    #[error("onStart bounded wait expired after {0:?}: bridge never reached ready state")]
    StartupTimedOut(std::time::Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
