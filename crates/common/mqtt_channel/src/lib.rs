//! Connect to an MQTT broker, publish and subscribe.
//!
//! Extends the plain TCP+TLS connection model with the broker URL schemes
//! (`mqtt://`, `mqtts://`, `ws://`, `wss://`, `mqtt+unix://`), TLS material
//! loading, and heartbeat topic naming a Zigbee2MQTT-facing bridge needs.
#![forbid(unsafe_code)]

mod channel;
mod config;
mod connection;
mod errors;
mod messages;
mod topics;

#[cfg(test)]
mod tests;

pub use channel::*;
pub use config::*;
pub use connection::*;
pub use errors::*;
pub use messages::*;
pub use topics::*;

pub use futures::channel::mpsc::UnboundedReceiver;
pub use futures::channel::mpsc::UnboundedSender;
pub use futures::Sink;
pub use futures::SinkExt;
pub use futures::Stream;
pub use futures::StreamExt;

pub use rumqttc::QoS;
