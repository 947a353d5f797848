//! Bridges a Zigbee2MQTT gateway's MQTT device tree onto a northbound
//! endpoint fabric: one bridged endpoint per resolved device type, mirrored
//! attribute writes on inbound state, translated `set`/`get` publishes on
//! outbound commands. See `engine::Engine` for the event loop that ties the
//! pieces together.

pub mod config;
pub mod controller;
pub mod device_types;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod model;
pub mod northbound;
pub mod pipeline;
pub mod registry;
pub mod transport;

pub use config::{BridgeOpt, BridgeSettings};
pub use engine::Engine;
pub use error::BridgeError;
pub use northbound::{NorthboundHost, RecordingHost};

/// Load settings, connect, and drive one bridge instance through
/// `onStart`/`onConfigure` and into the main loop, until shutdown.
///
/// No concrete northbound fabric integration ships in this crate (see
/// `northbound::NorthboundHost`'s doc comment): this entry point runs
/// against `RecordingHost` so the binary is runnable stand-alone, logging
/// every registration/attribute write it would otherwise hand off to a real
/// host. A deployment wires its own `NorthboundHost` and calls
/// `Engine::connect` directly instead of going through `run`.
pub async fn run(opt: BridgeOpt) -> anyhow::Result<()> {
    let settings = BridgeSettings::load_from_file(&opt.config_file)
        .unwrap_or_else(|err| {
            tracing::warn!(
                "failed to load {}: {err}; falling back to defaults",
                opt.config_file.display()
            );
            BridgeSettings::default()
        });
    let settings = opt.apply(settings);

    let data_path = std::env::temp_dir().join("zigbee-mapper");
    std::fs::create_dir_all(&data_path)?;

    let host = RecordingHost::new("2.0.0");
    let mut engine = Engine::connect(settings, host, data_path).await?;

    tracing::info!("waiting for the bridge to become ready");
    engine.on_start().await?;
    engine.on_configure().await;
    tracing::info!("bridge ready, entering the main loop");
    engine.run_until_shutdown().await?;
    engine.shutdown().await;
    Ok(())
}
