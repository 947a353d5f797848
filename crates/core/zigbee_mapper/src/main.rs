use clap::Parser;

/// Initialize a `tracing_subscriber` reporting on stdout, `debug` raising the
/// default level from INFO to DEBUG. Uses an `EnvFilter` so `RUST_LOG` still
/// overrides the `--debug` flag when set.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = zigbee_mapper::BridgeOpt::parse();
    init_tracing(opt.debug);
    zigbee_mapper::run(opt).await
}
