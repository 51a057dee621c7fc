use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ohmd::Config;
use ohmd::Engine;
use tracing_subscriber::prelude::*;

/// Republish OpenHardwareMonitor sensor trees as individual sensors
#[derive(Parser)]
#[command(name = "ohmd", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "ohmd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("ohmd starting");
    tracing::info!("Loaded config from: {}", cli.config.display());

    let mut engine = Engine::new();
    engine.register_integrations_from_config(&config);
    let engine = Arc::new(engine);

    let runner = engine.clone();
    let engine_task = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            tracing::error!("Engine stopped: {}", e);
        }
    });

    #[cfg(feature = "integration_mqtt")]
    if let Some(mqtt_config) = &config.integrations.mqtt {
        let client = ohmd::RumqttcClient::new(mqtt_config);
        let mut bridge = ohmd::MqttBridge::new(client, mqtt_config);
        match bridge.connect().await {
            Ok(()) => {
                tokio::spawn(bridge.run(engine.clone()));
            }
            Err(e) => tracing::error!("Failed to start MQTT bridge: {}", e),
        }
    }

    let api = config.api.clone().map(|api_config| {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(ohmd::api::serve(
            api_config.listen,
            api_config.port,
            engine.clone(),
            shutdown_rx,
        ));
        (shutdown_tx, task)
    });

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    engine.shutdown().await;

    if let Some((shutdown_tx, task)) = api {
        let _ = shutdown_tx.send(());
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("HTTP API server failed: {:#}", e),
            Err(e) => tracing::error!("HTTP API task panicked: {}", e),
        }
    }

    engine_task.abort();
    tracing::info!("ohmd shutdown complete");

    Ok(())
}
