//! SFU Session Core service
//!
//! Consumes client signaling from the message bus, negotiates media
//! sessions with the Media Control Server, and publishes responses and
//! lifecycle events back to the client-facing channels.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use anyhow::Result;
use confero_config::AppConfig;
use confero_logging::init_console_logging;
use confero_types::MediaKind;
use mcs_client::{nats::NatsMcsClient, MediaControlServer};
use message_bus_client::nats::NatsClient;
use metrics_exporter_prometheus::PrometheusBuilder;
use sfu_core::bridge::BridgeRegistry;
use sfu_core::manager::SessionManager;
use sfu_core::permissions::BusPermissionOracle;
use sfu_core::sources::SourceRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_console_logging("sfu-core", "info");

    info!("Starting SFU Session Core");

    // Load configuration
    let config = Arc::new(
        AppConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?,
    );

    info!(
        message_bus_url = config.message_bus_url(),
        video_media_server = config.video_media_server,
        "Configuration loaded"
    );

    // Expose Prometheus metrics
    let metrics_addr: SocketAddr = std::env::var("METRICS_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3014".to_string())
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid METRICS_ADDR: {}", e))?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    // Connect to the message bus
    let bus = Arc::new(
        NatsClient::new(config.message_bus_url())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to message bus: {}", e))?,
    );

    info!("Connected to message bus");

    // Connect to the MCS fabric and probe it once at boot
    let mcs: Arc<dyn MediaControlServer> = Arc::new(
        NatsMcsClient::connect(
            config.message_bus_url(),
            &config.mcs.subject_prefix,
            config.mcs.request_timeout(),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to MCS fabric: {}", e))?,
    );

    if mcs.wait_for_connection().await {
        info!("MCS reachable");
    } else {
        warn!("MCS unreachable at boot; sessions will fail until it returns");
    }

    // Shared state
    let bridges = BridgeRegistry::new();
    let sources = Arc::new(SourceRegistry::new());
    let bus: Arc<dyn message_bus_client::MessageBusClient> = bus;
    let permissions: Arc<dyn sfu_core::permissions::PermissionOracle> =
        Arc::new(BusPermissionOracle::new(Arc::clone(&bus)));

    // One manager per media type
    let mut handles = Vec::new();
    for kind in [MediaKind::Audio, MediaKind::Video] {
        let manager = SessionManager::new(
            kind,
            Arc::clone(&config),
            Arc::clone(&bus),
            Arc::clone(&mcs),
            Arc::clone(&permissions),
            Arc::clone(&bridges),
            Arc::clone(&sources),
        );
        handles.push(tokio::spawn(manager.run()));
    }

    // Wait for shutdown signal
    info!("SFU Session Core running. Press Ctrl+C to stop.");
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    // Graceful shutdown: give in-flight lifecycle tasks a bounded window
    info!("Waiting for in-flight operations to complete...");
    tokio::select! {
        _ = tokio::time::sleep(tokio::time::Duration::from_secs(10)) => {
            warn!("Shutdown timeout reached, forcing shutdown");
        }
        _ = futures::future::join_all(&mut handles) => {
            info!("Managers completed gracefully");
        }
    }

    for handle in handles {
        handle.abort();
    }

    info!("SFU Session Core stopped");
    Ok(())
}
