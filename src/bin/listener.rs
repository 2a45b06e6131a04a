//! Relay Listener - Event Consumer Process
//!
//! Binds routing-key patterns on the topic exchange and hands every
//! delivered event to its local handler. Runs until SIGTERM/SIGINT.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RELAY_CONFIG`: Path to the TOML config (default: "config/relay.toml")
//! - `RELAY_LISTENER_NAME`: Instance identifier (default: hostname or UUID)
//! - `RUST_LOG`: Logging level (default: "info")

use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use relay::bus::consumer::{HandlerSet, Listener};
use relay::config::RelayConfig;
use relay::connect::{BrokerConnection, RetryPolicy};
use relay::shutdown::ShutdownSignal;
use relay::transport::{HttpTarget, HttpTransport};

/// Get the listener name from config, environment or generate one.
fn listener_name(config: &RelayConfig) -> String {
    if let Some(name) = &config.listener.name {
        return name.clone();
    }

    if let Ok(name) = env::var("RELAY_LISTENER_NAME") {
        return name;
    }

    // Try hostname
    if let Ok(hostname) = hostname::get() {
        if let Some(name) = hostname.to_str() {
            return format!("listener-{}", name);
        }
    }

    // Fallback to UUID
    format!("listener-{}", uuid::Uuid::new_v4())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let config = match RelayConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            RelayConfig::default()
        }
    };

    let name = listener_name(&config);
    info!(
        name = %name,
        patterns = ?config.listener.patterns,
        "Relay listener starting"
    );

    // Broker connection is all this process is; exhaustion is fatal.
    let policy = RetryPolicy {
        max_attempts: config.broker.connect_attempts,
    };
    let broker = match BrokerConnection::establish(&config.broker.url, policy).await {
        Ok(connection) => connection,
        Err(e) => {
            error!(error = %e, "Broker connection failed, refusing to start");
            std::process::exit(1);
        }
    };

    // Events are persisted through the logger target; auth events are
    // acknowledged by doing nothing.
    let logger = HttpTransport::new(HttpTarget::Logger, config.targets.logger.clone())
        .with_timeout(Duration::from_millis(config.dispatch.http_timeout_ms));
    let handlers = Arc::new(HandlerSet::for_logger(logger));

    let listener = Listener::new(&broker).with_max_in_flight(config.listener.max_in_flight);

    // Translate OS signals into the shutdown broadcast
    let shutdown = ShutdownSignal::new();
    let signals = shutdown.clone();
    tokio::spawn(async move {
        signals.wait().await;
    });

    listener
        .listen(&config.listener.patterns, handlers, &shutdown)
        .await?;

    info!("Listener shutdown complete");
    Ok(())
}
