use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use relay::config::RelayConfig;
use relay::connect::{BrokerConnection, ConnectionState, RetryPolicy};
use relay::envelope::ResponseEnvelope;
use relay::Dispatcher;

/// Application metrics
struct Metrics {
    commands_received: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    fn new() -> Self {
        Self {
            commands_received: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn increment_commands(&self) {
        self.commands_received.fetch_add(1, Ordering::Relaxed);
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

struct AppState {
    dispatcher: Dispatcher,
    broker: Arc<BrokerConnection>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() {
    // 1. Initialize logging
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    // 2. Load configuration
    let config = match RelayConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            RelayConfig::default()
        }
    };

    // 3. Establish the broker connection; exhausting the attempt cap
    //    means no partial service.
    let policy = RetryPolicy {
        max_attempts: config.broker.connect_attempts,
    };
    let broker = match BrokerConnection::establish(&config.broker.url, policy).await {
        Ok(connection) => Arc::new(connection),
        Err(e) => {
            error!(error = %e, "Broker connection failed, refusing to start");
            std::process::exit(1);
        }
    };

    // 4. Assemble the dispatcher
    let dispatcher = match Dispatcher::from_config(&config, &broker).await {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!(error = %e, "Dispatcher assembly failed, refusing to start");
            std::process::exit(1);
        }
    };

    let app_state = Arc::new(AppState {
        dispatcher,
        broker,
        metrics: Metrics::new(),
    });

    // 5. Build and start the server
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/handle", post(handle_command))
        .with_state(app_state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.server.port)
        .parse()
        .expect("Invalid address");

    info!("Relay server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let broker_state = state.broker.state();

    let status = match broker_state {
        ConnectionState::Connected | ConnectionState::Connecting => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "broker": broker_state.to_string(),
        })),
    )
}

/// Metrics endpoint - returns server metrics as JSON
async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = state.metrics.uptime_seconds();
    let commands_received = state.metrics.commands_received.load(Ordering::Relaxed);

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "commands": {
            "received": commands_received
        },
        "status": "running"
    }))
}

async fn handle_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<ResponseEnvelope>) {
    state.metrics.increment_commands();

    // Extract or generate correlation ID
    let correlation_id = headers
        .get("X-Correlation-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    debug!(correlation_id = %correlation_id, "Command received");

    let (status, envelope) = state.dispatcher.dispatch(&body).await;

    info!(
        correlation_id = %correlation_id,
        status = status.as_u16(),
        error = envelope.error,
        "Command answered"
    );

    (status, Json(envelope))
}
