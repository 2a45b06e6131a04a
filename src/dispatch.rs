//! Command dispatcher.
//!
//! The [`Dispatcher`] takes a raw request body and drives it through the
//! whole per-request pipeline: parse, validate, select one transport
//! adapter by action tag, invoke it and normalize the outcome. It holds
//! no state across calls; every error is caught here and becomes a
//! response envelope, never a crash.
//!
//! # Adapter selection
//!
//! The mapping is closed:
//!
//! ```text
//! action | adapter
//! -------|--------------------------------------------
//! auth   | HTTP, auth target
//! mail   | HTTP, mailer target
//! log    | one of HTTP / RPC / gRPC / queue, chosen by
//!        | the configured log strategy at startup
//! ```
//!
//! Several equivalent log adapters exist as alternative delivery
//! strategies, but exactly one is active per deployment.

use crate::bus::{producer::Producer, BusError};
use crate::config::{LogStrategy, RelayConfig};
use crate::connect::BrokerConnection;
use crate::envelope::{Action, CommandEnvelope, ResponseEnvelope, ValidationError};
use crate::normalize;
use crate::transport::{
    GrpcTransport, HttpTarget, HttpTransport, QueueTransport, Reply, RpcTransport, Transport,
    TransportError,
};
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Everything that can go wrong between a raw body and a reply.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The body was not a parseable envelope
    #[error("{0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope parsed but failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The selected adapter failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Routes validated commands to exactly one transport adapter.
pub struct Dispatcher {
    auth: Arc<dyn Transport>,
    mail: Arc<dyn Transport>,
    log: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Assemble a dispatcher from explicit adapters.
    pub fn new(auth: Arc<dyn Transport>, mail: Arc<dyn Transport>, log: Arc<dyn Transport>) -> Self {
        Self { auth, mail, log }
    }

    /// Assemble the deployment dispatcher from configuration.
    ///
    /// The broker connection is only touched when the queue strategy is
    /// active (the producer declares the exchange on construction).
    pub async fn from_config(
        config: &RelayConfig,
        broker: &BrokerConnection,
    ) -> Result<Self, BusError> {
        let http_timeout = Duration::from_millis(config.dispatch.http_timeout_ms);

        let auth = Arc::new(
            HttpTransport::new(HttpTarget::Auth, config.targets.auth.clone())
                .with_timeout(http_timeout),
        );
        let mail = Arc::new(
            HttpTransport::new(HttpTarget::Mailer, config.targets.mailer.clone())
                .with_timeout(http_timeout),
        );

        let log: Arc<dyn Transport> = match config.dispatch.log_strategy {
            LogStrategy::Http => Arc::new(
                HttpTransport::new(HttpTarget::Logger, config.targets.logger.clone())
                    .with_timeout(http_timeout),
            ),
            LogStrategy::Rpc => Arc::new(
                RpcTransport::new(config.targets.logger_rpc.clone())
                    .with_timeout(Duration::from_millis(config.dispatch.rpc_timeout_ms)),
            ),
            LogStrategy::Grpc => Arc::new(
                GrpcTransport::new(config.targets.logger_grpc.clone())
                    .with_deadline(Duration::from_millis(config.dispatch.grpc_deadline_ms)),
            ),
            LogStrategy::Queue => Arc::new(QueueTransport::new(Producer::new(broker).await?)),
        };

        info!(
            log_strategy = %config.dispatch.log_strategy,
            "Dispatcher assembled"
        );

        Ok(Self::new(auth, mail, log))
    }

    /// The adapter serving an action.
    fn adapter_for(&self, action: Action) -> &Arc<dyn Transport> {
        match action {
            Action::Auth => &self.auth,
            Action::Mail => &self.mail,
            Action::Log => &self.log,
        }
    }

    /// Dispatch one raw request body.
    ///
    /// Always answers; malformed and invalid bodies are rejected before
    /// any adapter is consulted.
    pub async fn dispatch(&self, body: &[u8]) -> (StatusCode, ResponseEnvelope) {
        let outcome = self.run(body).await;

        if let Err(e) = &outcome {
            warn!(error = %e, "Command failed");
        }

        normalize::respond(outcome)
    }

    async fn run(&self, body: &[u8]) -> Result<Reply, DispatchError> {
        let envelope: CommandEnvelope = serde_json::from_slice(body)?;
        let action = envelope.validate()?;

        let adapter = self.adapter_for(action);
        debug!(action = %action, adapter = adapter.name(), "Dispatching command");

        let reply = adapter.invoke(&envelope).await?;

        info!(action = %action, adapter = adapter.name(), "Command completed");
        Ok(reply)
    }
}
