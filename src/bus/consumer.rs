//! Event listener.
//!
//! Binds routing-key patterns on the topic exchange through an exclusive,
//! server-named, auto-deleted queue and dispatches every delivered event
//! to a local handler. Messages are auto-acknowledged: an event counts as
//! handled the instant it is delivered, regardless of what the handler
//! does with it. Handler failures are logged and discarded; they never
//! stop the consume loop and never cause redelivery.
//!
//! # Handler routing
//!
//! ```text
//! name            | handler
//! ----------------|---------------------------
//! log, event      | persist as log entry
//! auth            | no-op
//! anything else   | persist as log entry (catch-all fan-in)
//! ```

use super::{ensure_exchange, BusError, EventMessage};
use crate::connect::BrokerConnection;
use crate::envelope::{CommandEnvelope, LogPayload};
use crate::shutdown::ShutdownSignal;
use crate::transport::{HttpTransport, Transport, TransportError};
use async_nats::jetstream;
use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default bound on concurrently running handlers
const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// A local reaction to one delivered event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in logs (e.g. "persist-log")
    fn name(&self) -> &str;

    /// React to one event. Errors are logged by the caller and dropped.
    async fn handle(&self, event: &EventMessage) -> Result<(), TransportError>;
}

/// Writes the event to the log store over the logger HTTP target.
pub struct PersistLogHandler {
    logger: HttpTransport,
}

impl PersistLogHandler {
    pub fn new(logger: HttpTransport) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl EventHandler for PersistLogHandler {
    fn name(&self) -> &str {
        "persist-log"
    }

    async fn handle(&self, event: &EventMessage) -> Result<(), TransportError> {
        let command = CommandEnvelope::log(LogPayload {
            name: event.name.clone(),
            data: event.data.clone(),
        });

        self.logger.invoke(&command).await?;
        Ok(())
    }
}

/// Placeholder for auth events; intentionally does nothing.
pub struct AuthEventHandler;

#[async_trait]
impl EventHandler for AuthEventHandler {
    fn name(&self) -> &str {
        "auth"
    }

    async fn handle(&self, _event: &EventMessage) -> Result<(), TransportError> {
        Ok(())
    }
}

/// The fixed name-to-handler routing table.
pub struct HandlerSet {
    persist: Arc<dyn EventHandler>,
    auth: Arc<dyn EventHandler>,
}

impl HandlerSet {
    pub fn new(persist: Arc<dyn EventHandler>, auth: Arc<dyn EventHandler>) -> Self {
        Self { persist, auth }
    }

    /// The standard wiring: persist through the given logger target,
    /// ignore auth events.
    pub fn for_logger(logger: HttpTransport) -> Self {
        Self::new(
            Arc::new(PersistLogHandler::new(logger)),
            Arc::new(AuthEventHandler),
        )
    }

    /// Select the handler for an event name.
    ///
    /// Unrecognized names fan in to the persist handler; no name is
    /// treated as invalid input.
    fn route(&self, name: &str) -> Arc<dyn EventHandler> {
        match name {
            "log" | "event" => self.persist.clone(),
            "auth" => self.auth.clone(),
            _ => self.persist.clone(),
        }
    }

    /// Dispatch one event to its handler.
    pub async fn handle(&self, event: &EventMessage) -> Result<(), TransportError> {
        let handler = self.route(&event.name);
        debug!(name = %event.name, handler = handler.name(), "Handling event");
        handler.handle(event).await
    }
}

/// Consumer configuration binding the given patterns.
///
/// No durable name, so the broker names the consumer and deletes it when
/// the subscription goes away; `AckPolicy::None` is the auto-acknowledge,
/// at-most-once mode.
fn queue_binding(patterns: &[String]) -> pull::Config {
    pull::Config {
        filter_subjects: patterns.to_vec(),
        ack_policy: AckPolicy::None,
        deliver_policy: DeliverPolicy::New,
        ..Default::default()
    }
}

/// The long-lived consume loop over the topic exchange.
pub struct Listener {
    jetstream: jetstream::Context,
    max_in_flight: usize,
}

impl Listener {
    /// Create a listener on the given broker connection.
    pub fn new(connection: &BrokerConnection) -> Self {
        Self {
            jetstream: connection.jetstream(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Bound the number of concurrently running handlers.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Consume events matching `patterns` until shutdown.
    ///
    /// Each delivered event runs in its own task; the receive loop keeps
    /// consuming while handlers run. When `max_in_flight` handlers are
    /// already running, the loop blocks for a free slot instead of
    /// dropping or buffering without bound.
    pub async fn listen(
        &self,
        patterns: &[String],
        handlers: Arc<HandlerSet>,
        shutdown: &ShutdownSignal,
    ) -> Result<(), BusError> {
        let stream = ensure_exchange(&self.jetstream).await?;

        let consumer = stream
            .create_consumer(queue_binding(patterns))
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(
            exchange = crate::EVENT_EXCHANGE,
            patterns = ?patterns,
            max_in_flight = self.max_in_flight,
            "Waiting for events"
        );

        let limiter = Arc::new(Semaphore::new(self.max_in_flight));
        let mut shutdown_rx = shutdown.subscribe();
        let mut delivered: u64 = 0;

        loop {
            let next = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(delivered, "Shutdown signal received, listener stopping");
                    return Ok(());
                }
                next = messages.next() => next,
            };

            let Some(message) = next else {
                return Err(BusError::Subscribe("delivery stream ended".to_string()));
            };

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Failed to receive event");
                    continue;
                }
            };

            delivered += 1;

            let Ok(permit) = limiter.clone().acquire_owned().await else {
                return Ok(());
            };

            let handlers = handlers.clone();
            tokio::spawn(async move {
                let _permit = permit;

                let event = match serde_json::from_slice::<EventMessage>(&message.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Discarding undecodable event");
                        return;
                    }
                };

                if let Err(e) = handlers.handle(&event).await {
                    warn!(name = %event.name, error = %e, "Event handler failed");
                }
            });

            if delivered % 100 == 0 {
                info!(delivered, "Listener statistics");
            }
        }
    }
}
