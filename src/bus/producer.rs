//! Event producer.
//!
//! Publishes [`EventMessage`]s to the topic exchange under a routing key.
//! Delivery is at-most-once from the producer's perspective: no broker
//! acknowledgement is awaited and transient publish failures are not
//! retried.

use super::{ensure_exchange, BusError, EventMessage};
use crate::connect::BrokerConnection;
use async_nats::Client;
use tracing::{debug, info};

/// A handle for publishing events to the topic exchange.
///
/// Constructed from the owning [`BrokerConnection`]; nothing else hands
/// out broker access.
#[derive(Debug, Clone)]
pub struct Producer {
    client: Client,
}

impl Producer {
    /// Create a producer, declaring the exchange on the way.
    pub async fn new(connection: &BrokerConnection) -> Result<Self, BusError> {
        ensure_exchange(&connection.jetstream()).await?;

        debug!(exchange = crate::EVENT_EXCHANGE, "Producer ready");
        Ok(Self {
            client: connection.handle(),
        })
    }

    /// Publish one event under the given routing key.
    ///
    /// Returns once the event left this process; whether any queue was
    /// bound to the key, or whether delivery succeeded, is unknown.
    pub async fn publish(
        &self,
        message: &EventMessage,
        routing_key: &str,
    ) -> Result<(), BusError> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(routing_key.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        // Push the event out of the client buffer promptly; this is not a
        // delivery confirmation.
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        info!(
            routing_key = routing_key,
            name = %message.name,
            "Event published"
        );
        Ok(())
    }
}
