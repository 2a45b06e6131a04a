//! Topic event bus.
//!
//! Events travel as [`EventMessage`] payloads over a single well-known
//! topic exchange, addressed by name, with dot-delimited routing keys
//! (e.g. `log.INFO`). The exchange is a JetStream stream; declaring it is
//! idempotent and safe to repeat from either the producing or the
//! consuming side.
//!
//! - [`producer::Producer`] publishes under a routing key, at-most-once.
//! - [`consumer::Listener`] binds routing-key patterns and dispatches
//!   each delivered event to a handler, fire-and-forget.

pub mod consumer;
pub mod producer;

use crate::{EVENT_EXCHANGE, EXCHANGE_SUBJECTS};
use async_nats::jetstream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The exchange could not be declared
    #[error("exchange declare failed: {0}")]
    Declare(String),

    /// The publish call itself failed (delivery is never confirmed)
    #[error("publish failed: {0}")]
    Publish(String),

    /// Queue declaration, binding or consumption failed
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Event payload could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The payload carried on the bus.
///
/// `name` is a coarse event-type discriminator consumed by the handler
/// dispatch inside the listener; `data` is an opaque string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub name: String,
    pub data: String,
}

impl EventMessage {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Stream configuration for the topic exchange.
fn exchange_config() -> jetstream::stream::Config {
    jetstream::stream::Config {
        name: EVENT_EXCHANGE.to_string(),
        subjects: EXCHANGE_SUBJECTS.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

/// Declare the topic exchange, returning a handle to it.
///
/// Repeating the declaration never errors and never duplicates the
/// exchange.
pub async fn ensure_exchange(
    jetstream: &jetstream::Context,
) -> Result<jetstream::stream::Stream, BusError> {
    jetstream
        .get_or_create_stream(exchange_config())
        .await
        .map_err(|e| BusError::Declare(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_message_round_trip() {
        let event = EventMessage::new("log", "something happened");
        let wire = serde_json::to_string(&event).unwrap();

        let parsed: EventMessage = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed.name, "log");
        assert_eq!(parsed.data, "something happened");
    }

    #[test]
    fn test_exchange_config_targets_fixed_name() {
        let config = exchange_config();
        assert_eq!(config.name, EVENT_EXCHANGE);
        assert_eq!(config.subjects, vec!["log.>".to_string()]);
    }
}
