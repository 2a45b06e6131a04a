//! Asynchronous publish adapter.
//!
//! Hands the log payload to the topic exchange instead of calling the log
//! store directly. The publish itself is the whole contract: no delivery
//! confirmation exists, so a broker-side failure after the publish call
//! goes undetected (at-most-once).

use super::{Reply, Transport, TransportError};
use crate::bus::{producer::Producer, EventMessage};
use crate::envelope::{CommandEnvelope, LogPayload};
use crate::LOG_ROUTING_KEY;
use async_trait::async_trait;
use tracing::debug;

/// Shape the bus event for a log payload.
fn to_event(payload: &LogPayload) -> EventMessage {
    EventMessage::new(&payload.name, &payload.data)
}

/// An adapter that publishes log commands as bus events.
#[derive(Debug, Clone)]
pub struct QueueTransport {
    producer: Producer,
}

impl QueueTransport {
    /// Create an adapter over an existing producer
    pub fn new(producer: Producer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl Transport for QueueTransport {
    fn name(&self) -> &str {
        "queue"
    }

    async fn invoke(&self, command: &CommandEnvelope) -> Result<Reply, TransportError> {
        let payload = command
            .log
            .as_ref()
            .ok_or(TransportError::WrongPayload("queue"))?;

        debug!(routing_key = LOG_ROUTING_KEY, name = %payload.name, "Publishing log event");

        self.producer
            .publish(&to_event(payload), LOG_ROUTING_KEY)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        Ok(Reply::message("log event published"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_carries_payload_verbatim() {
        let payload = LogPayload {
            name: "event".to_string(),
            data: "something happened".to_string(),
        };

        let event = to_event(&payload);
        assert_eq!(event.name, "event");
        assert_eq!(event.data, "something happened");
    }

    #[test]
    fn test_routing_key_is_in_the_log_subject_space() {
        assert!(LOG_ROUTING_KEY.starts_with("log."));
    }
}
