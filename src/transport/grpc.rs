//! Typed remote-procedure adapter.
//!
//! Opens a channel to the log service, issues one `WriteLog` call under a
//! fixed deadline and releases the connection. The deadline travels with
//! the request (`grpc-timeout`) and is also enforced locally, so an
//! unresponsive peer can never hold a request task past it.

use super::logs::{log_service_client::LogServiceClient, Log, LogRequest};
use super::{Reply, Transport, TransportError};
use crate::envelope::CommandEnvelope;
use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::Endpoint;
use tonic::{Code, Request, Status};
use tracing::{debug, info, warn};

/// Fixed deadline on the remote call
const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

/// Map a call status onto the adapter taxonomy.
fn classify_status(status: Status, deadline: Duration) -> TransportError {
    match status.code() {
        Code::DeadlineExceeded => TransportError::Timeout(deadline.as_millis() as u64),
        Code::Unavailable => TransportError::Unavailable(status.message().to_string()),
        _ => TransportError::Rejected(format!("{}: {}", status.code(), status.message())),
    }
}

/// An adapter that performs one typed call against the log service.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    /// Endpoint URI (e.g. `http://logger-service:50051`)
    endpoint: String,

    /// Deadline attached to every call
    deadline: Duration,
}

impl GrpcTransport {
    /// Create a new adapter for the given endpoint URI
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Set custom deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    fn name(&self) -> &str {
        "grpc"
    }

    async fn invoke(&self, command: &CommandEnvelope) -> Result<Reply, TransportError> {
        let payload = command
            .log
            .as_ref()
            .ok_or(TransportError::WrongPayload("grpc"))?;

        debug!(endpoint = %self.endpoint, "Dialing log service");

        let channel = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| TransportError::Unavailable(format!("bad endpoint: {e}")))?
            .connect_timeout(self.deadline)
            .connect()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "Dial failed");
                TransportError::Unavailable(e.to_string())
            })?;

        let mut client = LogServiceClient::new(channel);

        let mut request = Request::new(LogRequest {
            log_entry: Some(Log {
                name: payload.name.clone(),
                data: payload.data.clone(),
            }),
        });
        request.set_timeout(self.deadline);

        let response = tokio::time::timeout(self.deadline, client.write_log(request))
            .await
            .map_err(|_| {
                warn!(endpoint = %self.endpoint, "Call outlived its deadline");
                TransportError::Timeout(self.deadline.as_millis() as u64)
            })?
            .map_err(|status| classify_status(status, self.deadline))?;

        let result = response.into_inner().result;
        info!(endpoint = %self.endpoint, result = %result, "Log entry written");
        Ok(Reply::message(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::LogPayload;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let transport =
            GrpcTransport::new("http://logger-service:50051").with_deadline(Duration::from_secs(2));

        assert_eq!(transport.endpoint, "http://logger-service:50051");
        assert_eq!(transport.deadline, Duration::from_secs(2));
        assert_eq!(transport.name(), "grpc");
    }

    #[test]
    fn test_classify_status() {
        let deadline = Duration::from_secs(1);

        assert!(matches!(
            classify_status(Status::new(Code::DeadlineExceeded, "too slow"), deadline),
            TransportError::Timeout(1000)
        ));
        assert!(matches!(
            classify_status(Status::new(Code::Unavailable, "gone"), deadline),
            TransportError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(Status::new(Code::Internal, "broken"), deadline),
            TransportError::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_wrong_payload_short_circuits() {
        let transport = GrpcTransport::new("http://127.0.0.1:1");
        let envelope: CommandEnvelope =
            serde_json::from_value(json!({"action": "mail", "mail": {
                "from": "a@b.com", "to": "c@d.com", "subject": "s", "message": "m"
            }}))
            .unwrap();

        let err = transport.invoke(&envelope).await.unwrap_err();
        assert!(matches!(err, TransportError::WrongPayload("grpc")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_maps_to_unavailable() {
        // Nothing listens on the discard port; the dial must fail inside
        // the connect timeout and classify as unavailable.
        let transport =
            GrpcTransport::new("http://127.0.0.1:9").with_deadline(Duration::from_millis(200));
        let envelope = CommandEnvelope::log(LogPayload {
            name: "event".to_string(),
            data: "x".to_string(),
        });

        let err = transport.invoke(&envelope).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unavailable(_) | TransportError::Timeout(_)
        ));
    }
}
