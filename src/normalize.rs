//! Result normalization.
//!
//! Every adapter outcome, success or failure, leaves the dispatcher as an
//! HTTP status plus a [`ResponseEnvelope`]. The mapping is the one status
//! contract of the whole surface:
//!
//! ```text
//! outcome                        | status
//! -------------------------------|-------
//! adapter reply                  | 202
//! malformed body / bad envelope  | 400
//! credential rejection           | 401
//! any other upstream failure     | 500
//! ```

use crate::dispatch::DispatchError;
use crate::envelope::ResponseEnvelope;
use crate::transport::{Reply, TransportError};
use axum::http::StatusCode;

/// Status class for a failed dispatch.
fn status_for(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::Malformed(_) | DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
        DispatchError::Transport(TransportError::CredentialInvalid) => StatusCode::UNAUTHORIZED,
        DispatchError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Turn a dispatch outcome into the outward response.
pub fn respond(outcome: Result<Reply, DispatchError>) -> (StatusCode, ResponseEnvelope) {
    match outcome {
        Ok(reply) => (
            StatusCode::ACCEPTED,
            ResponseEnvelope::ok(reply.message, reply.data),
        ),
        Err(error) => (status_for(&error), ResponseEnvelope::fail(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ValidationError;
    use serde_json::json;

    #[test]
    fn test_success_is_accepted() {
        let (status, envelope) = respond(Ok(Reply::with_data("done", json!({"id": 1}))));

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(!envelope.error);
        assert_eq!(envelope.message, "done");
        assert_eq!(envelope.data.unwrap()["id"], 1);
    }

    #[test]
    fn test_validation_failures_are_client_faults() {
        let unknown = DispatchError::Validation(ValidationError::UnknownAction("x".to_string()));
        let (status, envelope) = respond(Err(unknown));

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(envelope.error);
        assert_eq!(envelope.message, "invalid action");
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_malformed_body_is_a_client_fault() {
        let parse_error = serde_json::from_str::<crate::CommandEnvelope>("{").unwrap_err();
        let (status, envelope) = respond(Err(DispatchError::Malformed(parse_error)));

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(envelope.error);
    }

    #[test]
    fn test_credential_rejection_is_unauthorized() {
        let (status, envelope) =
            respond(Err(DispatchError::Transport(TransportError::CredentialInvalid)));

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(envelope.error);
        assert_eq!(envelope.message, "invalid credentials");
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_upstream_failures_are_server_faults() {
        for error in [
            TransportError::Unavailable("connection refused".to_string()),
            TransportError::Rejected("status 500".to_string()),
            TransportError::Timeout(1000),
            TransportError::WrongPayload("rpc"),
        ] {
            let (status, envelope) = respond(Err(DispatchError::Transport(error)));
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(envelope.error);
        }
    }
}
