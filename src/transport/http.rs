//! Synchronous HTTP adapter.
//!
//! One [`HttpTransport`] instance serves one downstream target (auth,
//! logger or mailer). It builds a JSON request from the command payload,
//! blocks for the full response and classifies the status code against
//! the target's success contract.
//!
//! # Example
//!
//! ```rust,ignore
//! use relay::transport::{HttpTransport, HttpTarget};
//! use std::time::Duration;
//!
//! let auth = HttpTransport::new(HttpTarget::Auth, "http://auth-service/authenticate")
//!     .with_timeout(Duration::from_secs(5));
//! ```

use super::{Reply, Transport, TransportError};
use crate::envelope::{CommandEnvelope, ResponseEnvelope};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for downstream HTTP calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which downstream system this adapter instance talks to.
///
/// The target decides which payload variant is serialized and which
/// status code counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpTarget {
    /// Credential check; 202 on success, 401 on bad credentials
    Auth,
    /// Log write; 201 on success
    Logger,
    /// Mail send; 202 on success
    Mailer,
}

impl HttpTarget {
    fn label(&self) -> &'static str {
        match self {
            HttpTarget::Auth => "auth",
            HttpTarget::Logger => "logger",
            HttpTarget::Mailer => "mailer",
        }
    }

    fn expected_status(&self) -> u16 {
        match self {
            HttpTarget::Auth => 202,
            HttpTarget::Logger => 201,
            HttpTarget::Mailer => 202,
        }
    }
}

/// Classify a response status against the target's contract.
fn classify_status(target: HttpTarget, status: u16) -> Result<(), TransportError> {
    if status == target.expected_status() {
        return Ok(());
    }

    if target == HttpTarget::Auth && status == 401 {
        return Err(TransportError::CredentialInvalid);
    }

    Err(TransportError::Rejected(format!(
        "{} target answered status {}",
        target.label(),
        status
    )))
}

/// Map a reqwest failure onto the adapter taxonomy.
fn classify_send_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout.as_millis() as u64)
    } else {
        TransportError::Unavailable(err.to_string())
    }
}

/// An adapter that performs one synchronous JSON-over-HTTP call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Downstream system behind this instance
    target: HttpTarget,

    /// Target URL
    url: String,

    /// HTTP client (reused for connection pooling)
    client: Client,

    /// Request timeout
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new adapter for the given target and URL
    pub fn new(target: HttpTarget, url: impl Into<String>) -> Self {
        Self {
            target,
            url: url.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Serialize the payload variant this target consumes.
    fn request_body(&self, command: &CommandEnvelope) -> Result<serde_json::Value, TransportError> {
        match self.target {
            HttpTarget::Auth => command
                .auth
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?
                .ok_or(TransportError::WrongPayload("auth")),
            HttpTarget::Logger => command
                .log
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?
                .ok_or(TransportError::WrongPayload("logger")),
            HttpTarget::Mailer => command
                .mail
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?
                .ok_or(TransportError::WrongPayload("mailer")),
        }
    }

    /// Shape the success reply for this target.
    async fn success_reply(
        &self,
        command: &CommandEnvelope,
        response: reqwest::Response,
    ) -> Result<Reply, TransportError> {
        match self.target {
            HttpTarget::Auth => {
                // The auth target wraps its answer in a response envelope;
                // an error flag on a 202 still counts as a rejection.
                let body: ResponseEnvelope = response
                    .json()
                    .await
                    .map_err(|e| TransportError::Rejected(format!("unreadable auth reply: {e}")))?;

                if body.error {
                    return Err(TransportError::Rejected(body.message));
                }

                let message = if body.message.is_empty() {
                    "authenticated".to_string()
                } else {
                    body.message
                };
                Ok(Reply {
                    message,
                    data: body.data,
                })
            }
            HttpTarget::Logger => Ok(Reply::message("logged")),
            HttpTarget::Mailer => {
                let to = command
                    .mail
                    .as_ref()
                    .map(|m| m.to.as_str())
                    .unwrap_or_default();
                Ok(Reply::message(format!("message sent to {to}")))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        self.target.label()
    }

    async fn invoke(&self, command: &CommandEnvelope) -> Result<Reply, TransportError> {
        let body = self.request_body(command)?;

        debug!(
            target = self.target.label(),
            url = %self.url,
            "Calling downstream over HTTP"
        );

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    target = self.target.label(),
                    url = %self.url,
                    error = %e,
                    "HTTP call failed"
                );
                classify_send_error(e, self.timeout)
            })?;

        let status = response.status().as_u16();
        classify_status(self.target, status)?;

        info!(
            target = self.target.label(),
            status = status,
            "Downstream call accepted"
        );

        self.success_reply(command, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{AuthPayload, LogPayload};

    #[test]
    fn test_builder() {
        let transport = HttpTransport::new(HttpTarget::Logger, "http://logger-service/log")
            .with_timeout(Duration::from_secs(3));

        assert_eq!(transport.url, "http://logger-service/log");
        assert_eq!(transport.timeout, Duration::from_secs(3));
        assert_eq!(transport.name(), "logger");
    }

    #[test]
    fn test_classify_status_auth() {
        assert!(classify_status(HttpTarget::Auth, 202).is_ok());
        assert!(matches!(
            classify_status(HttpTarget::Auth, 401),
            Err(TransportError::CredentialInvalid)
        ));
        assert!(matches!(
            classify_status(HttpTarget::Auth, 500),
            Err(TransportError::Rejected(_))
        ));
    }

    #[test]
    fn test_classify_status_logger_and_mailer() {
        assert!(classify_status(HttpTarget::Logger, 201).is_ok());
        assert!(matches!(
            classify_status(HttpTarget::Logger, 202),
            Err(TransportError::Rejected(_))
        ));

        assert!(classify_status(HttpTarget::Mailer, 202).is_ok());
        // 401 only means bad credentials on the auth target
        assert!(matches!(
            classify_status(HttpTarget::Mailer, 401),
            Err(TransportError::Rejected(_))
        ));
    }

    #[test]
    fn test_request_body_selects_target_payload() {
        let transport = HttpTransport::new(HttpTarget::Auth, "http://auth-service/authenticate");
        let envelope = CommandEnvelope::auth(AuthPayload {
            email: "a@b.com".to_string(),
            password: "verysecret".to_string(),
        });

        let body = transport.request_body(&envelope).unwrap();
        assert_eq!(body["email"], "a@b.com");
    }

    #[tokio::test]
    async fn test_wrong_payload_short_circuits() {
        // A log envelope handed to the auth adapter must fail before any
        // network activity.
        let transport = HttpTransport::new(HttpTarget::Auth, "http://auth-service/authenticate");
        let envelope = CommandEnvelope::log(LogPayload {
            name: "n".to_string(),
            data: "d".to_string(),
        });

        let err = transport.invoke(&envelope).await.unwrap_err();
        assert!(matches!(err, TransportError::WrongPayload("auth")));
    }
}
