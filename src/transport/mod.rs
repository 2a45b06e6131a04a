//! Transport adapters.
//!
//! A [`Transport`] wraps one downstream invocation style behind a uniform
//! `invoke(command) -> Result<Reply, TransportError>` contract. Four
//! adapters exist:
//!
//! - [`HttpTransport`]: synchronous JSON-over-HTTP call
//! - [`RpcTransport`]: one-shot named-method call over TCP
//! - [`GrpcTransport`]: typed call with a fixed deadline
//! - [`QueueTransport`]: fire-and-forget publish to the topic exchange
//!
//! Adapters never retry; retry policy, where one exists at all, belongs
//! to the caller.
//!
//! ## Implementing an adapter
//!
//! ```rust,ignore
//! use relay::{Transport, Reply, TransportError, CommandEnvelope};
//! use async_trait::async_trait;
//!
//! struct MyTransport;
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     fn name(&self) -> &str {
//!         "my-transport"
//!     }
//!
//!     async fn invoke(&self, command: &CommandEnvelope) -> Result<Reply, TransportError> {
//!         Ok(Reply::message("did the thing"))
//!     }
//! }
//! ```

pub mod grpc;
pub mod http;
pub mod logs;
pub mod queue;
pub mod rpc;

use crate::envelope::CommandEnvelope;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// Re-export the built-in adapters
pub use grpc::GrpcTransport;
pub use http::{HttpTarget, HttpTransport};
pub use queue::QueueTransport;
pub use rpc::RpcTransport;

/// The closed error taxonomy shared by every adapter.
///
/// Each variant maps to exactly one outward status class; see
/// [`crate::normalize`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The downstream system could not be reached at all
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// A reachable peer answered with something other than its success
    /// contract
    #[error("upstream rejected the call: {0}")]
    Rejected(String),

    /// The auth target refused the credentials
    #[error("invalid credentials")]
    CredentialInvalid,

    /// The call outlived its deadline
    #[error("upstream call timed out after {0}ms")]
    Timeout(u64),

    /// Payload could not be encoded or the reply could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The envelope reached an adapter without the payload it serves
    #[error("payload missing for {0} transport")]
    WrongPayload(&'static str),
}

/// What a successful adapter invocation produced.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Human-readable outcome, copied into the response envelope
    pub message: String,

    /// Payload returned by the downstream system, if any
    pub data: Option<Value>,
}

impl Reply {
    /// A reply carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    /// A reply carrying a downstream payload
    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// The uniform adapter contract.
///
/// Implementations must be `Send + Sync`; the dispatcher shares them
/// across request tasks behind `Arc`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs and error context (e.g. "http", "rpc")
    fn name(&self) -> &str;

    /// Perform one downstream call for the given command.
    async fn invoke(&self, command: &CommandEnvelope) -> Result<Reply, TransportError>;
}
