//! # Relay
//!
//! A small integration hub with two independent halves:
//!
//! ```text
//! Client -> HTTP API -> Dispatcher -> Transport adapter -> Backend
//!                                     (HTTP | RPC | gRPC | queue)
//!
//! Producer -> Topic exchange -> Listener -> Event handler
//! ```
//!
//! The **dispatcher** half accepts a command envelope over HTTP, selects
//! one transport adapter by action tag, performs the downstream call and
//! normalizes whatever came back into a uniform response envelope.
//!
//! The **bus** half publishes events to a named topic exchange under
//! dot-delimited routing keys; a separate listener process binds routing
//! key patterns and hands each delivered event to a local handler,
//! fire-and-forget.
//!
//! ## Modules
//!
//! - [`envelope`]: command/response envelope types and validation
//! - [`dispatch`]: action routing over the transport adapters
//! - [`transport`]: the adapter trait and the four backends
//! - [`bus`]: topic exchange producer and listener
//! - [`connect`]: startup connection retry and connection state
//! - [`normalize`]: adapter outcomes to HTTP responses
//! - [`config`]: TOML configuration with environment substitution

pub mod bus;
pub mod config;
pub mod connect;
pub mod dispatch;
pub mod envelope;
pub mod normalize;
pub mod shutdown;
pub mod transport;

// Re-export commonly used types at crate root
pub use dispatch::Dispatcher;
pub use envelope::{Action, CommandEnvelope, ResponseEnvelope};
pub use transport::{Reply, Transport, TransportError};

/// Name of the topic exchange (JetStream stream) carrying bus events
pub const EVENT_EXCHANGE: &str = "RELAY_EVENTS";

/// Subject space captured by the exchange
pub const EXCHANGE_SUBJECTS: &[&str] = &["log.>"];

/// Routing key used for log events published through the queue adapter
pub const LOG_ROUTING_KEY: &str = "log.INFO";
