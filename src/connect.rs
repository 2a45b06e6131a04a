//! Startup connection management.
//!
//! [`retry_connect`] dials a target with a squared backoff between
//! attempts: the delay after the k-th failure is (k-1)² seconds, so a
//! flapping target is retried at 0s, 1s, 4s, 9s, … until the attempt cap
//! is exceeded, at which point the failure is terminal and must abort
//! process startup. The loop runs once, at startup, never mid-request.
//!
//! [`BrokerConnection`] owns the one broker client per process and hands
//! out derived handles to the producer, the listener and the queue
//! adapter; no other component constructs one. Connection liveness after
//! startup is tracked as a [`ConnectionState`] machine fed by client
//! events: a detected disconnect re-enters `Connecting` while the client
//! redials, and comes back to `Connected` on success.

use async_nats::{jetstream, Client, ConnectOptions, Event};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Where the broker connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted
    Disconnected,
    /// An attempt (initial or redial) is in flight
    Connecting,
    /// Live
    Connected,
    /// The startup attempt cap was exceeded; terminal
    Exhausted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// Fatal connection failure.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection to {target} exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        target: String,
        attempts: u32,
        last_error: String,
    },
}

/// How many failures are tolerated before giving up.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Backoff before the next attempt, given how many have failed so far.
pub fn backoff_delay(failures: u32) -> Duration {
    Duration::from_secs(u64::from(failures).pow(2))
}

/// Dial `target` until it answers or the policy's attempt cap is
/// exceeded.
///
/// Generic over the dial future so the same loop serves any target kind.
pub async fn retry_connect<T, E, F, Fut>(
    target: &str,
    policy: RetryPolicy,
    mut dial: F,
) -> Result<T, ConnectError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut failures: u32 = 0;

    loop {
        match dial().await {
            Ok(connection) => {
                info!(target = target, "Connected");
                return Ok(connection);
            }
            Err(e) => {
                failures += 1;
                if failures > policy.max_attempts {
                    error!(
                        target = target,
                        attempts = failures,
                        "Connection attempts exhausted"
                    );
                    return Err(ConnectError::Exhausted {
                        target: target.to_string(),
                        attempts: failures,
                        last_error: e.to_string(),
                    });
                }

                let delay = backoff_delay(failures - 1);
                warn!(
                    target = target,
                    attempt = failures,
                    backoff_secs = delay.as_secs(),
                    error = %e,
                    "Connection failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Map a client event onto the state machine.
///
/// Events that say nothing about liveness (slow consumers, server
/// notices) leave the state untouched.
fn state_for_event(event: &Event) -> Option<ConnectionState> {
    match event {
        Event::Connected => Some(ConnectionState::Connected),
        Event::Disconnected => Some(ConnectionState::Connecting),
        _ => None,
    }
}

/// The exclusively owned broker connection.
pub struct BrokerConnection {
    client: Client,
    jetstream: jetstream::Context,
    state: watch::Receiver<ConnectionState>,
}

impl BrokerConnection {
    /// Establish the connection at startup, retrying under `policy`.
    ///
    /// An `Err` here means the attempt cap was exceeded; the owning
    /// process must not start serving.
    pub async fn establish(url: &str, policy: RetryPolicy) -> Result<Self, ConnectError> {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        let tx = Arc::new(tx);
        tx.send_replace(ConnectionState::Connecting);

        let url_owned = url.to_string();
        let events_tx = tx.clone();

        let dialed = retry_connect("broker", policy, move || {
            let url = url_owned.clone();
            let events_tx = events_tx.clone();
            async move {
                ConnectOptions::new()
                    .event_callback(move |event| {
                        let tx = events_tx.clone();
                        async move {
                            if let Some(state) = state_for_event(&event) {
                                info!(state = %state, "Broker connection state changed");
                                tx.send_replace(state);
                            }
                        }
                    })
                    .connect(url)
                    .await
            }
        })
        .await;

        let client = match dialed {
            Ok(client) => client,
            Err(e) => {
                tx.send_replace(ConnectionState::Exhausted);
                return Err(e);
            }
        };

        tx.send_replace(ConnectionState::Connected);

        Ok(Self {
            jetstream: jetstream::new(client.clone()),
            client,
            state: rx,
        })
    }

    /// A derived client handle for publishing.
    pub fn handle(&self) -> Client {
        self.client.clone()
    }

    /// A derived JetStream context for exchange and queue operations.
    pub fn jetstream(&self) -> jetstream::Context {
        self.jetstream.clone()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}
