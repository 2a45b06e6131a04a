//! Classic RPC adapter.
//!
//! Performs one synchronous named-method call over a fresh TCP
//! connection: a single line-delimited JSON request goes out, a single
//! response line comes back, the connection is dropped. The remote
//! exposes exactly one method, which writes a log entry and answers with
//! a status string.

use super::{Reply, Transport, TransportError};
use crate::envelope::{CommandEnvelope, LogPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// The one method the remote surface exposes
const RPC_METHOD: &str = "LogEntry.Insert";

/// Default bound on the whole dial-call-read exchange
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One outbound call.
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'static str,
    params: &'a LogPayload,
    id: u64,
}

/// The response line.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<String>,
    #[allow(dead_code)]
    id: u64,
}

/// An adapter that opens a connection, performs one named-method call
/// and returns on response.
#[derive(Debug)]
pub struct RpcTransport {
    /// host:port of the remote endpoint
    addr: String,

    /// Bound on the whole exchange
    timeout: Duration,

    /// Monotonic call ids
    call_id: AtomicU64,
}

impl RpcTransport {
    /// Create a new adapter for the given `host:port`
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
            call_id: AtomicU64::new(1),
        }
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call(&self, payload: &LogPayload) -> Result<Reply, TransportError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| TransportError::Unavailable(format!("dial {}: {}", self.addr, e)))?;

        let (read_half, mut write_half) = stream.into_split();

        let request = RpcRequest {
            method: RPC_METHOD,
            params: payload,
            id: self.call_id.fetch_add(1, Ordering::Relaxed),
        };
        let mut wire = serde_json::to_vec(&request)?;
        wire.push(b'\n');

        write_half
            .write_all(&wire)
            .await
            .map_err(|e| TransportError::Unavailable(format!("write {}: {}", self.addr, e)))?;

        let mut line = String::new();
        let mut reader = BufReader::new(read_half);
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| TransportError::Unavailable(format!("read {}: {}", self.addr, e)))?;
        if read == 0 {
            return Err(TransportError::Unavailable(format!(
                "{} closed the connection before answering",
                self.addr
            )));
        }

        let response: RpcResponse = serde_json::from_str(line.trim_end())?;

        if let Some(error) = response.error {
            return Err(TransportError::Rejected(error));
        }

        match response.result {
            Some(result) => Ok(Reply::message(result)),
            None => Err(TransportError::Rejected(
                "reply carried neither result nor error".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Transport for RpcTransport {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn invoke(&self, command: &CommandEnvelope) -> Result<Reply, TransportError> {
        let payload = command
            .log
            .as_ref()
            .ok_or(TransportError::WrongPayload("rpc"))?;

        debug!(addr = %self.addr, method = RPC_METHOD, "Performing RPC call");

        let reply = tokio::time::timeout(self.timeout, self.call(payload))
            .await
            .map_err(|_| {
                warn!(addr = %self.addr, "RPC call timed out");
                TransportError::Timeout(self.timeout.as_millis() as u64)
            })??;

        info!(addr = %self.addr, message = %reply.message, "RPC call answered");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    fn log_command() -> CommandEnvelope {
        CommandEnvelope::log(LogPayload {
            name: "event".to_string(),
            data: "something happened".to_string(),
        })
    }

    #[test]
    fn test_request_wire_shape() {
        let payload = LogPayload {
            name: "event".to_string(),
            data: "x".to_string(),
        };
        let request = RpcRequest {
            method: RPC_METHOD,
            params: &payload,
            id: 3,
        };

        let wire: Value = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["method"], "LogEntry.Insert");
        assert_eq!(wire["params"]["name"], "event");
        assert_eq!(wire["id"], 3);
    }

    #[test]
    fn test_response_wire_shape() {
        let ok: RpcResponse = serde_json::from_str(r#"{"result": "logged", "id": 1}"#).unwrap();
        assert_eq!(ok.result.as_deref(), Some("logged"));
        assert!(ok.error.is_none());

        let failed: RpcResponse =
            serde_json::from_str(r#"{"error": "store offline", "id": 2}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("store offline"));
    }

    #[tokio::test]
    async fn test_call_against_loopback_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // One-shot peer: read the request line, answer with a status string.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();

            let mut line = String::new();
            BufReader::new(read_half).read_line(&mut line).await.unwrap();

            let request: Value = serde_json::from_str(line.trim_end()).unwrap();
            assert_eq!(request["method"], "LogEntry.Insert");

            let response = json!({"result": "successfully logged", "id": request["id"]});
            let mut wire = serde_json::to_vec(&response).unwrap();
            wire.push(b'\n');
            write_half.write_all(&wire).await.unwrap();
        });

        let transport = RpcTransport::new(addr.to_string());
        let reply = transport.invoke(&log_command()).await.unwrap();
        assert_eq!(reply.message, "successfully logged");
    }

    #[tokio::test]
    async fn test_peer_error_maps_to_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();

            let mut line = String::new();
            BufReader::new(read_half).read_line(&mut line).await.unwrap();

            write_half
                .write_all(b"{\"error\": \"store offline\", \"id\": 1}\n")
                .await
                .unwrap();
        });

        let transport = RpcTransport::new(addr.to_string());
        let err = transport.invoke(&log_command()).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(msg) if msg == "store offline"));
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_unavailable() {
        // Bind to grab a free port, then drop the listener so the dial is
        // refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = RpcTransport::new(addr.to_string());
        let err = transport.invoke(&log_command()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_wrong_payload_short_circuits() {
        let transport = RpcTransport::new("127.0.0.1:1");
        let envelope: CommandEnvelope =
            serde_json::from_value(json!({"action": "auth", "auth": {"email": "a@b.com", "password": "x"}}))
                .unwrap();

        let err = transport.invoke(&envelope).await.unwrap_err();
        assert!(matches!(err, TransportError::WrongPayload("rpc")));
    }
}
