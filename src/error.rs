use crate::connection::ConnectionState;
use mqttrs::ConnectReturnCode;
use std::time::Duration;
use thiserror::Error;
use tokio::io::Error as TokioError;

/// Errors raised while waiting for, establishing or driving a broker
/// connection.
#[derive(Debug, Error)]
pub enum Error {
    /// No connection registered under `client_id` appeared within the lookup
    /// bound.
    #[error("Wait for connection '{client_id}' failed: not registered within {timeout:?}")]
    ConnectionLookupTimeout { client_id: String, timeout: Duration },
    /// A connection was found but never reported CONNECTED within the state
    /// bound. `state` is the state observed when the bound expired.
    #[error("Connection {client_id} failed. State: {state} (waited {timeout:?})")]
    ConnectionStateTimeout {
        client_id: String,
        timeout: Duration,
        state: ConnectionState,
    },
    /// The wait was cancelled from outside before either bound expired.
    #[error("Wait for connection '{client_id}' was interrupted")]
    Interrupted { client_id: String },
    /// A collaborator broke its contract (e.g. signalled an addition without
    /// handing over a connection). Not a timeout.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// The broker answered CONNECT with a non-accepted return code
    #[error("Connection refused by broker: {0:?}")]
    ConnectionRefused(ConnectReturnCode),
    /// TCP connect or CONNACK did not complete in time
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    /// mqttrs::encode_slice has failed with error
    #[error("{0}")]
    EncodeFailed(String),
    /// Bytes received from the broker could not be decoded as an MQTT packet
    #[error("{0}")]
    InvalidPacket(String),
    /// Problem with logging happened
    #[error("{0}")]
    LoggerInitFailed(String),
    /// Could not send packet to broker over tcp connection
    #[error("{0}")]
    PacketSendFailed(String),
    /// Could not receive a packet from broker over tcp connection
    #[error("{0}")]
    PacketReceiveFailed(String),
    /// Wrapper for Tokio errors
    #[error("I/O error: {0}")]
    TokioErr(#[from] TokioError),
}

pub type Result<T> = std::result::Result<T, Error>;
