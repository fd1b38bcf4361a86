//! Broker connection capability. A `BrokerConnection` is a logical session
//! to an MQTT broker that reports its `ConnectionState` to observers.
pub use self::client::MqttBrokerConnection;
pub use self::config::Config;

use crate::error::Error;
use std::fmt;
use std::sync::Arc;

pub mod client;
pub mod config;

/// Connection status of a broker session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// The session is fully established and ready for use
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        };
        write!(f, "{}", name)
    }
}

/// Receives connection state changes. Called from whichever thread drives
/// the connection; implementations must not block.
pub trait ConnectionObserver: Send + Sync {
    /// `error` is set when the change was caused by a failure (refused
    /// handshake, lost stream, ...).
    fn connection_state_changed(&self, state: ConnectionState, error: Option<&Error>);
}

/// A live or pending broker connection.
pub trait BrokerConnection: Send + Sync {
    /// Identifier used for diagnostics and registry lookup
    fn client_id(&self) -> &str;

    fn connection_state(&self) -> ConnectionState;

    fn add_connection_observer(&self, observer: Arc<dyn ConnectionObserver>);

    /// Removing an observer that is not registered is a no-op.
    fn remove_connection_observer(&self, observer: &Arc<dyn ConnectionObserver>);
}

impl fmt::Debug for dyn BrokerConnection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.client_id(), self.connection_state())
    }
}
