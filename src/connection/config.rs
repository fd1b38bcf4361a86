use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// default port of an unencrypted MQTT broker
pub const DEFAULT_PORT: u16 = 1883;
/// default keep alive interval (in seconds)
pub const DEFAULT_KEEP_ALIVE: u16 = 60;
/// default bound on tcp connect plus CONNACK
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Client connection configuration object. Inject this into
/// MqttBrokerConnection::new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address of the broker to connect to
    pub addr: SocketAddr,
    /// client identifier sent in CONNECT
    pub client_id: String,
    /// maximum number of seconds between control packets. 0 disables pings
    pub keep_alive: u16,
    /// ask the broker to discard any previous session
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    /// time allowed for tcp connect and for the CONNACK to arrive (each)
    pub connect_timeout: Duration,
}

impl Config {
    /// Create a new config object with default keep alive, a clean session,
    /// no credentials and the default connect timeout.
    pub fn new(ip: IpAddr, port: u16, client_id: impl Into<String>) -> Config {
        Config {
            addr: SocketAddr::new(ip, port),
            client_id: client_id.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_session: true,
            username: None,
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn keep_alive(mut self, keep_alive: u16) -> Config {
        self.keep_alive = keep_alive;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: Option<Vec<u8>>) -> Config {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Config {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for Config {
    /// localhost:1883 with an empty client identifier
    fn default() -> Self {
        Config::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT, "")
    }
}
