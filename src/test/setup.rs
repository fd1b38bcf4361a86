use crate::{
    connection::{Config, MqttBrokerConnection},
    error::Result,
    service::BrokerRegistry,
    test::fixtures::{Behavior, FakeBroker},
};
use std::sync::Arc;
use std::time::Duration;

/// Instantiate a fake broker endpoint inside a test.
///
/// # Arguments
///
/// * `behavior` - how the endpoint answers CONNECT
pub async fn broker(behavior: Behavior) -> Result<FakeBroker> {
    FakeBroker::bind(behavior).await
}

/// Connection config pointed at `broker` with pings disabled and a short
/// connect timeout.
///
/// # Arguments
///
/// * `broker` - endpoint to connect to
/// * `client_id` - identifier sent in CONNECT
pub fn connection_config(broker: &FakeBroker, client_id: &str) -> Config {
    let addr = broker.addr();

    Config::new(addr.ip(), addr.port(), client_id)
        .keep_alive(0)
        .connect_timeout(Duration::from_millis(500))
}

/// Start a client connection to `broker` and register it in a fresh
/// registry under `client_id`.
pub fn registered_connection(
    broker: &FakeBroker,
    client_id: &str,
) -> (Arc<BrokerRegistry>, Arc<MqttBrokerConnection>) {
    let registry = Arc::new(BrokerRegistry::new());
    let connection = MqttBrokerConnection::new(connection_config(broker, client_id));

    connection.start();
    registry.add_broker_connection(client_id, connection.clone());

    (registry, connection)
}
