//! Registry capability. An `MqttService` tracks broker connections by
//! identifier and tells `ServiceObserver`s when connections come and go.
use crate::connection::BrokerConnection;
use crate::observers::Observers;
use log::{debug, trace};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives registry additions and removals. Called from whichever thread
/// modifies the registry; implementations must not block.
pub trait ServiceObserver: Send + Sync {
    fn broker_added(&self, broker_id: &str, broker: &Arc<dyn BrokerConnection>);

    fn broker_removed(&self, broker_id: &str, broker: &Arc<dyn BrokerConnection>);
}

/// Lookup and change notification for broker connections.
pub trait MqttService: Send + Sync {
    fn broker_connection(&self, broker_id: &str) -> Option<Arc<dyn BrokerConnection>>;

    fn add_brokers_listener(&self, observer: Arc<dyn ServiceObserver>);

    /// Removing a listener that is not registered is a no-op.
    fn remove_brokers_listener(&self, observer: &Arc<dyn ServiceObserver>);
}

/// In-memory `MqttService`.
#[derive(Default)]
pub struct BrokerRegistry {
    connections: Mutex<HashMap<String, Arc<dyn BrokerConnection>>>,
    observers: Observers<dyn ServiceObserver>,
}

impl BrokerRegistry {
    pub fn new() -> BrokerRegistry {
        BrokerRegistry::default()
    }

    /// Register `broker` under `broker_id` and notify listeners. Returns
    /// false, without notifying anyone, if the identifier is already taken.
    pub fn add_broker_connection(
        &self,
        broker_id: impl Into<String>,
        broker: Arc<dyn BrokerConnection>,
    ) -> bool {
        let broker_id = broker_id.into();

        match self.lock().entry(broker_id.clone()) {
            Entry::Occupied(_) => {
                debug!("Broker connection '{}' already registered.", broker_id);
                return false;
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&broker));
            }
        }

        debug!("Broker connection '{}' added.", broker_id);
        for observer in self.observers.snapshot() {
            observer.broker_added(&broker_id, &broker);
        }
        true
    }

    /// Unregister the connection under `broker_id` and notify listeners.
    pub fn remove_broker_connection(&self, broker_id: &str) -> Option<Arc<dyn BrokerConnection>> {
        let broker = self.lock().remove(broker_id)?;

        debug!("Broker connection '{}' removed.", broker_id);
        for observer in self.observers.snapshot() {
            observer.broker_removed(broker_id, &broker);
        }
        Some(broker)
    }

    pub fn broker_connections(&self) -> Vec<(String, Arc<dyn BrokerConnection>)> {
        self.lock()
            .iter()
            .map(|(id, broker)| (id.clone(), Arc::clone(broker)))
            .collect()
    }

    pub fn has_brokers_listeners(&self) -> bool {
        !self.observers.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.observers.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn BrokerConnection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl MqttService for BrokerRegistry {
    fn broker_connection(&self, broker_id: &str) -> Option<Arc<dyn BrokerConnection>> {
        self.lock().get(broker_id).cloned()
    }

    fn add_brokers_listener(&self, observer: Arc<dyn ServiceObserver>) {
        trace!("Adding brokers listener.");
        self.observers.add(observer);
    }

    fn remove_brokers_listener(&self, observer: &Arc<dyn ServiceObserver>) {
        if self.observers.remove(observer) {
            trace!("Removed brokers listener.");
        }
    }
}
