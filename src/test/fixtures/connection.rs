use crate::connection::{BrokerConnection, ConnectionObserver, ConnectionState};
use crate::error::Error;
use crate::observers::Observers;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Broker connection whose state is driven by the test.
pub struct ManualConnection {
    client_id: String,
    state: Mutex<ConnectionState>,
    observers: Observers<dyn ConnectionObserver>,
    registrations: AtomicUsize,
}

impl ManualConnection {
    pub fn new(client_id: impl Into<String>, state: ConnectionState) -> Arc<ManualConnection> {
        Arc::new(ManualConnection {
            client_id: client_id.into(),
            state: Mutex::new(state),
            observers: Observers::new(),
            registrations: AtomicUsize::new(0),
        })
    }

    /// Change the state and notify observers, like a real connection would.
    pub fn set_state(&self, state: ConnectionState) {
        self.notify(state, None);
    }

    /// Change the state and notify observers with an error attached.
    pub fn fail(&self, state: ConnectionState, error: &Error) {
        self.notify(state, Some(error));
    }

    /// Change the state without telling anyone.
    pub fn set_state_silently(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Observers currently registered
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Observers ever registered
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    fn notify(&self, state: ConnectionState, error: Option<&Error>) {
        *self.state.lock().unwrap() = state;
        for observer in self.observers.snapshot() {
            observer.connection_state_changed(state, error);
        }
    }
}

impl BrokerConnection for ManualConnection {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn add_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.observers.add(observer);
    }

    fn remove_connection_observer(&self, observer: &Arc<dyn ConnectionObserver>) {
        self.observers.remove(observer);
    }
}
