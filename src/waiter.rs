//! Two-phase bounded wait for a broker connection.
//!
//! `ConnectionWaiter::wait_for_connection` first acquires the connection
//! registered under a client identifier, waiting for the registry to announce
//! it if it is not there yet, and then waits for that connection to report
//! `ConnectionState::Connected`. Each phase has its own bound. Every listener
//! the waiter registers is removed again on all exit paths, including when
//! the returned future is dropped.
use crate::connection::{BrokerConnection, ConnectionObserver, ConnectionState};
use crate::error::{Error, Result};
use crate::service::{MqttService, ServiceObserver};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Client identifier the embedded broker connection is registered under.
pub const EMBEDDED_CLIENT_ID: &str = "embedded-mqtt-broker";

/// default bound on waiting for the connection to be registered
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(1000);
/// default bound on waiting for the connection to report CONNECTED
pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_millis(500);

/// Bounds for the two wait phases.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    pub lookup_timeout: Duration,
    pub state_timeout: Duration,
}

impl WaitConfig {
    pub fn new(lookup_timeout: Duration, state_timeout: Duration) -> WaitConfig {
        WaitConfig {
            lookup_timeout,
            state_timeout,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        WaitConfig::new(DEFAULT_LOOKUP_TIMEOUT, DEFAULT_STATE_TIMEOUT)
    }
}

/// How a wait on a `Signal` ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Outcome {
    Signaled,
    TimedOut,
    Cancelled,
}

/// Single-permit signal. Released at most once, from any thread; a release
/// that happens before the wait starts is kept.
struct Signal {
    permit: Semaphore,
    released: AtomicBool,
}

impl Signal {
    fn new() -> Arc<Signal> {
        Arc::new(Signal {
            permit: Semaphore::new(0),
            released: AtomicBool::new(false),
        })
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.permit.add_permits(1);
        }
    }

    /// Cancellation takes priority over a permit that is already available.
    async fn wait(&self, bound: Duration, cancel: &CancellationToken) -> Outcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Outcome::Cancelled,
            res = timeout(bound, self.permit.acquire()) => match res {
                Ok(Ok(permit)) => {
                    permit.forget();
                    Outcome::Signaled
                }
                // the semaphore is never closed
                Ok(Err(_)) => Outcome::Cancelled,
                Err(_) => Outcome::TimedOut,
            },
        }
    }
}

/// Slot for the connection found in phase one. First writer wins.
type Slot = Arc<Mutex<Option<Arc<dyn BrokerConnection>>>>;

fn fill(slot: &Slot, broker: &Arc<dyn BrokerConnection>) -> bool {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return false;
    }
    *slot = Some(Arc::clone(broker));
    true
}

/// Registry listener that captures the connection added under `client_id`.
struct AddedObserver {
    client_id: String,
    slot: Slot,
    signal: Arc<Signal>,
}

impl ServiceObserver for AddedObserver {
    fn broker_added(&self, broker_id: &str, broker: &Arc<dyn BrokerConnection>) {
        if broker_id != self.client_id {
            trace!("Ignoring added broker '{}'.", broker_id);
            return;
        }
        if fill(&self.slot, broker) {
            self.signal.release();
        }
    }

    fn broker_removed(&self, _broker_id: &str, _broker: &Arc<dyn BrokerConnection>) {}
}

/// Connection listener that fires the signal on CONNECTED.
struct ConnectedObserver {
    signal: Arc<Signal>,
}

impl ConnectionObserver for ConnectedObserver {
    fn connection_state_changed(&self, state: ConnectionState, _error: Option<&Error>) {
        if state == ConnectionState::Connected {
            self.signal.release();
        }
    }
}

/// Registry listener registration, undone on drop.
struct ServiceSubscription<'a> {
    service: &'a dyn MqttService,
    observer: Arc<dyn ServiceObserver>,
}

impl<'a> ServiceSubscription<'a> {
    fn new(service: &'a dyn MqttService, observer: Arc<dyn ServiceObserver>) -> Self {
        service.add_brokers_listener(Arc::clone(&observer));
        ServiceSubscription { service, observer }
    }
}

impl Drop for ServiceSubscription<'_> {
    fn drop(&mut self) {
        self.service.remove_brokers_listener(&self.observer);
    }
}

/// Connection listener registration, undone on drop.
struct ConnectionSubscription {
    connection: Arc<dyn BrokerConnection>,
    observer: Arc<dyn ConnectionObserver>,
}

impl ConnectionSubscription {
    fn new(connection: Arc<dyn BrokerConnection>, observer: Arc<dyn ConnectionObserver>) -> Self {
        connection.add_connection_observer(Arc::clone(&observer));
        ConnectionSubscription {
            connection,
            observer,
        }
    }
}

impl Drop for ConnectionSubscription {
    fn drop(&mut self) {
        self.connection.remove_connection_observer(&self.observer);
    }
}

/// Waits for a broker connection to be registered and connected.
///
/// The waiter only holds configuration; every call keeps its own transient
/// state, so one waiter may serve concurrent calls.
#[derive(Debug, Clone, Default)]
pub struct ConnectionWaiter {
    config: WaitConfig,
    cancel: CancellationToken,
}

impl ConnectionWaiter {
    pub fn new(config: WaitConfig) -> ConnectionWaiter {
        ConnectionWaiter {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort waits with `Error::Interrupted` once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> ConnectionWaiter {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Acquire the connection registered under `client_id` in `service` and
    /// wait for it to report `Connected`.
    ///
    /// The returned connection was seen connected during the call; it may
    /// have changed state since.
    ///
    /// # Errors
    ///
    /// * ConnectionLookupTimeout - nothing registered under `client_id` in time
    /// * ConnectionStateTimeout - the connection never reported CONNECTED in time
    /// * Interrupted - the cancellation token fired during either phase
    /// * InvariantViolation - the registry signalled without a connection
    pub async fn wait_for_connection(
        &self,
        service: &dyn MqttService,
        client_id: &str,
    ) -> Result<Arc<dyn BrokerConnection>> {
        let res = self.acquire_and_wait(service, client_id).await;
        match &res {
            Ok(_) => trace!("wait_for_connection('{}'): done", client_id),
            Err(err) => trace!("wait_for_connection('{}'): failed: {}", client_id, err),
        }

        res
    }

    async fn acquire_and_wait(
        &self,
        service: &dyn MqttService,
        client_id: &str,
    ) -> Result<Arc<dyn BrokerConnection>> {
        let connection = match service.broker_connection(client_id) {
            Some(connection) => connection,
            None => {
                trace!("wait_for_connection('{}'): awaiting handle", client_id);
                self.await_handle(service, client_id).await?
            }
        };

        trace!("wait_for_connection('{}'): awaiting connected", client_id);
        self.await_connected(Arc::clone(&connection), client_id).await?;

        Ok(connection)
    }

    async fn await_handle(
        &self,
        service: &dyn MqttService,
        client_id: &str,
    ) -> Result<Arc<dyn BrokerConnection>> {
        let slot: Slot = Arc::new(Mutex::new(None));
        let signal = Signal::new();
        let _subscription = ServiceSubscription::new(
            service,
            Arc::new(AddedObserver {
                client_id: client_id.to_string(),
                slot: Arc::clone(&slot),
                signal: Arc::clone(&signal),
            }),
        );

        // it may have been added between the first lookup and the subscription
        if let Some(connection) = service.broker_connection(client_id) {
            if fill(&slot, &connection) {
                signal.release();
            }
        }

        let bound = self.config.lookup_timeout;
        match signal.wait(bound, &self.cancel).await {
            Outcome::Signaled => {}
            Outcome::TimedOut => {
                warn!(
                    "Connection '{}' was not registered within {:?}.",
                    client_id, bound
                );
                return Err(Error::ConnectionLookupTimeout {
                    client_id: client_id.to_string(),
                    timeout: bound,
                });
            }
            Outcome::Cancelled => {
                return Err(Error::Interrupted {
                    client_id: client_id.to_string(),
                })
            }
        }

        let connection = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        connection.ok_or_else(|| {
            Error::InvariantViolation(format!(
                "Connection '{}' signalled as added but no connection was captured",
                client_id
            ))
        })
    }

    async fn await_connected(
        &self,
        connection: Arc<dyn BrokerConnection>,
        client_id: &str,
    ) -> Result<()> {
        let signal = Signal::new();
        let _subscription = ConnectionSubscription::new(
            Arc::clone(&connection),
            Arc::new(ConnectedObserver {
                signal: Arc::clone(&signal),
            }),
        );

        // check after subscribing so a transition in between is not lost
        if connection.connection_state() == ConnectionState::Connected {
            trace!("Connection '{}' already connected.", client_id);
            signal.release();
        }

        let bound = self.config.state_timeout;
        match signal.wait(bound, &self.cancel).await {
            Outcome::Signaled => {
                debug!("Connection '{}' is connected.", client_id);
                Ok(())
            }
            Outcome::TimedOut => {
                let state = connection.connection_state();
                warn!(
                    "Connection {} failed. State: {} (waited {:?})",
                    connection.client_id(),
                    state,
                    bound
                );
                Err(Error::ConnectionStateTimeout {
                    client_id: client_id.to_string(),
                    timeout: bound,
                    state,
                })
            }
            Outcome::Cancelled => Err(Error::Interrupted {
                client_id: client_id.to_string(),
            }),
        }
    }
}

/// `ConnectionWaiter::wait_for_connection` with the default bounds.
pub async fn wait_for_connection(
    service: &dyn MqttService,
    client_id: &str,
) -> Result<Arc<dyn BrokerConnection>> {
    ConnectionWaiter::default()
        .wait_for_connection(service, client_id)
        .await
}
