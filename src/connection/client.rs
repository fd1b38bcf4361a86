use super::{BrokerConnection, Config, ConnectionObserver, ConnectionState};
use crate::error::{Error, Result};
use crate::mqtt::{self, Connack, Connect, ConnectReturnCode, FramedPackets, MqttCodec, Packet};
use crate::observers::Observers;
use log::{debug, error, info, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// What woke the connection task up while connected.
enum Event {
    Shutdown,
    Ping,
    Packet(Option<Packet>),
}

/// MQTT 3.1.1 client connection to a broker over TCP.
///
/// The connection is driven by a background task spawned with `start()`.
/// The task performs the CONNECT/CONNACK handshake, keeps the session alive
/// with PINGREQ and reports every state change to the registered
/// `ConnectionObserver`s. A stopped connection cannot be restarted.
pub struct MqttBrokerConnection {
    config: Config,
    state: Mutex<ConnectionState>,
    observers: Observers<dyn ConnectionObserver>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBrokerConnection {
    pub fn new(config: Config) -> Arc<MqttBrokerConnection> {
        Arc::new(MqttBrokerConnection {
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            observers: Observers::new(),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawn the connection task. Calling this on a running or stopped
    /// connection does nothing.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut task = lock(&self.task);

        if task.is_some() {
            debug!("Connection {} already started.", self.config.client_id);
            return;
        }
        if self.shutdown.is_cancelled() {
            warn!(
                "Connection {} has been stopped and cannot be restarted.",
                self.config.client_id
            );
            return;
        }

        let connection = Arc::clone(self);
        *task = Some(tokio::spawn(async move { connection.run().await }));
    }

    /// Send DISCONNECT if connected, end the connection task and wait for it
    /// to exit. The state is `Disconnected` afterwards.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!(
                    "Connection task for {} ended abnormally: {:?}",
                    self.config.client_id, err
                );
            }
        }

        self.set_state(ConnectionState::Disconnected, None);
    }

    async fn run(self: Arc<Self>) {
        self.set_state(ConnectionState::Connecting, None);

        let mut framed = tokio::select! {
            // stop() takes care of the final state
            _ = self.shutdown.cancelled() => return,
            res = self.connect() => match res {
                Ok(framed) => framed,
                Err(err) => {
                    error!("Connection {} failed: {}", self.config.client_id, err);
                    self.set_state(ConnectionState::Disconnected, Some(&err));
                    return;
                }
            },
        };

        info!(
            "Connection {} established with broker {}.",
            self.config.client_id, self.config.addr
        );
        self.set_state(ConnectionState::Connected, None);

        match self.serve(&mut framed).await {
            Ok(()) => self.set_state(ConnectionState::Disconnected, None),
            Err(err) => {
                error!("Connection {} lost: {}", self.config.client_id, err);
                self.set_state(ConnectionState::Disconnected, Some(&err));
            }
        }
    }

    /// Open the tcp stream and perform the CONNECT/CONNACK handshake. Each of
    /// the two steps is bounded by `Config::connect_timeout`.
    ///
    /// # Errors
    ///
    /// * ConnectTimeout
    /// * ConnectionRefused
    /// * InvalidPacket
    /// * PacketSendFailed
    /// * PacketReceiveFailed
    /// * TokioErr
    async fn connect(&self) -> Result<FramedPackets> {
        let bound = self.config.connect_timeout;

        trace!("Opening tcp connection to {}...", self.config.addr);
        let stream = timeout(bound, TcpStream::connect(self.config.addr))
            .await
            .map_err(|_| Error::ConnectTimeout(bound))??;
        let mut framed = Framed::new(stream, MqttCodec);

        let mut connect = Connect::new(
            &self.config.client_id,
            self.config.keep_alive,
            self.config.clean_session,
        );
        connect.username = self.config.username.clone();
        connect.password = self.config.password.clone();
        mqtt::send(&Packet::Connect(connect), &mut framed).await?;
        trace!("CONNECT sent for {}.", self.config.client_id);

        match timeout(bound, mqtt::receive(&mut framed))
            .await
            .map_err(|_| Error::ConnectTimeout(bound))??
        {
            Some(Packet::Connack(Connack {
                code: ConnectReturnCode::Accepted,
                ..
            })) => Ok(framed),
            Some(Packet::Connack(connack)) => Err(Error::ConnectionRefused(connack.code)),
            Some(pkt) => Err(Error::InvalidPacket(format!(
                "Wrong packet received. Expected Packet::Connack, got {:?}",
                pkt
            ))),
            None => Err(Error::PacketReceiveFailed(
                "Broker closed connection before CONNACK.".into(),
            )),
        }
    }

    /// Keep the established session alive until shutdown or until the broker
    /// closes the stream.
    async fn serve(&self, framed: &mut FramedPackets) -> Result<()> {
        let keep_alive = self.config.keep_alive;
        let mut ping = interval(Duration::from_secs(u64::from(keep_alive.max(1))));
        ping.reset();

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => Event::Shutdown,
                _ = ping.tick(), if keep_alive > 0 => Event::Ping,
                pkt = mqtt::receive(framed) => Event::Packet(pkt?),
            };

            match event {
                Event::Shutdown => {
                    debug!("Disconnecting {} from broker.", self.config.client_id);
                    return mqtt::send(&Packet::Disconnect, framed).await;
                }
                Event::Ping => {
                    trace!("Sending Pingreq for {}.", self.config.client_id);
                    mqtt::send(&Packet::Pingreq, framed).await?;
                }
                Event::Packet(Some(Packet::Pingresp)) => {
                    trace!("Pingresp received for {}.", self.config.client_id);
                }
                Event::Packet(Some(pkt)) => {
                    trace!("Ignoring packet from broker: {:?}", pkt);
                }
                Event::Packet(None) => {
                    info!("Broker closed connection {}.", self.config.client_id);
                    return Ok(());
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState, error: Option<&Error>) {
        {
            let mut current = lock(&self.state);
            if *current == state && error.is_none() {
                return;
            }
            *current = state;
        }

        debug!("Connection {} is now {}.", self.config.client_id, state);
        for observer in self.observers.snapshot() {
            observer.connection_state_changed(state, error);
        }
    }
}

impl BrokerConnection for MqttBrokerConnection {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn add_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.add(observer);
    }

    fn remove_connection_observer(&self, observer: &Arc<dyn ConnectionObserver>) {
        self.observers.remove(observer);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
