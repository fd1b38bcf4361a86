use crate::{
    error::Result,
    mqtt::{
        self, Connack, Connect, ConnectReturnCode, FramedPackets, MqttCodec, Packet, PacketType,
    },
};
use log::{debug, trace, warn};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// How a `FakeBroker` answers CONNECT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    /// CONNACK with `Accepted`
    Accept,
    /// CONNACK with the given code, then close the stream
    Refuse(ConnectReturnCode),
    /// keep the tcp connection open but never answer
    Silent,
    /// CONNACK with `Accepted` after a delay
    AcceptAfter(Duration),
    /// CONNACK with `Accepted`, written as two separate tcp writes with a
    /// pause between them
    AcceptInPieces(Duration),
}

/// Scripted broker endpoint. Answers CONNECT according to its `Behavior`
/// and PINGREQ with PINGRESP; nothing else is routed anywhere.
pub struct FakeBroker {
    addr: SocketAddr,
    log: Log,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// What the fake broker has received, shared by every client task.
#[derive(Clone, Default)]
struct Log {
    connects: Arc<Mutex<Vec<Connect>>>,
    received: Arc<Mutex<Vec<PacketType>>>,
}

impl Log {
    fn record(&self, pkt: &Packet) {
        self.received.lock().unwrap().push(pkt.packet_type());
        if let Packet::Connect(connect) = pkt {
            self.connects.lock().unwrap().push(connect.clone());
        }
    }
}

impl FakeBroker {
    /// Listen on an ephemeral localhost port.
    pub async fn bind(behavior: Behavior) -> Result<FakeBroker> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?;
        let addr = listener.local_addr()?;
        let log = Log::default();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(accept_loop(
            listener,
            behavior,
            log.clone(),
            shutdown.clone(),
        ));

        Ok(FakeBroker {
            addr,
            log,
            shutdown,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// CONNECT packets received so far, oldest first
    pub fn connects(&self) -> Vec<Connect> {
        self.log.connects.lock().unwrap().clone()
    }

    /// Types of every packet received so far, across all clients, oldest
    /// first
    pub fn received(&self) -> Vec<PacketType> {
        self.log.received.lock().unwrap().clone()
    }

    /// Stop accepting and close every open client stream.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    behavior: Behavior,
    log: Log,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => return,
            res = listener.accept() => match res {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!("Fake broker accept failed: {:?}", err);
                    return;
                }
            },
        };
        debug!("Fake broker: new TCP connection from {}", addr);

        let log = log.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_client(stream, behavior, log, shutdown).await {
                warn!("Fake broker client {} failed: {}", addr, err);
            }
        });
    }
}

async fn serve_client(
    stream: TcpStream,
    behavior: Behavior,
    log: Log,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut framed: FramedPackets = Framed::new(stream, MqttCodec);

    loop {
        let pkt = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            pkt = mqtt::receive(&mut framed) => pkt?,
        };

        if let Some(pkt) = &pkt {
            log.record(pkt);
        }

        match pkt {
            Some(Packet::Connect(connect)) => {
                trace!("Fake broker: CONNECT from {}", connect.client_id);

                match behavior {
                    Behavior::Accept => {
                        send_connack(&mut framed, ConnectReturnCode::Accepted).await?
                    }
                    Behavior::Refuse(code) => {
                        send_connack(&mut framed, code).await?;
                        return Ok(());
                    }
                    Behavior::Silent => {}
                    Behavior::AcceptAfter(delay) => {
                        sleep(delay).await;
                        send_connack(&mut framed, ConnectReturnCode::Accepted).await?;
                    }
                    Behavior::AcceptInPieces(pause) => {
                        let connack = mqtt::encode(&Packet::Connack(Connack {
                            session_present: false,
                            code: ConnectReturnCode::Accepted,
                        }))?;
                        let (head, tail) = connack.split_at(2);

                        let stream = framed.get_mut();
                        stream.write_all(head).await?;
                        stream.flush().await?;
                        sleep(pause).await;
                        stream.write_all(tail).await?;
                        stream.flush().await?;
                    }
                }
            }
            Some(Packet::Pingreq) => mqtt::send(&Packet::Pingresp, &mut framed).await?,
            Some(Packet::Disconnect) | None => return Ok(()),
            Some(pkt) => trace!("Fake broker: ignoring {:?}", pkt),
        }
    }
}

async fn send_connack(framed: &mut FramedPackets, code: ConnectReturnCode) -> Result<()> {
    let connack = Packet::Connack(Connack {
        session_present: false,
        code,
    });
    mqtt::send(&connack, framed).await
}
