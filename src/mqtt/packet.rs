pub use mqttrs::{Connack, ConnectReturnCode, PacketType, Protocol};

use crate::error::{Error, Result};

/// enum representing the MQTT control packets a client connection exchanges
/// with a broker during handshake and keep-alive. Based on mqttrs crate.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Connect),
    Connack(Connack),
    Pingreq,
    Pingresp,
    Disconnect,
    /// Any other control packet. Only the type is kept.
    Unexpected(PacketType),
}

/// struct representing data from Connect MQTT control packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Connect {
    pub protocol: Protocol,
    pub keep_alive: u16,
    pub client_id: String,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl Connect {
    /// MQTT 3.1.1 connect packet without credentials
    pub fn new(client_id: impl Into<String>, keep_alive: u16, clean_session: bool) -> Connect {
        Connect {
            protocol: Protocol::MQTT311,
            keep_alive,
            client_id: client_id.into(),
            clean_session,
            username: None,
            password: None,
        }
    }
}

impl Packet {
    /// Borrow this packet as an mqttrs::Packet. We can't do this through the
    /// `Into<T>` trait because the mqttrs packet borrows from ours.
    ///
    /// # Errors
    ///
    /// * EncodeFailed - for `Packet::Unexpected`, which carries no payload
    pub fn to_mqttrs(&self) -> Result<mqttrs::Packet<'_>> {
        Ok(match self {
            Packet::Connect(connect) => mqttrs::Packet::Connect(mqttrs::Connect {
                protocol: connect.protocol,
                keep_alive: connect.keep_alive,
                client_id: &connect.client_id,
                clean_session: connect.clean_session,
                last_will: None,
                username: connect.username.as_deref(),
                password: connect.password.as_deref(),
            }),
            Packet::Connack(connack) => mqttrs::Packet::Connack(*connack),
            Packet::Pingreq => mqttrs::Packet::Pingreq,
            Packet::Pingresp => mqttrs::Packet::Pingresp,
            Packet::Disconnect => mqttrs::Packet::Disconnect,
            Packet::Unexpected(packet_type) => {
                return Err(Error::EncodeFailed(format!(
                    "Cannot encode opaque {:?} packet",
                    packet_type
                )))
            }
        })
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack(_) => PacketType::Connack,
            Packet::Pingreq => PacketType::Pingreq,
            Packet::Pingresp => PacketType::Pingresp,
            Packet::Disconnect => PacketType::Disconnect,
            Packet::Unexpected(packet_type) => *packet_type,
        }
    }

    /// Upper bound on the encoded size of this packet, used to size the
    /// encode buffer.
    pub fn encoded_len_hint(&self) -> usize {
        match self {
            Packet::Connect(connect) => {
                32 + connect.client_id.len()
                    + connect.username.as_ref().map_or(0, |u| u.len() + 2)
                    + connect.password.as_ref().map_or(0, |p| p.len() + 2)
            }
            Packet::Connack(_) => 4,
            Packet::Pingreq | Packet::Pingresp | Packet::Disconnect => 2,
            Packet::Unexpected(_) => 0,
        }
    }
}

impl From<mqttrs::Packet<'_>> for Packet {
    fn from(pkt: mqttrs::Packet<'_>) -> Self {
        match pkt {
            mqttrs::Packet::Connect(mqttrs::Connect {
                protocol,
                keep_alive,
                client_id,
                clean_session,
                username,
                password,
                ..
            }) => Packet::Connect(Connect {
                protocol,
                keep_alive,
                client_id: client_id.to_string(),
                clean_session,
                username: username.map(|u| u.to_string()),
                password: password.map(|p| p.to_vec()),
            }),
            mqttrs::Packet::Connack(connack) => Packet::Connack(connack),
            mqttrs::Packet::Pingreq => Packet::Pingreq,
            mqttrs::Packet::Pingresp => Packet::Pingresp,
            mqttrs::Packet::Disconnect => Packet::Disconnect,
            other => Packet::Unexpected(other.get_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_keeps_credentials_when_borrowed() {
        let mut connect = Connect::new("probe", 30, true);
        connect.username = Some("user".into());
        connect.password = Some(b"secret".to_vec());
        let pkt = Packet::Connect(connect);

        match pkt.to_mqttrs().expect("connect converts") {
            mqttrs::Packet::Connect(c) => {
                assert_eq!(c.client_id, "probe");
                assert_eq!(c.keep_alive, 30);
                assert_eq!(c.username, Some("user"));
                assert_eq!(c.password, Some(&b"secret"[..]));
            }
            other => panic!("Expected Connect, got {:?}", other),
        }
    }

    #[test]
    fn packet_type_of_opaque_packet_is_kept() {
        assert_eq!(Packet::Pingreq.packet_type(), PacketType::Pingreq);
        assert_eq!(
            Packet::Unexpected(PacketType::Publish).packet_type(),
            PacketType::Publish
        );
    }

    #[test]
    fn unexpected_packets_cannot_be_encoded() {
        let pkt = Packet::Unexpected(PacketType::Publish);
        assert!(matches!(pkt.to_mqttrs(), Err(Error::EncodeFailed(_))));
    }
}
