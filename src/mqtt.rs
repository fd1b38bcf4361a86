pub use packet::{Connack, Connect, ConnectReturnCode, Packet, PacketType, Protocol};

use crate::error::{Error, Result};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use mqttrs::{decode_slice, encode_slice};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed};

pub mod packet;

pub type FramedPackets = Framed<TcpStream, MqttCodec>;

/// Most bytes the remaining length field of a fixed header may take
const MAX_REMAINING_LENGTH_BYTES: usize = 4;

/// Splits a tcp byte stream into MQTT control packets. A packet may arrive
/// over several reads and one read may carry several packets, so frames are
/// cut by the length in each fixed header rather than by read boundaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct MqttCodec;

impl Decoder for MqttCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        let len = match frame_len(src)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(len);
        match decode(&frame)? {
            Some(pkt) => Ok(Some(pkt)),
            None => Err(Error::InvalidPacket(format!(
                "Incomplete packet in {} byte frame",
                len
            ))),
        }
    }
}

impl<'a> Encoder<&'a Packet> for MqttCodec {
    type Error = Error;

    fn encode(&mut self, pkt: &'a Packet, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&encode(pkt)?);
        Ok(())
    }
}

/// Total length of the packet at the start of `buf`, fixed header included.
/// Returns `None` while the fixed header itself is still incomplete.
///
/// # Errors
///
/// * InvalidPacket - the remaining length field runs past four bytes
fn frame_len(buf: &[u8]) -> Result<Option<usize>> {
    let mut remaining = 0usize;

    for (i, byte) in buf
        .iter()
        .skip(1)
        .take(MAX_REMAINING_LENGTH_BYTES)
        .enumerate()
    {
        remaining |= usize::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some(1 + (i + 1) + remaining));
        }
    }

    if buf.len() > MAX_REMAINING_LENGTH_BYTES {
        return Err(Error::InvalidPacket(
            "Malformed remaining length in fixed header".into(),
        ));
    }
    Ok(None)
}

/// Given a byte array holding exactly one MQTT packet, decode it. Returns
/// `None` if the bytes hold only part of a packet.
///
/// # Arguments
///
/// * `buf` - reference to byte array possibly containing MQTT packet
///
/// # Errors
///
/// This function may return the following errors:
///
/// * InvalidPacket
pub fn decode(buf: &[u8]) -> Result<Option<Packet>> {
    match decode_slice(buf) {
        Ok(res) => Ok(res.map(Packet::from)),
        Err(err) => Err(Error::InvalidPacket(format!(
            "Unable to decode packet: {:?}",
            err
        ))),
    }
}

/// Given an mqtt::Packet reference, allocate a byte buffer with the packet
/// contents encoded into it. The returned vector holds exactly the encoded
/// bytes.
///
/// # Errors:
///
/// * EncodeFailed
pub fn encode(pkt: &Packet) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; pkt.encoded_len_hint()];

    let len = encode_slice(&pkt.to_mqttrs()?, &mut buf[..]).map_err(|e| {
        Error::EncodeFailed(format!("Unable to encode packet: {:?}", e))
    })?;
    buf.truncate(len);

    Ok(buf)
}

/// Send a packet across a framed tcp connection.
///
/// # Errors:
///
/// * EncodeFailed
/// * PacketSendFailed
pub async fn send(pkt: &Packet, framed: &mut FramedPackets) -> Result<()> {
    framed.send(pkt).await.map_err(|e| match e {
        Error::TokioErr(e) => Error::PacketSendFailed(format!("Unable to send packet: {:?}", e)),
        other => other,
    })
}

/// Wait for the next packet on a framed tcp connection. Returns `None` once
/// the peer has closed the stream.
///
/// # Errors:
///
/// * PacketReceiveFailed - also returned when the stream closes mid-packet
/// * InvalidPacket
pub async fn receive(framed: &mut FramedPackets) -> Result<Option<Packet>> {
    match framed.next().await {
        Some(Ok(pkt)) => Ok(Some(pkt)),
        Some(Err(Error::TokioErr(e))) => Err(Error::PacketReceiveFailed(format!(
            "Packet receive failed: {:?}",
            e
        ))),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}
