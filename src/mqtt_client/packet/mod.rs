// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! MQTT v5.0 control packet encoding and decoding.
//!
//! [`Packet::decode`] operates on an accumulation buffer fed directly from
//! the transport: when the buffer does not yet hold a complete packet it
//! returns `Ok(None)` and leaves the buffer untouched, so the caller can
//! read more bytes and retry. Once a complete frame is available it is split
//! off and parsed strictly; any inconsistency inside a complete frame is a
//! protocol error.

pub mod codec;
pub mod connect;
pub mod disconnect;
pub mod properties;
pub mod publish;
pub mod subscribe;

use bytes::{BufMut, Bytes, BytesMut};

use crate::mqtt_client::error::ProtocolError;

use codec::{peek_variable_int, variable_int_len, write_variable_int};

pub use connect::{Connack, Connect, ConnectReasonCode, Will};
pub use disconnect::{Disconnect, DisconnectReasonCode};
pub use properties::{
    AckProperties, ConnackProperties, ConnectProperties, DisconnectProperties, PublishProperties,
    SubscribeProperties, UnsubscribeProperties, WillProperties,
};
pub use publish::{PubAckReasonCode, PubRelReasonCode, Puback, Pubcomp, Publish, Pubrec, Pubrel};
pub use subscribe::{
    RetainHandling, Suback, Subscribe, SubscribeFilter, SubscribeReasonCode, UnsubAckReasonCode,
    Unsuback, Unsubscribe,
};

/// MQTT delivery guarantee level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Qos {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for Qos {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(ProtocolError::InvalidQos(other)),
        }
    }
}

/// Control packet type, as carried in the upper nibble of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            1 => PacketType::Connect,
            2 => PacketType::Connack,
            3 => PacketType::Publish,
            4 => PacketType::Puback,
            5 => PacketType::Pubrec,
            6 => PacketType::Pubrel,
            7 => PacketType::Pubcomp,
            8 => PacketType::Subscribe,
            9 => PacketType::Suback,
            10 => PacketType::Unsubscribe,
            11 => PacketType::Unsuback,
            12 => PacketType::Pingreq,
            13 => PacketType::Pingresp,
            14 => PacketType::Disconnect,
            15 => PacketType::Auth,
            other => return Err(ProtocolError::InvalidPacketType(other)),
        })
    }
}

/// Write a complete packet: fixed header byte, remaining length, body.
pub(crate) fn write_packet(
    buf: &mut BytesMut,
    packet_type: PacketType,
    flags: u8,
    body: &BytesMut,
) -> Result<(), ProtocolError> {
    buf.reserve(1 + variable_int_len(body.len() as u32) + body.len());
    buf.put_u8((packet_type as u8) << 4 | flags);
    write_variable_int(buf, body.len() as u32)?;
    buf.put_slice(body);
    Ok(())
}

/// A decoded MQTT v5.0 control packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Connect),
    Connack(Connack),
    Publish(Publish),
    Puback(Puback),
    Pubrec(Pubrec),
    Pubrel(Pubrel),
    Pubcomp(Pubcomp),
    Subscribe(Subscribe),
    Suback(Suback),
    Unsubscribe(Unsubscribe),
    Unsuback(Unsuback),
    Pingreq,
    Pingresp,
    Disconnect(Disconnect),
}

impl Packet {
    /// Try to decode one packet from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` holds an incomplete frame (more bytes
    /// from the transport are required), consuming nothing. On success the
    /// frame's bytes are consumed from `buf`. `max_size` is the negotiated
    /// Maximum Packet Size for incoming packets.
    pub fn decode(buf: &mut BytesMut, max_size: usize) -> Result<Option<Packet>, ProtocolError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let first = buf[0];
        let (remaining_len, len_bytes) = match peek_variable_int(&buf[1..])? {
            Some(v) => v,
            None => return Ok(None),
        };
        let total = 1 + len_bytes + remaining_len as usize;
        if total > max_size {
            return Err(ProtocolError::PacketTooLarge {
                size: total,
                max: max_size,
            });
        }
        if buf.len() < total {
            return Ok(None);
        }

        let mut frame = buf.split_to(total).freeze();
        let _ = frame.split_to(1 + len_bytes);
        let body = frame;

        let packet_type = PacketType::try_from(first >> 4)?;
        let flags = first & 0x0F;
        Self::decode_body(packet_type, flags, body).map(Some)
    }

    fn decode_body(
        packet_type: PacketType,
        flags: u8,
        body: Bytes,
    ) -> Result<Packet, ProtocolError> {
        // PUBLISH carries meaning in its flags; every other type mandates
        // a fixed value.
        let expected_flags = match packet_type {
            PacketType::Publish => flags,
            PacketType::Pubrel | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
            _ => 0,
        };
        if flags != expected_flags {
            return Err(ProtocolError::InvalidFixedHeaderFlags {
                packet_type: packet_type as u8,
                flags,
            });
        }

        Ok(match packet_type {
            PacketType::Connect => Packet::Connect(Connect::decode(body)?),
            PacketType::Connack => Packet::Connack(Connack::decode(body)?),
            PacketType::Publish => Packet::Publish(Publish::decode(flags, body)?),
            PacketType::Puback => Packet::Puback(Puback::decode(body)?),
            PacketType::Pubrec => Packet::Pubrec(Pubrec::decode(body)?),
            PacketType::Pubrel => Packet::Pubrel(Pubrel::decode(body)?),
            PacketType::Pubcomp => Packet::Pubcomp(Pubcomp::decode(body)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::decode(body)?),
            PacketType::Suback => Packet::Suback(Suback::decode(body)?),
            PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::decode(body)?),
            PacketType::Unsuback => Packet::Unsuback(Unsuback::decode(body)?),
            PacketType::Pingreq | PacketType::Pingresp => {
                if !body.is_empty() {
                    return Err(ProtocolError::MalformedPacket);
                }
                if packet_type == PacketType::Pingreq {
                    Packet::Pingreq
                } else {
                    Packet::Pingresp
                }
            }
            PacketType::Disconnect => Packet::Disconnect(Disconnect::decode(body)?),
            // AUTH exchanges are not supported; the connection option surface
            // never offers enhanced authentication, so receiving one means
            // the peer is out of sync with the negotiated capabilities.
            PacketType::Auth => return Err(ProtocolError::MalformedPacket),
        })
    }

    /// Serialize this packet, appending to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Packet::Connect(p) => p.encode(buf),
            Packet::Connack(p) => p.encode(buf),
            Packet::Publish(p) => p.encode(buf),
            Packet::Puback(p) => p.encode(buf),
            Packet::Pubrec(p) => p.encode(buf),
            Packet::Pubrel(p) => p.encode(buf),
            Packet::Pubcomp(p) => p.encode(buf),
            Packet::Subscribe(p) => p.encode(buf),
            Packet::Suback(p) => p.encode(buf),
            Packet::Unsubscribe(p) => p.encode(buf),
            Packet::Unsuback(p) => p.encode(buf),
            Packet::Pingreq => write_packet(buf, PacketType::Pingreq, 0, &BytesMut::new()),
            Packet::Pingresp => write_packet(buf, PacketType::Pingresp, 0, &BytesMut::new()),
            Packet::Disconnect(p) => p.encode(buf),
        }
    }

    /// Human-readable packet type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Packet::Connect(_) => "CONNECT",
            Packet::Connack(_) => "CONNACK",
            Packet::Publish(_) => "PUBLISH",
            Packet::Puback(_) => "PUBACK",
            Packet::Pubrec(_) => "PUBREC",
            Packet::Pubrel(_) => "PUBREL",
            Packet::Pubcomp(_) => "PUBCOMP",
            Packet::Subscribe(_) => "SUBSCRIBE",
            Packet::Suback(_) => "SUBACK",
            Packet::Unsubscribe(_) => "UNSUBSCRIBE",
            Packet::Unsuback(_) => "UNSUBACK",
            Packet::Pingreq => "PINGREQ",
            Packet::Pingresp => "PINGRESP",
            Packet::Disconnect(_) => "DISCONNECT",
        }
    }
}
