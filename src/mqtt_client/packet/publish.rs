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

//! PUBLISH and its acknowledgment packets (PUBACK, PUBREC, PUBREL, PUBCOMP).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mqtt_client::error::ProtocolError;

use super::codec::{read_string, read_u16, read_u8, write_string};
use super::properties::{AckProperties, PublishProperties};
use super::{write_packet, PacketType, Qos};

/// PUBLISH packet.
///
/// The topic name may be empty only when a topic alias property references a
/// previously mapped topic; resolving the alias is the session's job, the
/// codec carries the packet as received.
#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
    pub dup: bool,
    /// Present exactly when `qos` is above [`Qos::AtMostOnce`].
    pub packet_id: Option<u16>,
    pub properties: PublishProperties,
}

impl Publish {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut flags: u8 = (self.qos as u8) << 1;
        if self.retain {
            flags |= 0b0000_0001;
        }
        if self.dup {
            flags |= 0b0000_1000;
        }

        let mut body = BytesMut::new();
        write_string(&mut body, &self.topic);
        if self.qos != Qos::AtMostOnce {
            let id = self.packet_id.ok_or(ProtocolError::MalformedPacket)?;
            body.put_u16(id);
        }
        self.properties.encode(&mut body)?;
        body.put_slice(&self.payload);

        write_packet(buf, PacketType::Publish, flags, &body)
    }

    pub fn decode(flags: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        let qos = Qos::try_from((flags >> 1) & 0b11)?;
        let dup = flags & 0b0000_1000 != 0;
        let retain = flags & 0b0000_0001 != 0;
        if qos == Qos::AtMostOnce && dup {
            return Err(ProtocolError::InvalidFixedHeaderFlags {
                packet_type: PacketType::Publish as u8,
                flags,
            });
        }

        let topic = read_string(&mut body)?;
        if topic.contains(['+', '#']) {
            return Err(ProtocolError::InvalidTopicName(topic));
        }
        let packet_id = if qos != Qos::AtMostOnce {
            let id = read_u16(&mut body)?;
            if id == 0 {
                return Err(ProtocolError::MalformedPacket);
            }
            Some(id)
        } else {
            None
        };
        let properties = PublishProperties::decode(&mut body)?;
        if topic.is_empty() && properties.topic_alias.is_none() {
            return Err(ProtocolError::InvalidTopicName(topic));
        }

        Ok(Publish {
            topic,
            payload: body,
            qos,
            retain,
            dup,
            packet_id,
            properties,
        })
    }
}

/// Reason codes shared by PUBACK and PUBREC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PubAckReasonCode {
    #[default]
    Success = 0x00,
    NoMatchingSubscribers = 0x10,
    UnspecifiedError = 0x80,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    TopicNameInvalid = 0x90,
    PacketIdentifierInUse = 0x91,
    QuotaExceeded = 0x97,
    PayloadFormatInvalid = 0x99,
}

impl PubAckReasonCode {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            PubAckReasonCode::Success | PubAckReasonCode::NoMatchingSubscribers
        )
    }
}

impl TryFrom<u8> for PubAckReasonCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x00 => PubAckReasonCode::Success,
            0x10 => PubAckReasonCode::NoMatchingSubscribers,
            0x80 => PubAckReasonCode::UnspecifiedError,
            0x83 => PubAckReasonCode::ImplementationSpecificError,
            0x87 => PubAckReasonCode::NotAuthorized,
            0x90 => PubAckReasonCode::TopicNameInvalid,
            0x91 => PubAckReasonCode::PacketIdentifierInUse,
            0x97 => PubAckReasonCode::QuotaExceeded,
            0x99 => PubAckReasonCode::PayloadFormatInvalid,
            other => return Err(ProtocolError::InvalidReasonCode(other)),
        })
    }
}

/// Reason codes shared by PUBREL and PUBCOMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PubRelReasonCode {
    #[default]
    Success = 0x00,
    PacketIdentifierNotFound = 0x92,
}

impl TryFrom<u8> for PubRelReasonCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x00 => PubRelReasonCode::Success,
            0x92 => PubRelReasonCode::PacketIdentifierNotFound,
            other => return Err(ProtocolError::InvalidReasonCode(other)),
        })
    }
}

/// The four publish acknowledgments share one body layout: a packet
/// identifier, then optionally a reason code, then optionally properties.
/// The two-byte short form (identifier only) implies Success.
fn encode_ack(
    buf: &mut BytesMut,
    packet_type: PacketType,
    flags: u8,
    packet_id: u16,
    reason_code: u8,
    properties: &AckProperties,
) -> Result<(), ProtocolError> {
    let mut body = BytesMut::new();
    body.put_u16(packet_id);
    if reason_code != 0 || !properties.is_empty() {
        body.put_u8(reason_code);
        if !properties.is_empty() {
            properties.encode(&mut body)?;
        }
    }
    write_packet(buf, packet_type, flags, &body)
}

fn decode_ack(mut body: Bytes) -> Result<(u16, u8, AckProperties), ProtocolError> {
    let packet_id = read_u16(&mut body)?;
    if packet_id == 0 {
        return Err(ProtocolError::MalformedPacket);
    }
    if !body.has_remaining() {
        return Ok((packet_id, 0x00, AckProperties::default()));
    }
    let reason_code = read_u8(&mut body)?;
    let properties = AckProperties::decode(&mut body)?;
    if body.has_remaining() {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok((packet_id, reason_code, properties))
}

macro_rules! puback_like {
    ($name:ident, $packet_type:expr, $flags:expr, $reason:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            pub packet_id: u16,
            pub reason_code: $reason,
            pub properties: AckProperties,
        }

        impl $name {
            pub fn new(packet_id: u16) -> Self {
                Self {
                    packet_id,
                    reason_code: Default::default(),
                    properties: AckProperties::default(),
                }
            }

            pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
                encode_ack(
                    buf,
                    $packet_type,
                    $flags,
                    self.packet_id,
                    self.reason_code as u8,
                    &self.properties,
                )
            }

            pub fn decode(body: Bytes) -> Result<Self, ProtocolError> {
                let (packet_id, reason_code, properties) = decode_ack(body)?;
                Ok(Self {
                    packet_id,
                    reason_code: <$reason>::try_from(reason_code)?,
                    properties,
                })
            }
        }
    };
}

puback_like!(
    Puback,
    PacketType::Puback,
    0,
    PubAckReasonCode,
    "PUBACK packet, terminal acknowledgment of a QoS 1 PUBLISH."
);
puback_like!(
    Pubrec,
    PacketType::Pubrec,
    0,
    PubAckReasonCode,
    "PUBREC packet, first acknowledgment of a QoS 2 PUBLISH."
);
puback_like!(
    Pubrel,
    PacketType::Pubrel,
    0b0010,
    PubRelReasonCode,
    "PUBREL packet, release step of the QoS 2 handshake. Fixed header flags are mandated to be 0b0010."
);
puback_like!(
    Pubcomp,
    PacketType::Pubcomp,
    0,
    PubRelReasonCode,
    "PUBCOMP packet, terminal acknowledgment of a QoS 2 handshake."
);
