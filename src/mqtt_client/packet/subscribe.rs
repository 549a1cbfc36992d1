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

//! SUBSCRIBE, SUBACK, UNSUBSCRIBE, and UNSUBACK packets.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mqtt_client::error::ProtocolError;

use super::codec::{read_string, read_u16, read_u8, write_string};
use super::properties::{AckProperties, SubscribeProperties, UnsubscribeProperties};
use super::{write_packet, PacketType, Qos};

/// How retained messages are delivered when a subscription is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RetainHandling {
    /// Send retained messages at subscribe time.
    #[default]
    SendAtSubscribe = 0,
    /// Send retained messages only if the subscription did not already exist.
    SendIfNew = 1,
    /// Never send retained messages for this subscription.
    DoNotSend = 2,
}

/// One entry in a SUBSCRIBE payload: a topic filter plus its options byte.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeFilter {
    pub filter: String,
    pub qos: Qos,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl SubscribeFilter {
    pub fn new(filter: impl Into<String>, qos: Qos) -> Self {
        SubscribeFilter {
            filter: filter.into(),
            qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::default(),
        }
    }

    fn options_byte(&self) -> u8 {
        let mut options = self.qos as u8;
        if self.no_local {
            options |= 0b0000_0100;
        }
        if self.retain_as_published {
            options |= 0b0000_1000;
        }
        options | ((self.retain_handling as u8) << 4)
    }

    fn from_options(filter: String, options: u8) -> Result<Self, ProtocolError> {
        if options & 0b1100_0000 != 0 {
            return Err(ProtocolError::MalformedPacket);
        }
        let retain_handling = match (options >> 4) & 0b11 {
            0 => RetainHandling::SendAtSubscribe,
            1 => RetainHandling::SendIfNew,
            2 => RetainHandling::DoNotSend,
            _ => return Err(ProtocolError::MalformedPacket),
        };
        Ok(SubscribeFilter {
            filter,
            qos: Qos::try_from(options & 0b11)?,
            no_local: options & 0b0000_0100 != 0,
            retain_as_published: options & 0b0000_1000 != 0,
            retain_handling,
        })
    }
}

/// SUBSCRIBE packet. Fixed header flags are mandated to be 0b0010.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filters: Vec<SubscribeFilter>,
    pub properties: SubscribeProperties,
}

impl Subscribe {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_u16(self.packet_id);
        self.properties.encode(&mut body)?;
        for entry in &self.filters {
            write_string(&mut body, &entry.filter);
            body.put_u8(entry.options_byte());
        }
        write_packet(buf, PacketType::Subscribe, 0b0010, &body)
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let packet_id = read_u16(&mut body)?;
        if packet_id == 0 {
            return Err(ProtocolError::MalformedPacket);
        }
        let properties = SubscribeProperties::decode(&mut body)?;
        let mut filters = Vec::new();
        while body.has_remaining() {
            let filter = read_string(&mut body)?;
            let options = read_u8(&mut body)?;
            filters.push(SubscribeFilter::from_options(filter, options)?);
        }
        if filters.is_empty() {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(Subscribe {
            packet_id,
            filters,
            properties,
        })
    }
}

/// Per-filter SUBACK reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscribeReasonCode {
    GrantedQos0 = 0x00,
    GrantedQos1 = 0x01,
    GrantedQos2 = 0x02,
    UnspecifiedError = 0x80,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    TopicFilterInvalid = 0x8F,
    PacketIdentifierInUse = 0x91,
    QuotaExceeded = 0x97,
    SharedSubscriptionsNotSupported = 0x9E,
    SubscriptionIdentifiersNotSupported = 0xA1,
    WildcardSubscriptionsNotSupported = 0xA2,
}

impl SubscribeReasonCode {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            SubscribeReasonCode::GrantedQos0
                | SubscribeReasonCode::GrantedQos1
                | SubscribeReasonCode::GrantedQos2
        )
    }

    /// The QoS the broker granted, when the code is a grant.
    pub fn granted_qos(self) -> Option<Qos> {
        match self {
            SubscribeReasonCode::GrantedQos0 => Some(Qos::AtMostOnce),
            SubscribeReasonCode::GrantedQos1 => Some(Qos::AtLeastOnce),
            SubscribeReasonCode::GrantedQos2 => Some(Qos::ExactlyOnce),
            _ => None,
        }
    }
}

impl TryFrom<u8> for SubscribeReasonCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x00 => SubscribeReasonCode::GrantedQos0,
            0x01 => SubscribeReasonCode::GrantedQos1,
            0x02 => SubscribeReasonCode::GrantedQos2,
            0x80 => SubscribeReasonCode::UnspecifiedError,
            0x83 => SubscribeReasonCode::ImplementationSpecificError,
            0x87 => SubscribeReasonCode::NotAuthorized,
            0x8F => SubscribeReasonCode::TopicFilterInvalid,
            0x91 => SubscribeReasonCode::PacketIdentifierInUse,
            0x97 => SubscribeReasonCode::QuotaExceeded,
            0x9E => SubscribeReasonCode::SharedSubscriptionsNotSupported,
            0xA1 => SubscribeReasonCode::SubscriptionIdentifiersNotSupported,
            0xA2 => SubscribeReasonCode::WildcardSubscriptionsNotSupported,
            other => return Err(ProtocolError::InvalidReasonCode(other)),
        })
    }
}

/// SUBACK packet: one reason code per requested filter, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct Suback {
    pub packet_id: u16,
    pub reason_codes: Vec<SubscribeReasonCode>,
    pub properties: AckProperties,
}

impl Suback {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_u16(self.packet_id);
        self.properties.encode(&mut body)?;
        for code in &self.reason_codes {
            body.put_u8(*code as u8);
        }
        write_packet(buf, PacketType::Suback, 0, &body)
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let packet_id = read_u16(&mut body)?;
        let properties = AckProperties::decode(&mut body)?;
        let mut reason_codes = Vec::new();
        while body.has_remaining() {
            reason_codes.push(SubscribeReasonCode::try_from(read_u8(&mut body)?)?);
        }
        if reason_codes.is_empty() {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(Suback {
            packet_id,
            reason_codes,
            properties,
        })
    }
}

/// UNSUBSCRIBE packet. Fixed header flags are mandated to be 0b0010.
#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub filters: Vec<String>,
    pub properties: UnsubscribeProperties,
}

impl Unsubscribe {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_u16(self.packet_id);
        self.properties.encode(&mut body)?;
        for filter in &self.filters {
            write_string(&mut body, filter);
        }
        write_packet(buf, PacketType::Unsubscribe, 0b0010, &body)
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let packet_id = read_u16(&mut body)?;
        if packet_id == 0 {
            return Err(ProtocolError::MalformedPacket);
        }
        let properties = UnsubscribeProperties::decode(&mut body)?;
        let mut filters = Vec::new();
        while body.has_remaining() {
            filters.push(read_string(&mut body)?);
        }
        if filters.is_empty() {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(Unsubscribe {
            packet_id,
            filters,
            properties,
        })
    }
}

/// Per-filter UNSUBACK reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnsubAckReasonCode {
    Success = 0x00,
    NoSubscriptionExisted = 0x11,
    UnspecifiedError = 0x80,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    TopicFilterInvalid = 0x8F,
    PacketIdentifierInUse = 0x91,
}

impl UnsubAckReasonCode {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            UnsubAckReasonCode::Success | UnsubAckReasonCode::NoSubscriptionExisted
        )
    }
}

impl TryFrom<u8> for UnsubAckReasonCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x00 => UnsubAckReasonCode::Success,
            0x11 => UnsubAckReasonCode::NoSubscriptionExisted,
            0x80 => UnsubAckReasonCode::UnspecifiedError,
            0x83 => UnsubAckReasonCode::ImplementationSpecificError,
            0x87 => UnsubAckReasonCode::NotAuthorized,
            0x8F => UnsubAckReasonCode::TopicFilterInvalid,
            0x91 => UnsubAckReasonCode::PacketIdentifierInUse,
            other => return Err(ProtocolError::InvalidReasonCode(other)),
        })
    }
}

/// UNSUBACK packet: one reason code per requested filter, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct Unsuback {
    pub packet_id: u16,
    pub reason_codes: Vec<UnsubAckReasonCode>,
    pub properties: AckProperties,
}

impl Unsuback {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_u16(self.packet_id);
        self.properties.encode(&mut body)?;
        for code in &self.reason_codes {
            body.put_u8(*code as u8);
        }
        write_packet(buf, PacketType::Unsuback, 0, &body)
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let packet_id = read_u16(&mut body)?;
        let properties = AckProperties::decode(&mut body)?;
        let mut reason_codes = Vec::new();
        while body.has_remaining() {
            reason_codes.push(UnsubAckReasonCode::try_from(read_u8(&mut body)?)?);
        }
        if reason_codes.is_empty() {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(Unsuback {
            packet_id,
            reason_codes,
            properties,
        })
    }
}
