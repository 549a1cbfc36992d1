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

//! DISCONNECT packet.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mqtt_client::error::ProtocolError;

use super::codec::read_u8;
use super::properties::DisconnectProperties;
use super::{write_packet, PacketType};

/// DISCONNECT reason codes relevant to a client (sent or received).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DisconnectReasonCode {
    #[default]
    NormalDisconnection = 0x00,
    /// Normal teardown that still asks the broker to publish the will.
    DisconnectWithWillMessage = 0x04,
    UnspecifiedError = 0x80,
    MalformedPacket = 0x81,
    ProtocolError = 0x82,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    ServerBusy = 0x89,
    ServerShuttingDown = 0x8B,
    KeepAliveTimeout = 0x8D,
    SessionTakenOver = 0x8E,
    TopicFilterInvalid = 0x8F,
    TopicNameInvalid = 0x90,
    ReceiveMaximumExceeded = 0x93,
    TopicAliasInvalid = 0x94,
    PacketTooLarge = 0x95,
    MessageRateTooHigh = 0x96,
    QuotaExceeded = 0x97,
    AdministrativeAction = 0x98,
    PayloadFormatInvalid = 0x99,
    RetainNotSupported = 0x9A,
    QosNotSupported = 0x9B,
    UseAnotherServer = 0x9C,
    ServerMoved = 0x9D,
    SharedSubscriptionsNotSupported = 0x9E,
    ConnectionRateExceeded = 0x9F,
    MaximumConnectTime = 0xA0,
    SubscriptionIdentifiersNotSupported = 0xA1,
    WildcardSubscriptionsNotSupported = 0xA2,
}

impl TryFrom<u8> for DisconnectReasonCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        use DisconnectReasonCode::*;
        Ok(match value {
            0x00 => NormalDisconnection,
            0x04 => DisconnectWithWillMessage,
            0x80 => UnspecifiedError,
            0x81 => MalformedPacket,
            0x82 => ProtocolError,
            0x83 => ImplementationSpecificError,
            0x87 => NotAuthorized,
            0x89 => ServerBusy,
            0x8B => ServerShuttingDown,
            0x8D => KeepAliveTimeout,
            0x8E => SessionTakenOver,
            0x8F => TopicFilterInvalid,
            0x90 => TopicNameInvalid,
            0x93 => ReceiveMaximumExceeded,
            0x94 => TopicAliasInvalid,
            0x95 => PacketTooLarge,
            0x96 => MessageRateTooHigh,
            0x97 => QuotaExceeded,
            0x98 => AdministrativeAction,
            0x99 => PayloadFormatInvalid,
            0x9A => RetainNotSupported,
            0x9B => QosNotSupported,
            0x9C => UseAnotherServer,
            0x9D => ServerMoved,
            0x9E => SharedSubscriptionsNotSupported,
            0x9F => ConnectionRateExceeded,
            0xA0 => MaximumConnectTime,
            0xA1 => SubscriptionIdentifiersNotSupported,
            0xA2 => WildcardSubscriptionsNotSupported,
            other => {
                return Err(crate::mqtt_client::error::ProtocolError::InvalidReasonCode(
                    other,
                ))
            }
        })
    }
}

/// DISCONNECT packet. The zero-byte body short form means
/// `NormalDisconnection` with no properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Disconnect {
    pub reason_code: DisconnectReasonCode,
    pub properties: DisconnectProperties,
}

impl Disconnect {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        if self.reason_code != DisconnectReasonCode::NormalDisconnection
            || !self.properties.is_empty()
        {
            body.put_u8(self.reason_code as u8);
            if !self.properties.is_empty() {
                self.properties.encode(&mut body)?;
            }
        }
        write_packet(buf, PacketType::Disconnect, 0, &body)
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        if !body.has_remaining() {
            return Ok(Disconnect::default());
        }
        let reason_code = DisconnectReasonCode::try_from(read_u8(&mut body)?)?;
        let properties = DisconnectProperties::decode(&mut body)?;
        if body.has_remaining() {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(Disconnect {
            reason_code,
            properties,
        })
    }
}
