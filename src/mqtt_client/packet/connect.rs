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

//! CONNECT and CONNACK packets.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mqtt_client::error::ProtocolError;

use super::codec::{read_binary, read_string, read_u16, read_u8, write_binary, write_string};
use super::properties::{ConnackProperties, ConnectProperties, WillProperties};
use super::{write_packet, PacketType, Qos};

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 5;

/// Last-will message carried in CONNECT.
#[derive(Debug, Clone, PartialEq)]
pub struct Will {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
    pub properties: WillProperties,
}

/// CONNECT packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Connect {
    pub client_id: String,
    pub clean_start: bool,
    pub keep_alive: u16,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    pub will: Option<Will>,
    pub properties: ConnectProperties,
}

impl Connect {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        write_string(&mut body, PROTOCOL_NAME);
        body.put_u8(PROTOCOL_LEVEL);

        let mut flags: u8 = 0;
        if self.clean_start {
            flags |= 0b0000_0010;
        }
        if let Some(will) = &self.will {
            flags |= 0b0000_0100;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= 0b0010_0000;
            }
        }
        if self.password.is_some() {
            flags |= 0b0100_0000;
        }
        if self.username.is_some() {
            flags |= 0b1000_0000;
        }
        body.put_u8(flags);
        body.put_u16(self.keep_alive);
        self.properties.encode(&mut body)?;

        write_string(&mut body, &self.client_id);
        if let Some(will) = &self.will {
            will.properties.encode(&mut body)?;
            write_string(&mut body, &will.topic);
            write_binary(&mut body, &will.payload);
        }
        if let Some(username) = &self.username {
            write_string(&mut body, username);
        }
        if let Some(password) = &self.password {
            write_binary(&mut body, password);
        }

        write_packet(buf, PacketType::Connect, 0, &body)
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let name = read_string(&mut body)?;
        let level = read_u8(&mut body)?;
        if name != PROTOCOL_NAME || level != PROTOCOL_LEVEL {
            return Err(ProtocolError::MalformedPacket);
        }
        let flags = read_u8(&mut body)?;
        if flags & 0b0000_0001 != 0 {
            return Err(ProtocolError::MalformedPacket);
        }
        let keep_alive = read_u16(&mut body)?;
        let properties = ConnectProperties::decode(&mut body)?;
        let client_id = read_string(&mut body)?;

        let will = if flags & 0b0000_0100 != 0 {
            let will_properties = WillProperties::decode(&mut body)?;
            let topic = read_string(&mut body)?;
            let payload = read_binary(&mut body)?;
            Some(Will {
                topic,
                payload,
                qos: Qos::try_from((flags >> 3) & 0b11)?,
                retain: flags & 0b0010_0000 != 0,
                properties: will_properties,
            })
        } else {
            if flags & 0b0011_1000 != 0 {
                return Err(ProtocolError::MalformedPacket);
            }
            None
        };

        let username = if flags & 0b1000_0000 != 0 {
            Some(read_string(&mut body)?)
        } else {
            None
        };
        let password = if flags & 0b0100_0000 != 0 {
            Some(read_binary(&mut body)?)
        } else {
            None
        };
        if body.has_remaining() {
            return Err(ProtocolError::MalformedPacket);
        }

        Ok(Connect {
            client_id,
            clean_start: flags & 0b0000_0010 != 0,
            keep_alive,
            username,
            password,
            will,
            properties,
        })
    }
}

/// CONNACK reason codes defined by MQTT 5.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReasonCode {
    Success = 0x00,
    UnspecifiedError = 0x80,
    MalformedPacket = 0x81,
    ProtocolError = 0x82,
    ImplementationSpecificError = 0x83,
    UnsupportedProtocolVersion = 0x84,
    ClientIdentifierNotValid = 0x85,
    BadUserNameOrPassword = 0x86,
    NotAuthorized = 0x87,
    ServerUnavailable = 0x88,
    ServerBusy = 0x89,
    Banned = 0x8A,
    BadAuthenticationMethod = 0x8C,
    TopicNameInvalid = 0x90,
    PacketTooLarge = 0x95,
    QuotaExceeded = 0x97,
    PayloadFormatInvalid = 0x99,
    RetainNotSupported = 0x9A,
    QosNotSupported = 0x9B,
    UseAnotherServer = 0x9C,
    ServerMoved = 0x9D,
    ConnectionRateExceeded = 0x9F,
}

impl ConnectReasonCode {
    pub fn is_success(self) -> bool {
        matches!(self, ConnectReasonCode::Success)
    }
}

impl TryFrom<u8> for ConnectReasonCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        use ConnectReasonCode::*;
        Ok(match value {
            0x00 => Success,
            0x80 => UnspecifiedError,
            0x81 => MalformedPacket,
            0x82 => ProtocolError,
            0x83 => ImplementationSpecificError,
            0x84 => UnsupportedProtocolVersion,
            0x85 => ClientIdentifierNotValid,
            0x86 => BadUserNameOrPassword,
            0x87 => NotAuthorized,
            0x88 => ServerUnavailable,
            0x89 => ServerBusy,
            0x8A => Banned,
            0x8C => BadAuthenticationMethod,
            0x90 => TopicNameInvalid,
            0x95 => PacketTooLarge,
            0x97 => QuotaExceeded,
            0x99 => PayloadFormatInvalid,
            0x9A => RetainNotSupported,
            0x9B => QosNotSupported,
            0x9C => UseAnotherServer,
            0x9D => ServerMoved,
            0x9F => ConnectionRateExceeded,
            other => {
                return Err(crate::mqtt_client::error::ProtocolError::InvalidReasonCode(
                    other,
                ))
            }
        })
    }
}

/// CONNACK packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Connack {
    pub session_present: bool,
    pub reason_code: ConnectReasonCode,
    pub properties: ConnackProperties,
}

impl Connack {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_u8(u8::from(self.session_present));
        body.put_u8(self.reason_code as u8);
        self.properties.encode(&mut body)?;
        write_packet(buf, PacketType::Connack, 0, &body)
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let ack_flags = read_u8(&mut body)?;
        if ack_flags & 0b1111_1110 != 0 {
            return Err(ProtocolError::MalformedPacket);
        }
        let reason_code = ConnectReasonCode::try_from(read_u8(&mut body)?)?;
        let properties = ConnackProperties::decode(&mut body)?;
        if body.has_remaining() {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(Connack {
            session_present: ack_flags & 0b0000_0001 != 0,
            reason_code,
            properties,
        })
    }
}
