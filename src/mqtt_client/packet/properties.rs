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

//! MQTT v5.0 property blocks.
//!
//! Each packet type carries a typed property struct whose `decode` enforces
//! that packet's permitted-property whitelist and rejects duplicate singular
//! properties. Encoding always emits the variable-byte-integer length prefix,
//! even for an empty block.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mqtt_client::error::ProtocolError;

use super::codec::{
    read_binary, read_string, read_u16, read_u32, read_u8, read_variable_int, write_binary,
    write_string, write_variable_int,
};

/// MQTT 5.0 property identifiers.
pub mod property_id {
    pub const PAYLOAD_FORMAT_INDICATOR: u8 = 0x01;
    pub const MESSAGE_EXPIRY_INTERVAL: u8 = 0x02;
    pub const CONTENT_TYPE: u8 = 0x03;
    pub const RESPONSE_TOPIC: u8 = 0x08;
    pub const CORRELATION_DATA: u8 = 0x09;
    pub const SUBSCRIPTION_IDENTIFIER: u8 = 0x0B;
    pub const SESSION_EXPIRY_INTERVAL: u8 = 0x11;
    pub const ASSIGNED_CLIENT_IDENTIFIER: u8 = 0x12;
    pub const SERVER_KEEP_ALIVE: u8 = 0x13;
    pub const AUTHENTICATION_METHOD: u8 = 0x15;
    pub const AUTHENTICATION_DATA: u8 = 0x16;
    pub const REQUEST_PROBLEM_INFORMATION: u8 = 0x17;
    pub const WILL_DELAY_INTERVAL: u8 = 0x18;
    pub const REQUEST_RESPONSE_INFORMATION: u8 = 0x19;
    pub const RESPONSE_INFORMATION: u8 = 0x1A;
    pub const SERVER_REFERENCE: u8 = 0x1C;
    pub const REASON_STRING: u8 = 0x1F;
    pub const RECEIVE_MAXIMUM: u8 = 0x21;
    pub const TOPIC_ALIAS_MAXIMUM: u8 = 0x22;
    pub const TOPIC_ALIAS: u8 = 0x23;
    pub const MAXIMUM_QOS: u8 = 0x24;
    pub const RETAIN_AVAILABLE: u8 = 0x25;
    pub const USER_PROPERTY: u8 = 0x26;
    pub const MAXIMUM_PACKET_SIZE: u8 = 0x27;
    pub const WILDCARD_SUBSCRIPTION_AVAILABLE: u8 = 0x28;
    pub const SUBSCRIPTION_IDENTIFIER_AVAILABLE: u8 = 0x29;
    pub const SHARED_SUBSCRIPTION_AVAILABLE: u8 = 0x2A;
}

use property_id::*;

/// Store a singular property, rejecting a second occurrence.
fn set_once<T>(slot: &mut Option<T>, value: T, id: u8) -> Result<(), ProtocolError> {
    if slot.replace(value).is_some() {
        return Err(ProtocolError::DuplicateProperty(id));
    }
    Ok(())
}

/// Validate a user property pair against the 16-bit length-prefix limit.
pub fn validate_user_property(key: &str, value: &str) -> Result<(), ProtocolError> {
    if key.len() > u16::MAX as usize || value.len() > u16::MAX as usize {
        return Err(ProtocolError::InvalidPropertyValue(
            "user property key/value exceeds 65535 bytes",
        ));
    }
    Ok(())
}

/// Split the length-prefixed property block off a packet body.
fn read_property_block(buf: &mut Bytes) -> Result<Bytes, ProtocolError> {
    let len = read_variable_int(buf)? as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(buf.split_to(len))
}

/// Write `body` as a property block with its length prefix.
fn write_property_block(buf: &mut BytesMut, body: &BytesMut) -> Result<(), ProtocolError> {
    write_variable_int(buf, body.len() as u32)?;
    buf.put_slice(body);
    Ok(())
}

fn write_user_properties(buf: &mut BytesMut, props: &[(String, String)]) {
    for (key, value) in props {
        buf.put_u8(USER_PROPERTY);
        write_string(buf, key);
        write_string(buf, value);
    }
}

fn read_user_property(block: &mut Bytes) -> Result<(String, String), ProtocolError> {
    let key = read_string(block)?;
    let value = read_string(block)?;
    Ok((key, value))
}

/// Properties permitted in CONNECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: Option<u16>,
    pub request_response_information: Option<u8>,
    pub request_problem_information: Option<u8>,
    pub authentication_method: Option<String>,
    pub authentication_data: Option<Bytes>,
    pub user_properties: Vec<(String, String)>,
}

impl ConnectProperties {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let mut block = read_property_block(buf)?;
        let mut props = Self::default();
        while block.has_remaining() {
            let id = read_u8(&mut block)?;
            match id {
                SESSION_EXPIRY_INTERVAL => {
                    let v = read_u32(&mut block)?;
                    set_once(&mut props.session_expiry_interval, v, id)?;
                }
                RECEIVE_MAXIMUM => {
                    let v = read_u16(&mut block)?;
                    if v == 0 {
                        return Err(ProtocolError::InvalidPropertyValue("Receive Maximum 0"));
                    }
                    set_once(&mut props.receive_maximum, v, id)?;
                }
                MAXIMUM_PACKET_SIZE => {
                    let v = read_u32(&mut block)?;
                    if v == 0 {
                        return Err(ProtocolError::InvalidPropertyValue("Maximum Packet Size 0"));
                    }
                    set_once(&mut props.maximum_packet_size, v, id)?;
                }
                TOPIC_ALIAS_MAXIMUM => {
                    let v = read_u16(&mut block)?;
                    set_once(&mut props.topic_alias_maximum, v, id)?;
                }
                REQUEST_RESPONSE_INFORMATION => {
                    let v = read_u8(&mut block)?;
                    set_once(&mut props.request_response_information, v, id)?;
                }
                REQUEST_PROBLEM_INFORMATION => {
                    let v = read_u8(&mut block)?;
                    set_once(&mut props.request_problem_information, v, id)?;
                }
                AUTHENTICATION_METHOD => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.authentication_method, v, id)?;
                }
                AUTHENTICATION_DATA => {
                    let v = read_binary(&mut block)?;
                    set_once(&mut props.authentication_data, v, id)?;
                }
                USER_PROPERTY => props.user_properties.push(read_user_property(&mut block)?),
                other => return Err(ProtocolError::DisallowedProperty(other)),
            }
        }
        Ok(props)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        if let Some(v) = self.session_expiry_interval {
            body.put_u8(SESSION_EXPIRY_INTERVAL);
            body.put_u32(v);
        }
        if let Some(v) = self.receive_maximum {
            body.put_u8(RECEIVE_MAXIMUM);
            body.put_u16(v);
        }
        if let Some(v) = self.maximum_packet_size {
            body.put_u8(MAXIMUM_PACKET_SIZE);
            body.put_u32(v);
        }
        if let Some(v) = self.topic_alias_maximum {
            body.put_u8(TOPIC_ALIAS_MAXIMUM);
            body.put_u16(v);
        }
        if let Some(v) = self.request_response_information {
            body.put_u8(REQUEST_RESPONSE_INFORMATION);
            body.put_u8(v);
        }
        if let Some(v) = self.request_problem_information {
            body.put_u8(REQUEST_PROBLEM_INFORMATION);
            body.put_u8(v);
        }
        if let Some(v) = &self.authentication_method {
            body.put_u8(AUTHENTICATION_METHOD);
            write_string(&mut body, v);
        }
        if let Some(v) = &self.authentication_data {
            body.put_u8(AUTHENTICATION_DATA);
            write_binary(&mut body, v);
        }
        write_user_properties(&mut body, &self.user_properties);
        write_property_block(buf, &body)
    }
}

/// Properties permitted in the will block of CONNECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WillProperties {
    pub will_delay_interval: Option<u32>,
    pub payload_format_indicator: Option<u8>,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    pub user_properties: Vec<(String, String)>,
}

impl WillProperties {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let mut block = read_property_block(buf)?;
        let mut props = Self::default();
        while block.has_remaining() {
            let id = read_u8(&mut block)?;
            match id {
                WILL_DELAY_INTERVAL => {
                    let v = read_u32(&mut block)?;
                    set_once(&mut props.will_delay_interval, v, id)?;
                }
                PAYLOAD_FORMAT_INDICATOR => {
                    let v = read_u8(&mut block)?;
                    set_once(&mut props.payload_format_indicator, v, id)?;
                }
                MESSAGE_EXPIRY_INTERVAL => {
                    let v = read_u32(&mut block)?;
                    set_once(&mut props.message_expiry_interval, v, id)?;
                }
                CONTENT_TYPE => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.content_type, v, id)?;
                }
                RESPONSE_TOPIC => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.response_topic, v, id)?;
                }
                CORRELATION_DATA => {
                    let v = read_binary(&mut block)?;
                    set_once(&mut props.correlation_data, v, id)?;
                }
                USER_PROPERTY => props.user_properties.push(read_user_property(&mut block)?),
                other => return Err(ProtocolError::DisallowedProperty(other)),
            }
        }
        Ok(props)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        if let Some(v) = self.will_delay_interval {
            body.put_u8(WILL_DELAY_INTERVAL);
            body.put_u32(v);
        }
        if let Some(v) = self.payload_format_indicator {
            body.put_u8(PAYLOAD_FORMAT_INDICATOR);
            body.put_u8(v);
        }
        if let Some(v) = self.message_expiry_interval {
            body.put_u8(MESSAGE_EXPIRY_INTERVAL);
            body.put_u32(v);
        }
        if let Some(v) = &self.content_type {
            body.put_u8(CONTENT_TYPE);
            write_string(&mut body, v);
        }
        if let Some(v) = &self.response_topic {
            body.put_u8(RESPONSE_TOPIC);
            write_string(&mut body, v);
        }
        if let Some(v) = &self.correlation_data {
            body.put_u8(CORRELATION_DATA);
            write_binary(&mut body, v);
        }
        write_user_properties(&mut body, &self.user_properties);
        write_property_block(buf, &body)
    }
}

/// Properties permitted in CONNACK.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnackProperties {
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_qos: Option<u8>,
    pub retain_available: Option<u8>,
    pub maximum_packet_size: Option<u32>,
    pub assigned_client_identifier: Option<String>,
    pub topic_alias_maximum: Option<u16>,
    pub reason_string: Option<String>,
    pub wildcard_subscription_available: Option<u8>,
    pub subscription_identifiers_available: Option<u8>,
    pub shared_subscription_available: Option<u8>,
    pub server_keep_alive: Option<u16>,
    pub response_information: Option<String>,
    pub server_reference: Option<String>,
    pub authentication_method: Option<String>,
    pub authentication_data: Option<Bytes>,
    pub user_properties: Vec<(String, String)>,
}

impl ConnackProperties {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let mut block = read_property_block(buf)?;
        let mut props = Self::default();
        while block.has_remaining() {
            let id = read_u8(&mut block)?;
            match id {
                SESSION_EXPIRY_INTERVAL => {
                    let v = read_u32(&mut block)?;
                    set_once(&mut props.session_expiry_interval, v, id)?;
                }
                RECEIVE_MAXIMUM => {
                    let v = read_u16(&mut block)?;
                    if v == 0 {
                        return Err(ProtocolError::InvalidPropertyValue("Receive Maximum 0"));
                    }
                    set_once(&mut props.receive_maximum, v, id)?;
                }
                MAXIMUM_QOS => {
                    let v = read_u8(&mut block)?;
                    if v > 1 {
                        return Err(ProtocolError::InvalidPropertyValue("Maximum QoS above 1"));
                    }
                    set_once(&mut props.maximum_qos, v, id)?;
                }
                RETAIN_AVAILABLE => {
                    let v = read_u8(&mut block)?;
                    set_once(&mut props.retain_available, v, id)?;
                }
                MAXIMUM_PACKET_SIZE => {
                    let v = read_u32(&mut block)?;
                    if v == 0 {
                        return Err(ProtocolError::InvalidPropertyValue("Maximum Packet Size 0"));
                    }
                    set_once(&mut props.maximum_packet_size, v, id)?;
                }
                ASSIGNED_CLIENT_IDENTIFIER => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.assigned_client_identifier, v, id)?;
                }
                TOPIC_ALIAS_MAXIMUM => {
                    let v = read_u16(&mut block)?;
                    set_once(&mut props.topic_alias_maximum, v, id)?;
                }
                REASON_STRING => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.reason_string, v, id)?;
                }
                WILDCARD_SUBSCRIPTION_AVAILABLE => {
                    let v = read_u8(&mut block)?;
                    set_once(&mut props.wildcard_subscription_available, v, id)?;
                }
                SUBSCRIPTION_IDENTIFIER_AVAILABLE => {
                    let v = read_u8(&mut block)?;
                    set_once(&mut props.subscription_identifiers_available, v, id)?;
                }
                SHARED_SUBSCRIPTION_AVAILABLE => {
                    let v = read_u8(&mut block)?;
                    set_once(&mut props.shared_subscription_available, v, id)?;
                }
                SERVER_KEEP_ALIVE => {
                    let v = read_u16(&mut block)?;
                    set_once(&mut props.server_keep_alive, v, id)?;
                }
                RESPONSE_INFORMATION => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.response_information, v, id)?;
                }
                SERVER_REFERENCE => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.server_reference, v, id)?;
                }
                AUTHENTICATION_METHOD => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.authentication_method, v, id)?;
                }
                AUTHENTICATION_DATA => {
                    let v = read_binary(&mut block)?;
                    set_once(&mut props.authentication_data, v, id)?;
                }
                USER_PROPERTY => props.user_properties.push(read_user_property(&mut block)?),
                other => return Err(ProtocolError::DisallowedProperty(other)),
            }
        }
        Ok(props)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        if let Some(v) = self.session_expiry_interval {
            body.put_u8(SESSION_EXPIRY_INTERVAL);
            body.put_u32(v);
        }
        if let Some(v) = self.receive_maximum {
            body.put_u8(RECEIVE_MAXIMUM);
            body.put_u16(v);
        }
        if let Some(v) = self.maximum_qos {
            body.put_u8(MAXIMUM_QOS);
            body.put_u8(v);
        }
        if let Some(v) = self.retain_available {
            body.put_u8(RETAIN_AVAILABLE);
            body.put_u8(v);
        }
        if let Some(v) = self.maximum_packet_size {
            body.put_u8(MAXIMUM_PACKET_SIZE);
            body.put_u32(v);
        }
        if let Some(v) = &self.assigned_client_identifier {
            body.put_u8(ASSIGNED_CLIENT_IDENTIFIER);
            write_string(&mut body, v);
        }
        if let Some(v) = self.topic_alias_maximum {
            body.put_u8(TOPIC_ALIAS_MAXIMUM);
            body.put_u16(v);
        }
        if let Some(v) = &self.reason_string {
            body.put_u8(REASON_STRING);
            write_string(&mut body, v);
        }
        if let Some(v) = self.wildcard_subscription_available {
            body.put_u8(WILDCARD_SUBSCRIPTION_AVAILABLE);
            body.put_u8(v);
        }
        if let Some(v) = self.subscription_identifiers_available {
            body.put_u8(SUBSCRIPTION_IDENTIFIER_AVAILABLE);
            body.put_u8(v);
        }
        if let Some(v) = self.shared_subscription_available {
            body.put_u8(SHARED_SUBSCRIPTION_AVAILABLE);
            body.put_u8(v);
        }
        if let Some(v) = self.server_keep_alive {
            body.put_u8(SERVER_KEEP_ALIVE);
            body.put_u16(v);
        }
        if let Some(v) = &self.response_information {
            body.put_u8(RESPONSE_INFORMATION);
            write_string(&mut body, v);
        }
        if let Some(v) = &self.server_reference {
            body.put_u8(SERVER_REFERENCE);
            write_string(&mut body, v);
        }
        if let Some(v) = &self.authentication_method {
            body.put_u8(AUTHENTICATION_METHOD);
            write_string(&mut body, v);
        }
        if let Some(v) = &self.authentication_data {
            body.put_u8(AUTHENTICATION_DATA);
            write_binary(&mut body, v);
        }
        write_user_properties(&mut body, &self.user_properties);
        write_property_block(buf, &body)
    }
}

/// Properties permitted in PUBLISH.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishProperties {
    pub payload_format_indicator: Option<u8>,
    pub message_expiry_interval: Option<u32>,
    pub topic_alias: Option<u16>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    /// Attached by the broker; multiple occurrences are legal.
    pub subscription_identifiers: Vec<u32>,
    pub content_type: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

impl PublishProperties {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let mut block = read_property_block(buf)?;
        let mut props = Self::default();
        while block.has_remaining() {
            let id = read_u8(&mut block)?;
            match id {
                PAYLOAD_FORMAT_INDICATOR => {
                    let v = read_u8(&mut block)?;
                    set_once(&mut props.payload_format_indicator, v, id)?;
                }
                MESSAGE_EXPIRY_INTERVAL => {
                    let v = read_u32(&mut block)?;
                    set_once(&mut props.message_expiry_interval, v, id)?;
                }
                TOPIC_ALIAS => {
                    let v = read_u16(&mut block)?;
                    if v == 0 {
                        return Err(ProtocolError::TopicAliasInvalid(0));
                    }
                    set_once(&mut props.topic_alias, v, id)?;
                }
                RESPONSE_TOPIC => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.response_topic, v, id)?;
                }
                CORRELATION_DATA => {
                    let v = read_binary(&mut block)?;
                    set_once(&mut props.correlation_data, v, id)?;
                }
                SUBSCRIPTION_IDENTIFIER => {
                    let v = read_variable_int(&mut block)?;
                    if v == 0 {
                        return Err(ProtocolError::InvalidPropertyValue(
                            "Subscription Identifier 0",
                        ));
                    }
                    props.subscription_identifiers.push(v);
                }
                CONTENT_TYPE => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.content_type, v, id)?;
                }
                USER_PROPERTY => props.user_properties.push(read_user_property(&mut block)?),
                other => return Err(ProtocolError::DisallowedProperty(other)),
            }
        }
        Ok(props)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        if let Some(v) = self.payload_format_indicator {
            body.put_u8(PAYLOAD_FORMAT_INDICATOR);
            body.put_u8(v);
        }
        if let Some(v) = self.message_expiry_interval {
            body.put_u8(MESSAGE_EXPIRY_INTERVAL);
            body.put_u32(v);
        }
        if let Some(v) = self.topic_alias {
            body.put_u8(TOPIC_ALIAS);
            body.put_u16(v);
        }
        if let Some(v) = &self.response_topic {
            body.put_u8(RESPONSE_TOPIC);
            write_string(&mut body, v);
        }
        if let Some(v) = &self.correlation_data {
            body.put_u8(CORRELATION_DATA);
            write_binary(&mut body, v);
        }
        for v in &self.subscription_identifiers {
            body.put_u8(SUBSCRIPTION_IDENTIFIER);
            write_variable_int(&mut body, *v)?;
        }
        if let Some(v) = &self.content_type {
            body.put_u8(CONTENT_TYPE);
            write_string(&mut body, v);
        }
        write_user_properties(&mut body, &self.user_properties);
        write_property_block(buf, &body)
    }
}

/// Properties permitted in PUBACK, PUBREC, PUBREL, PUBCOMP, SUBACK, and
/// UNSUBACK: Reason String plus User Properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AckProperties {
    pub reason_string: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

impl AckProperties {
    /// Decode, tolerating a fully absent block (the acknowledgment short
    /// forms omit it).
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if !buf.has_remaining() {
            return Ok(Self::default());
        }
        let mut block = read_property_block(buf)?;
        let mut props = Self::default();
        while block.has_remaining() {
            let id = read_u8(&mut block)?;
            match id {
                REASON_STRING => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.reason_string, v, id)?;
                }
                USER_PROPERTY => props.user_properties.push(read_user_property(&mut block)?),
                other => return Err(ProtocolError::DisallowedProperty(other)),
            }
        }
        Ok(props)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        if let Some(v) = &self.reason_string {
            body.put_u8(REASON_STRING);
            write_string(&mut body, v);
        }
        write_user_properties(&mut body, &self.user_properties);
        write_property_block(buf, &body)
    }

    pub fn is_empty(&self) -> bool {
        self.reason_string.is_none() && self.user_properties.is_empty()
    }
}

/// Properties permitted in SUBSCRIBE.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeProperties {
    pub subscription_identifier: Option<u32>,
    pub user_properties: Vec<(String, String)>,
}

impl SubscribeProperties {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let mut block = read_property_block(buf)?;
        let mut props = Self::default();
        while block.has_remaining() {
            let id = read_u8(&mut block)?;
            match id {
                SUBSCRIPTION_IDENTIFIER => {
                    let v = read_variable_int(&mut block)?;
                    if v == 0 {
                        return Err(ProtocolError::InvalidPropertyValue(
                            "Subscription Identifier 0",
                        ));
                    }
                    set_once(&mut props.subscription_identifier, v, id)?;
                }
                USER_PROPERTY => props.user_properties.push(read_user_property(&mut block)?),
                other => return Err(ProtocolError::DisallowedProperty(other)),
            }
        }
        Ok(props)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        if let Some(v) = self.subscription_identifier {
            body.put_u8(SUBSCRIPTION_IDENTIFIER);
            write_variable_int(&mut body, v)?;
        }
        write_user_properties(&mut body, &self.user_properties);
        write_property_block(buf, &body)
    }
}

/// Properties permitted in UNSUBSCRIBE: User Properties only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnsubscribeProperties {
    pub user_properties: Vec<(String, String)>,
}

impl UnsubscribeProperties {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let mut block = read_property_block(buf)?;
        let mut props = Self::default();
        while block.has_remaining() {
            let id = read_u8(&mut block)?;
            match id {
                USER_PROPERTY => props.user_properties.push(read_user_property(&mut block)?),
                other => return Err(ProtocolError::DisallowedProperty(other)),
            }
        }
        Ok(props)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        write_user_properties(&mut body, &self.user_properties);
        write_property_block(buf, &body)
    }
}

/// Properties permitted in DISCONNECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisconnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub reason_string: Option<String>,
    pub server_reference: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

impl DisconnectProperties {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if !buf.has_remaining() {
            return Ok(Self::default());
        }
        let mut block = read_property_block(buf)?;
        let mut props = Self::default();
        while block.has_remaining() {
            let id = read_u8(&mut block)?;
            match id {
                SESSION_EXPIRY_INTERVAL => {
                    let v = read_u32(&mut block)?;
                    set_once(&mut props.session_expiry_interval, v, id)?;
                }
                REASON_STRING => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.reason_string, v, id)?;
                }
                SERVER_REFERENCE => {
                    let v = read_string(&mut block)?;
                    set_once(&mut props.server_reference, v, id)?;
                }
                USER_PROPERTY => props.user_properties.push(read_user_property(&mut block)?),
                other => return Err(ProtocolError::DisallowedProperty(other)),
            }
        }
        Ok(props)
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        if let Some(v) = self.session_expiry_interval {
            body.put_u8(SESSION_EXPIRY_INTERVAL);
            body.put_u32(v);
        }
        if let Some(v) = &self.reason_string {
            body.put_u8(REASON_STRING);
            write_string(&mut body, v);
        }
        if let Some(v) = &self.server_reference {
            body.put_u8(SERVER_REFERENCE);
            write_string(&mut body, v);
        }
        write_user_properties(&mut body, &self.user_properties);
        write_property_block(buf, &body)
    }

    pub fn is_empty(&self) -> bool {
        self.session_expiry_interval.is_none()
            && self.reason_string.is_none()
            && self.server_reference.is_none()
            && self.user_properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_singular_property_is_rejected() {
        // Two Payload Format Indicators in a PUBLISH property block.
        let mut body = BytesMut::new();
        body.put_u8(PAYLOAD_FORMAT_INDICATOR);
        body.put_u8(1);
        body.put_u8(PAYLOAD_FORMAT_INDICATOR);
        body.put_u8(0);

        let mut buf = BytesMut::new();
        write_variable_int(&mut buf, body.len() as u32).unwrap();
        buf.put_slice(&body);

        let mut bytes = buf.freeze();
        assert_eq!(
            PublishProperties::decode(&mut bytes),
            Err(ProtocolError::DuplicateProperty(PAYLOAD_FORMAT_INDICATOR))
        );
    }

    #[test]
    fn disallowed_property_is_rejected() {
        // Topic Alias inside a CONNECT property block.
        let mut body = BytesMut::new();
        body.put_u8(TOPIC_ALIAS);
        body.put_u16(4);

        let mut buf = BytesMut::new();
        write_variable_int(&mut buf, body.len() as u32).unwrap();
        buf.put_slice(&body);

        let mut bytes = buf.freeze();
        assert_eq!(
            ConnectProperties::decode(&mut bytes),
            Err(ProtocolError::DisallowedProperty(TOPIC_ALIAS))
        );
    }

    #[test]
    fn connack_properties_round_trip() {
        let props = ConnackProperties {
            session_expiry_interval: Some(120),
            receive_maximum: Some(10),
            maximum_qos: Some(1),
            topic_alias_maximum: Some(5),
            assigned_client_identifier: Some("auto-1".into()),
            user_properties: vec![("region".into(), "eu-west".into())],
            ..Default::default()
        };

        let mut buf = BytesMut::new();
        props.encode(&mut buf).unwrap();
        let mut bytes = buf.freeze();
        assert_eq!(ConnackProperties::decode(&mut bytes).unwrap(), props);
        assert!(bytes.is_empty());
    }

    #[test]
    fn receive_maximum_zero_is_invalid() {
        let mut body = BytesMut::new();
        body.put_u8(RECEIVE_MAXIMUM);
        body.put_u16(0);

        let mut buf = BytesMut::new();
        write_variable_int(&mut buf, body.len() as u32).unwrap();
        buf.put_slice(&body);

        let mut bytes = buf.freeze();
        assert!(matches!(
            ConnackProperties::decode(&mut bytes),
            Err(ProtocolError::InvalidPropertyValue(_))
        ));
    }
}
