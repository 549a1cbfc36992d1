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

use crate::mqtt_client::packet::connect::ConnectReasonCode;
use crate::mqtt_client::transport::TransportError;

/// MQTT protocol violation detected while encoding, decoding, or validating
/// packets and session state.
///
/// Violations raised while decoding bytes received from the peer are fatal to
/// the connection (the byte stream can no longer be trusted). Violations
/// raised by local validation before a packet is sent reject only the
/// offending call and leave the connection intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Packet could not be parsed: truncated body, bad length field, or
    /// otherwise inconsistent framing.
    MalformedPacket,
    /// Remaining-length variable byte integer used more than 4 bytes.
    MalformedRemainingLength,
    /// Fixed header carried an unknown or reserved packet type.
    InvalidPacketType(u8),
    /// Fixed header flags are invalid for the packet type (e.g. PUBREL
    /// without the mandated 0b0010 flags).
    InvalidFixedHeaderFlags { packet_type: u8, flags: u8 },
    /// A singular property appeared more than once in a property block.
    DuplicateProperty(u8),
    /// A property identifier is not permitted for the containing packet type.
    DisallowedProperty(u8),
    /// A property value is outside its legal range (e.g. Receive Maximum 0).
    InvalidPropertyValue(&'static str),
    /// Payload or header carried bytes that are not valid UTF-8 where a
    /// UTF-8 string is mandated.
    InvalidUtf8,
    /// QoS field outside 0..=2.
    InvalidQos(u8),
    /// A reason code byte that is not defined for the packet carrying it.
    InvalidReasonCode(u8),
    /// Incoming packet exceeds the advertised Maximum Packet Size.
    PacketTooLarge { size: usize, max: usize },
    /// Topic name contains wildcard characters or is empty.
    InvalidTopicName(String),
    /// Topic filter is empty or uses `+`/`#` in a malformed position.
    InvalidTopicFilter(String),
    /// Incoming topic alias is zero or exceeds the advertised maximum.
    TopicAliasInvalid(u16),
    /// An alias-only PUBLISH referenced an alias never recorded on this
    /// connection.
    UnknownTopicAlias(u16),
    /// An acknowledgment packet referenced a packet identifier with no
    /// pending delivery. Reported and ignored, never fatal.
    UnsolicitedAck { packet_type: &'static str, packet_id: u16 },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::MalformedPacket => write!(f, "Malformed packet"),
            ProtocolError::MalformedRemainingLength => {
                write!(f, "Remaining length exceeds 4 bytes")
            }
            ProtocolError::InvalidPacketType(t) => write!(f, "Invalid packet type: {t}"),
            ProtocolError::InvalidFixedHeaderFlags { packet_type, flags } => {
                write!(
                    f,
                    "Invalid fixed header flags {flags:#04x} for packet type {packet_type}"
                )
            }
            ProtocolError::DuplicateProperty(id) => {
                write!(f, "Duplicate property identifier: {id:#04x}")
            }
            ProtocolError::DisallowedProperty(id) => {
                write!(f, "Property identifier {id:#04x} not allowed in this packet")
            }
            ProtocolError::InvalidPropertyValue(what) => {
                write!(f, "Invalid property value: {what}")
            }
            ProtocolError::InvalidUtf8 => write!(f, "Invalid UTF-8 string"),
            ProtocolError::InvalidQos(q) => write!(f, "Invalid QoS value: {q}"),
            ProtocolError::InvalidReasonCode(c) => write!(f, "Invalid reason code: {c:#04x}"),
            ProtocolError::PacketTooLarge { size, max } => {
                write!(f, "Packet of {size} bytes exceeds maximum packet size {max}")
            }
            ProtocolError::InvalidTopicName(t) => write!(f, "Invalid topic name: {t:?}"),
            ProtocolError::InvalidTopicFilter(t) => write!(f, "Invalid topic filter: {t:?}"),
            ProtocolError::TopicAliasInvalid(a) => write!(f, "Topic alias out of range: {a}"),
            ProtocolError::UnknownTopicAlias(a) => {
                write!(f, "Topic alias {a} was never mapped on this connection")
            }
            ProtocolError::UnsolicitedAck { packet_type, packet_id } => {
                write!(f, "Unsolicited {packet_type} for packet identifier {packet_id}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Unified error type for client operations.
///
/// Every public API of [`Client`](crate::mqtt_client::client::Client) returns
/// `Result<T, ClientError>`. The variants separate the four failure classes
/// the engine distinguishes: transport failures (recoverable by reconnect),
/// protocol violations, local sequencing/usage errors, and timeouts.
#[derive(Debug)]
pub enum ClientError {
    /// MQTT protocol violation, either detected in peer bytes or raised by
    /// local validation before send.
    Protocol(ProtocolError),
    /// I/O or transport-level failure.
    Transport(TransportError),
    /// The client's background task is gone; the client instance must be
    /// recreated.
    ChannelClosed,
    /// Operation requires an established session.
    NotConnected,
    /// A connect was requested while a session is already established or
    /// being established.
    AlreadyConnected,
    /// The broker refused the connection with a non-success CONNACK reason
    /// code.
    ConnectRejected(ConnectReasonCode),
    /// No CONNACK arrived within the configured connect timeout.
    ConnectTimeout,
    /// A transactional response (PUBACK/PUBCOMP/SUBACK/UNSUBACK) did not
    /// arrive within the configured response timeout. Retryable by the
    /// caller; the engine does not retry on its own.
    ResponseTimeout,
    /// The connection dropped while the operation was in flight.
    ConnectionLost,
    /// All 65535 packet identifiers are outstanding.
    PacketIdExhausted,
    /// `acknowledge` was called but manual acknowledgment is not enabled.
    ManualAckDisabled,
    /// `acknowledge` referenced a packet identifier with no pending inbound
    /// publish.
    NoPendingInboundPublish(u16),
    /// `acknowledge` referenced a pending inbound publish that was already
    /// acknowledged.
    AlreadyAcknowledged(u16),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Protocol(e) => write!(f, "MQTT protocol error: {e}"),
            ClientError::Transport(e) => write!(f, "Transport error: {e}"),
            ClientError::ChannelClosed => write!(f, "Internal channel closed"),
            ClientError::NotConnected => write!(f, "Not connected"),
            ClientError::AlreadyConnected => write!(f, "Already connected"),
            ClientError::ConnectRejected(code) => {
                write!(f, "Broker rejected connection: {code:?}")
            }
            ClientError::ConnectTimeout => write!(f, "Timed out waiting for CONNACK"),
            ClientError::ResponseTimeout => {
                write!(f, "Timed out waiting for acknowledgment")
            }
            ClientError::ConnectionLost => write!(f, "Connection lost"),
            ClientError::PacketIdExhausted => {
                write!(f, "All packet identifiers are in use")
            }
            ClientError::ManualAckDisabled => {
                write!(f, "Manual acknowledgment is not enabled")
            }
            ClientError::NoPendingInboundPublish(id) => {
                write!(f, "No pending inbound publish for packet identifier {id}")
            }
            ClientError::AlreadyAcknowledged(id) => {
                write!(f, "Packet identifier {id} was already acknowledged")
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        ClientError::Protocol(e)
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Transport(e)
    }
}
