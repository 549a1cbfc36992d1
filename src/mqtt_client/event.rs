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

//! Typed events delivered to the application over the client's event
//! channel. Consumers should take the receiver before connecting so no
//! early notification (retained messages, for example) is dropped.

use std::time::Duration;

use bytes::Bytes;

use crate::mqtt_client::packet::{
    ConnectReasonCode, DisconnectReasonCode, PublishProperties, Qos,
};

/// An inbound application message, routed from a PUBLISH.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
    /// `None` for QoS 0 deliveries. In manual acknowledgment mode this is
    /// the handle to pass to `acknowledge`.
    pub packet_id: Option<u16>,
    /// Properties as received, including any broker-attached Subscription
    /// Identifiers, with the topic alias already resolved.
    pub properties: PublishProperties,
}

/// Connection lifecycle and delivery notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// CONNACK accepted, session established. Carries whether the broker
    /// resumed a previous session.
    Connected { session_present: bool },
    /// The broker refused the connection.
    ConnectFailed { reason_code: ConnectReasonCode },
    /// An inbound application message. Every received PUBLISH surfaces
    /// here; subscriptions with a dedicated channel receive their matches
    /// there in addition.
    Message(ReceivedMessage),
    /// The broker closed the session with DISCONNECT.
    BrokerDisconnected { reason_code: DisconnectReasonCode },
    /// The transport failed or closed unexpectedly.
    ConnectionLost,
    /// The reconnect supervisor scheduled another attempt.
    Reconnecting { attempt: u32, delay: Duration },
    /// Teardown requested by the application completed.
    Disconnected,
}
