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

use bytes::Bytes;
use derive_builder::Builder;
use getset::{CopyGetters, Getters};

use crate::mqtt_client::packet::{DisconnectReasonCode, Will};

/// Connect Options - Configuration for one MQTT client session
///
/// An immutable configuration value passed to the client at construction.
/// Every negotiable limit here is a request; the broker's CONNACK properties
/// supersede it wherever the broker narrows a value.
///
/// # Usage
///
/// ```ignore
/// use mqtt_client_tokio::mqtt_client::ConnectOptions;
///
/// let options = ConnectOptions::builder()
///     .client_id("sensor-17")
///     .keep_alive(30u16)
///     .manual_ack(true)
///     .automatic_reconnect(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Builder, Getters, CopyGetters)]
#[builder(derive(Debug), pattern = "owned", setter(into))]
pub struct ConnectOptions {
    /// Client identifier sent in CONNECT
    ///
    /// An empty string asks the broker to assign one; the assigned value is
    /// reported back through the CONNACK properties.
    ///
    /// # Default
    /// "" (broker-assigned)
    #[builder(default)]
    #[getset(get = "pub")]
    client_id: String,

    /// Clean Start flag
    ///
    /// When set, the broker discards any session state held for this client
    /// identifier.
    ///
    /// # Default
    /// true
    #[builder(default = "true")]
    #[getset(get_copy = "pub")]
    clean_start: bool,

    /// Keep alive interval in seconds
    ///
    /// The client sends PINGREQ when no packet has been written for this
    /// long. A value of 0 disables keep alive.
    ///
    /// # Default
    /// 60
    #[builder(default = "60")]
    #[getset(get_copy = "pub")]
    keep_alive: u16,

    /// Session Expiry Interval in seconds, sent as a CONNECT property
    ///
    /// # Default
    /// 0 (session ends when the connection closes)
    #[builder(default = "0")]
    #[getset(get_copy = "pub")]
    session_expiry_interval: u32,

    /// Receive Maximum requested of the broker
    ///
    /// Caps how many unacknowledged QoS 1/2 publishes the broker may have
    /// in flight toward this client.
    ///
    /// # Default
    /// None (protocol default, 65535)
    #[builder(default, setter(into, strip_option))]
    #[getset(get_copy = "pub")]
    receive_maximum: Option<u16>,

    /// Maximum Packet Size this client accepts, sent as a CONNECT property
    ///
    /// Incoming packets larger than this are a protocol error.
    ///
    /// # Default
    /// None (no limit advertised)
    #[builder(default, setter(into, strip_option))]
    #[getset(get_copy = "pub")]
    maximum_packet_size: Option<u32>,

    /// Topic Alias Maximum this client accepts for inbound publishes
    ///
    /// # Default
    /// 0 (broker must not send aliases)
    #[builder(default = "0")]
    #[getset(get_copy = "pub")]
    topic_alias_maximum: u16,

    /// User name for broker authentication
    ///
    /// # Default
    /// None
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    username: Option<String>,

    /// Password for broker authentication
    ///
    /// # Default
    /// None
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    password: Option<Bytes>,

    /// Last will and testament published by the broker on unexpected
    /// disconnect
    ///
    /// # Default
    /// None
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    will: Option<Will>,

    /// Manual acknowledgment mode
    ///
    /// When enabled, received QoS 1/2 publishes are held until the
    /// application calls `acknowledge` with the message's packet
    /// identifier. When disabled, the client acknowledges on receipt.
    ///
    /// # Default
    /// false
    #[builder(default = "false")]
    #[getset(get_copy = "pub")]
    manual_ack: bool,

    /// Automatic reconnect
    ///
    /// When enabled, an unexpected connection loss schedules reconnection
    /// attempts with exponential backoff (5s doubling to a 60s cap),
    /// retrying until a connect succeeds. Subscriptions are not re-
    /// established automatically; resubscribe from the Connected event.
    ///
    /// # Default
    /// false
    #[builder(default = "false")]
    #[getset(get_copy = "pub")]
    automatic_reconnect: bool,

    /// Connection establishment timeout in milliseconds
    ///
    /// Maximum time from transport open to CONNACK reception. A value of 0
    /// disables the timeout.
    ///
    /// # Default
    /// 10000 (10 seconds)
    #[builder(default = "10_000")]
    #[getset(get_copy = "pub")]
    connect_timeout_ms: u64,

    /// Transactional response timeout in milliseconds
    ///
    /// Maximum time to wait for PUBACK/PUBCOMP/SUBACK/UNSUBACK after the
    /// request packet is written. A value of 0 disables the timeout.
    ///
    /// # Default
    /// 0 (disabled)
    #[builder(default = "0")]
    #[getset(get_copy = "pub")]
    response_timeout_ms: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Default ConnectOptions should be valid")
    }
}

impl ConnectOptions {
    /// Create a new builder for ConnectOptions
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::default()
    }
}

/// Disconnect Options - how a requested teardown is announced to the broker
#[derive(Debug, Clone, Default, Builder, CopyGetters)]
#[builder(derive(Debug), pattern = "owned", setter(into))]
pub struct DisconnectOptions {
    /// Reason code carried in the outgoing DISCONNECT
    ///
    /// `DisconnectWithWillMessage` asks the broker to publish the will
    /// despite the orderly teardown.
    ///
    /// # Default
    /// NormalDisconnection
    #[builder(default)]
    #[getset(get_copy = "pub")]
    reason_code: DisconnectReasonCode,
}

impl DisconnectOptions {
    /// Create a new builder for DisconnectOptions
    pub fn builder() -> DisconnectOptionsBuilder {
        DisconnectOptionsBuilder::default()
    }
}
