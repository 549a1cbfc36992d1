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

//! # MQTT Client Tokio
//!
//! An async MQTT v5.0 client engine for Rust with tokio.
//!
//! All protocol state is owned by one background task per client; the
//! [`mqtt_client::Client`] handle is cheap to clone and every operation is an
//! async call that resolves when the protocol says it is done (CONNACK for
//! connect, PUBACK/PUBCOMP for QoS 1/2 publishes, SUBACK/UNSUBACK for
//! subscription changes).
//!
//! ## Features
//!
//! - **MQTT v5.0**: properties, topic aliases, negotiated session limits
//! - **QoS 0/1/2**: full delivery state machines with exactly-once semantics
//! - **Manual acknowledgment**: application-driven PUBACK/PUBREC emission
//! - **Automatic reconnect**: exponential backoff supervisor, 5s doubling to 60s
//! - **Pluggable transports**: TCP built in, any byte stream via traits
//!
//! ## Quick Start
//!
//! ```ignore
//! use mqtt_client_tokio::mqtt_client::{
//!     Client, ConnectOptions, PublishMessage, Qos, SubscribeFilter, TcpConnector,
//! };
//!
//! let options = ConnectOptions::builder()
//!     .client_id("sensor-17")
//!     .build()?;
//! let (client, mut events) = Client::new(options);
//!
//! client.connect(TcpConnector::new("localhost:1883")).await?;
//! client
//!     .subscribe(vec![SubscribeFilter::new("orders/#", Qos::AtLeastOnce)])
//!     .await?;
//! client
//!     .publish(PublishMessage::new("orders/new", "payload").qos(Qos::AtLeastOnce))
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`mqtt_client::client`]: The client handle and its event loop task
//! - [`mqtt_client::packet`]: MQTT v5.0 packet types, codec, and properties
//! - [`mqtt_client::transport`]: Transport layer traits and the TCP implementation
//! - [`mqtt_client::options`]: Configuration for connection behavior
//! - [`mqtt_client::subscription`]: Topic filter matching and message routing
//! - [`mqtt_client::error`]: Protocol and client error taxonomy

pub mod mqtt_client;
