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

pub mod client;
pub mod error;
pub mod event;
pub mod options;
pub mod packet;
pub mod packet_id;
pub mod reconnect;
mod request_response;
pub mod session;
pub mod subscription;
pub mod topic_alias;
pub mod transport;

pub use client::{Client, ConnectResult, PublishMessage};
pub use error::{ClientError, ProtocolError};
pub use event::{ClientEvent, ReceivedMessage};
pub use options::{ConnectOptions, DisconnectOptions};
pub use packet::{
    DisconnectReasonCode, Qos, RetainHandling, SubscribeFilter, SubscribeReasonCode,
    UnsubAckReasonCode, Will,
};
pub use session::{NegotiatedSession, PublishOutcome};
pub use transport::{TcpConnector, TransportConnector, TransportError, TransportOps};
