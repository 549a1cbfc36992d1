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

use tokio::sync::{mpsc, oneshot};

use crate::mqtt_client::client::{ConnectResult, PublishMessage};
use crate::mqtt_client::error::ClientError;
use crate::mqtt_client::event::ReceivedMessage;
use crate::mqtt_client::options::DisconnectOptions;
use crate::mqtt_client::packet::{SubscribeFilter, SubscribeReasonCode, UnsubAckReasonCode};
use crate::mqtt_client::session::PublishOutcome;
use crate::mqtt_client::transport::TransportConnector;

/// Commands carried from the public API into the event loop task, each with
/// its own response channel.
pub(crate) enum Request {
    Connect {
        connector: Box<dyn TransportConnector>,
        response_tx: oneshot::Sender<Result<ConnectResult, ClientError>>,
    },
    Disconnect {
        options: DisconnectOptions,
        response_tx: oneshot::Sender<Result<(), ClientError>>,
    },
    Publish {
        message: PublishMessage,
        response_tx: oneshot::Sender<Result<PublishOutcome, ClientError>>,
    },
    Subscribe {
        filters: Vec<SubscribeFilter>,
        /// Dedicated delivery channel shared by all filters of this call.
        channel: Option<mpsc::UnboundedSender<ReceivedMessage>>,
        response_tx: oneshot::Sender<Result<Vec<SubscribeReasonCode>, ClientError>>,
    },
    Unsubscribe {
        filters: Vec<String>,
        response_tx: oneshot::Sender<Result<Vec<UnsubAckReasonCode>, ClientError>>,
    },
    Acknowledge {
        packet_id: u16,
        response_tx: oneshot::Sender<Result<(), ClientError>>,
    },
}
