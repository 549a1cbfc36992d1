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

//! MQTT v5.0 client: connection lifecycle, packet dispatch, and the public
//! async API.
//!
//! All protocol state lives inside one spawned event loop task. The
//! [`Client`] handle sends [`Request`] values over an unbounded channel and
//! awaits a oneshot response per call; inflow, timers, and API requests are
//! multiplexed with `tokio::select!`, which is what serializes every table
//! mutation without a mutex.

use std::collections::{HashMap, VecDeque};
use std::io::IoSlice;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration};
use tracing::{debug, trace, warn};

use crate::mqtt_client::error::{ClientError, ProtocolError};
use crate::mqtt_client::event::{ClientEvent, ReceivedMessage};
use crate::mqtt_client::options::{ConnectOptions, DisconnectOptions};
use crate::mqtt_client::packet::{
    Connack, Connect, ConnectProperties, ConnectReasonCode, Disconnect, DisconnectProperties,
    DisconnectReasonCode, Packet, Publish, PublishProperties, Qos, Subscribe, SubscribeFilter,
    SubscribeReasonCode, Unsubscribe, UnsubAckReasonCode,
};
use crate::mqtt_client::packet_id::PacketIdAllocator;
use crate::mqtt_client::reconnect::ReconnectBackoff;
use crate::mqtt_client::request_response::Request;
use crate::mqtt_client::session::{
    InboundAck, InboundDeliveries, NegotiatedSession, OutboundAction, OutboundDeliveries,
    PublishOutcome,
};
use crate::mqtt_client::subscription::{
    validate_filter, validate_topic, SubscriptionRegistry,
};
use crate::mqtt_client::topic_alias::{InboundAliasTable, OutboundAliasTable, OutboundTopic};
use crate::mqtt_client::transport::{TransportConnector, TransportOps};

const READ_CHUNK_SIZE: usize = 4096;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// An application message to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
    pub properties: PublishProperties,
}

impl PublishMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        PublishMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: Qos::AtMostOnce,
            retain: false,
            properties: PublishProperties::default(),
        }
    }

    pub fn qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Outcome of a successful connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectResult {
    pub reason_code: ConnectReasonCode,
    pub session_present: bool,
    pub negotiated: NegotiatedSession,
}

/// Async MQTT v5.0 client handle.
///
/// Cheap to clone; all clones talk to the same session. Dropping every
/// clone ends the event loop task after the transport is shut down.
#[derive(Clone)]
pub struct Client {
    tx_send: mpsc::UnboundedSender<Request>,
}

impl Client {
    /// Create a client and its event channel.
    ///
    /// The event loop task starts immediately but nothing touches the
    /// network until [`connect`](Self::connect). Take the receiver before
    /// connecting so no early notification is missed.
    pub fn new(options: ConnectOptions) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx_send, rx_send) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(event_loop(options, rx_send, event_tx));
        (Self { tx_send }, event_rx)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, ClientError>>) -> Request,
    ) -> Result<T, ClientError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx_send
            .send(make(response_tx))
            .map_err(|_| ClientError::ChannelClosed)?;
        response_rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Open the transport via `connector`, send CONNECT, and await CONNACK.
    ///
    /// The connector is retained for the life of the session so the
    /// reconnect supervisor can redial.
    pub async fn connect(
        &self,
        connector: impl TransportConnector + 'static,
    ) -> Result<ConnectResult, ClientError> {
        self.request(|response_tx| Request::Connect {
            connector: Box::new(connector),
            response_tx,
        })
        .await
    }

    /// Orderly teardown: send DISCONNECT and close the transport.
    ///
    /// Idempotent with respect to concurrent callers; a second request
    /// issued while teardown is in flight observes the first's outcome.
    pub async fn disconnect(&self, options: DisconnectOptions) -> Result<(), ClientError> {
        self.request(|response_tx| Request::Disconnect {
            options,
            response_tx,
        })
        .await
    }

    /// Publish a message. QoS 0 resolves as soon as the bytes are written;
    /// QoS 1/2 resolve on the terminal acknowledgment.
    pub async fn publish(&self, message: PublishMessage) -> Result<PublishOutcome, ClientError> {
        self.request(|response_tx| Request::Publish {
            message,
            response_tx,
        })
        .await
    }

    /// Subscribe to topic filters, resolving on SUBACK with the per-filter
    /// reason codes in request order. Matching messages arrive on the
    /// client-wide event channel.
    pub async fn subscribe(
        &self,
        filters: Vec<SubscribeFilter>,
    ) -> Result<Vec<SubscribeReasonCode>, ClientError> {
        self.request(|response_tx| Request::Subscribe {
            filters,
            channel: None,
            response_tx,
        })
        .await
    }

    /// Like [`subscribe`](Self::subscribe), but matching messages are
    /// delivered to the returned receiver instead of the event channel.
    pub async fn subscribe_with_channel(
        &self,
        filters: Vec<SubscribeFilter>,
    ) -> Result<
        (
            Vec<SubscribeReasonCode>,
            mpsc::UnboundedReceiver<ReceivedMessage>,
        ),
        ClientError,
    > {
        let (tx, rx) = mpsc::unbounded_channel();
        let codes = self
            .request(|response_tx| Request::Subscribe {
                filters,
                channel: Some(tx),
                response_tx,
            })
            .await?;
        Ok((codes, rx))
    }

    /// Remove subscriptions, resolving on UNSUBACK with the per-filter
    /// reason codes in request order.
    pub async fn unsubscribe(
        &self,
        filters: Vec<String>,
    ) -> Result<Vec<UnsubAckReasonCode>, ClientError> {
        self.request(|response_tx| Request::Unsubscribe {
            filters,
            response_tx,
        })
        .await
    }

    /// Acknowledge a received QoS 1/2 publish in manual acknowledgment
    /// mode. `None` (a QoS 0 delivery) is always a successful no-op.
    ///
    /// Safe to call from any task; the pending-delivery table access is
    /// serialized by the event loop.
    pub async fn acknowledge(&self, packet_id: Option<u16>) -> Result<(), ClientError> {
        let Some(packet_id) = packet_id else {
            return Ok(());
        };
        self.request(|response_tx| Request::Acknowledge {
            packet_id,
            response_tx,
        })
        .await
    }
}

/// Lifecycle of one connection. A failed establishment has no state of its
/// own: a rejected CONNACK, a dial error, or a connect timeout all land back
/// in `Disconnected`, with the failure reported through the connect call's
/// error and a [`ClientEvent::ConnectFailed`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Timer expirations delivered back into the event loop by spawned sleep
/// tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    /// Keep-alive interval elapsed without outbound traffic.
    KeepAliveElapsed,
    /// No PINGRESP arrived for the outstanding PINGREQ.
    PingrespTimeout,
    /// No CONNACK arrived within the connect timeout.
    ConnectTimeout,
    /// No transactional response arrived for this packet identifier.
    ResponseTimeout(u16),
    /// Reconnect backoff delay elapsed.
    ReconnectDelayElapsed,
}

fn spawn_timer(
    timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    event: TimerEvent,
    delay: Duration,
) -> tokio::task::JoinHandle<()> {
    let tx = timer_tx.clone();
    tokio::spawn(async move {
        sleep(delay).await;
        let _ = tx.send(event);
    })
}

struct PendingSubscribe {
    filters: Vec<SubscribeFilter>,
    channel: Option<mpsc::UnboundedSender<ReceivedMessage>>,
    response_tx: oneshot::Sender<Result<Vec<SubscribeReasonCode>, ClientError>>,
}

struct PendingUnsubscribe {
    filters: Vec<String>,
    response_tx: oneshot::Sender<Result<Vec<UnsubAckReasonCode>, ClientError>>,
}

type QueuedPublish = (
    PublishMessage,
    oneshot::Sender<Result<PublishOutcome, ClientError>>,
);

/// Everything the event loop owns. Requests, timer expirations, and
/// transport reads are the only mutation paths.
struct LoopState {
    options: ConnectOptions,
    event_tx: mpsc::UnboundedSender<ClientEvent>,

    conn_state: ConnectionState,
    connector: Option<Box<dyn TransportConnector>>,
    negotiated: Option<NegotiatedSession>,

    packet_ids: PacketIdAllocator,
    outbound: OutboundDeliveries,
    inbound: InboundDeliveries,
    registry: SubscriptionRegistry,
    outbound_aliases: OutboundAliasTable,
    inbound_aliases: InboundAliasTable,
    backoff: ReconnectBackoff,

    pending_connect: Option<oneshot::Sender<Result<ConnectResult, ClientError>>>,
    pending_subscribes: HashMap<u16, PendingSubscribe>,
    pending_unsubscribes: HashMap<u16, PendingUnsubscribe>,
    pending_disconnects: Vec<oneshot::Sender<Result<(), ClientError>>>,
    /// Publishes held back because the broker's Receive Maximum window is
    /// full; drained as acknowledgments free slots.
    publish_queue: VecDeque<QueuedPublish>,

    read_buf: BytesMut,
    awaiting_pingresp: bool,
    /// Supervisor currently driving reconnect attempts.
    reconnecting: bool,

    keep_alive_timer: Option<tokio::task::JoinHandle<()>>,
    pingresp_timer: Option<tokio::task::JoinHandle<()>>,
    connect_timer: Option<tokio::task::JoinHandle<()>>,
    reconnect_timer: Option<tokio::task::JoinHandle<()>>,
    response_timers: HashMap<u16, tokio::task::JoinHandle<()>>,
}

type Transport = Option<Box<dyn TransportOps>>;

async fn event_loop(
    options: ConnectOptions,
    mut rx_send: mpsc::UnboundedReceiver<Request>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
) {
    let manual_ack = options.manual_ack();
    let inbound_alias_max = options.topic_alias_maximum();
    let mut state = LoopState {
        options,
        event_tx,
        conn_state: ConnectionState::Disconnected,
        connector: None,
        negotiated: None,
        packet_ids: PacketIdAllocator::new(),
        outbound: OutboundDeliveries::new(),
        inbound: InboundDeliveries::new(manual_ack),
        registry: SubscriptionRegistry::new(),
        outbound_aliases: OutboundAliasTable::new(0),
        inbound_aliases: InboundAliasTable::new(inbound_alias_max),
        backoff: ReconnectBackoff::new(),
        pending_connect: None,
        pending_subscribes: HashMap::new(),
        pending_unsubscribes: HashMap::new(),
        pending_disconnects: Vec::new(),
        publish_queue: VecDeque::new(),
        read_buf: BytesMut::new(),
        awaiting_pingresp: false,
        reconnecting: false,
        keep_alive_timer: None,
        pingresp_timer: None,
        connect_timer: None,
        reconnect_timer: None,
        response_timers: HashMap::new(),
    };

    let mut transport: Transport = None;
    let mut read_chunk = vec![0u8; READ_CHUNK_SIZE];
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel::<TimerEvent>();

    loop {
        tokio::select! {
            request = rx_send.recv() => {
                match request {
                    Some(request) => {
                        state.handle_request(request, &mut transport, &timer_tx).await;
                    }
                    None => {
                        // Every client handle dropped.
                        if let Some(ref mut t) = transport {
                            t.shutdown(SHUTDOWN_TIMEOUT).await;
                        }
                        break;
                    }
                }
            }
            Some(event) = timer_rx.recv() => {
                state.handle_timer(event, &mut transport, &timer_tx).await;
            }
            read_result = async {
                match transport {
                    Some(ref mut t) => t.recv(&mut read_chunk).await,
                    None => std::future::pending().await,
                }
            } => {
                match read_result {
                    Ok(n) if n > 0 => {
                        state.read_buf.extend_from_slice(&read_chunk[..n]);
                        state.drain_read_buffer(&mut transport, &timer_tx).await;
                    }
                    _ => {
                        debug!("transport closed or failed while reading");
                        state.connection_lost(&mut transport, &timer_tx).await;
                    }
                }
            }
        }
    }

    state.abort_timers();
}

impl LoopState {
    async fn handle_request(
        &mut self,
        request: Request,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        match request {
            Request::Connect {
                connector,
                response_tx,
            } => {
                if self.conn_state != ConnectionState::Disconnected || self.reconnecting {
                    let _ = response_tx.send(Err(ClientError::AlreadyConnected));
                    return;
                }
                self.connector = Some(connector);
                self.pending_connect = Some(response_tx);
                self.start_connect(transport, timer_tx).await;
            }
            Request::Disconnect {
                options,
                response_tx,
            } => {
                self.handle_disconnect(options, response_tx, transport, timer_tx)
                    .await;
            }
            Request::Publish {
                message,
                response_tx,
            } => {
                self.handle_publish(message, response_tx, transport, timer_tx)
                    .await;
            }
            Request::Subscribe {
                filters,
                channel,
                response_tx,
            } => {
                self.handle_subscribe(filters, channel, response_tx, transport, timer_tx)
                    .await;
            }
            Request::Unsubscribe {
                filters,
                response_tx,
            } => {
                self.handle_unsubscribe(filters, response_tx, transport, timer_tx)
                    .await;
            }
            Request::Acknowledge {
                packet_id,
                response_tx,
            } => {
                match self.inbound.acknowledge(packet_id) {
                    Ok(ack) => {
                        let result = self.send_inbound_ack(ack, transport, timer_tx).await;
                        let _ = response_tx.send(result);
                    }
                    Err(e) => {
                        let _ = response_tx.send(Err(e));
                    }
                }
            }
        }
    }

    async fn handle_disconnect(
        &mut self,
        options: DisconnectOptions,
        response_tx: oneshot::Sender<Result<(), ClientError>>,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        match self.conn_state {
            ConnectionState::Disconnected if !self.reconnecting => {
                let _ = response_tx.send(Err(ClientError::NotConnected));
                return;
            }
            ConnectionState::Disconnecting => {
                // A teardown is already in flight; this caller observes its
                // outcome.
                self.pending_disconnects.push(response_tx);
                return;
            }
            _ => {}
        }

        // Requested teardown cancels any supervisor activity.
        self.reconnecting = false;
        if let Some(handle) = self.reconnect_timer.take() {
            handle.abort();
        }
        self.conn_state = ConnectionState::Disconnecting;
        self.pending_disconnects.push(response_tx);

        if let Some(ref mut t) = transport {
            let disconnect = Disconnect {
                reason_code: options.reason_code(),
                properties: DisconnectProperties::default(),
            };
            let mut buf = BytesMut::new();
            if disconnect.encode(&mut buf).is_ok() {
                let _ = t.send(&[IoSlice::new(&buf)]).await;
            }
        }
        self.teardown(transport, timer_tx, || ClientError::ConnectionLost)
            .await;
        let _ = self.event_tx.send(ClientEvent::Disconnected);
        for tx in self.pending_disconnects.drain(..) {
            let _ = tx.send(Ok(()));
        }
    }

    async fn handle_publish(
        &mut self,
        mut message: PublishMessage,
        response_tx: oneshot::Sender<Result<PublishOutcome, ClientError>>,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        if self.conn_state != ConnectionState::Connected {
            let _ = response_tx.send(Err(ClientError::NotConnected));
            return;
        }
        if let Err(e) = validate_topic(&message.topic) {
            let _ = response_tx.send(Err(e.into()));
            return;
        }
        let Some(negotiated) = self.negotiated.as_ref() else {
            let _ = response_tx.send(Err(ClientError::NotConnected));
            return;
        };
        // Clamp to the broker's Maximum QoS rather than erroring; brokers
        // advertising a lower maximum expect exactly this downgrade.
        if message.qos > negotiated.maximum_qos {
            trace!(
                topic = %message.topic,
                requested = ?message.qos,
                granted = ?negotiated.maximum_qos,
                "clamping publish QoS to the negotiated maximum"
            );
            message.qos = negotiated.maximum_qos;
        }
        if message.retain && !negotiated.retain_available {
            let _ = response_tx.send(Err(ClientError::Protocol(
                ProtocolError::InvalidPropertyValue("retain is not supported by the broker"),
            )));
            return;
        }

        if message.qos == Qos::AtMostOnce {
            let result = self
                .send_publish(message, None, transport, timer_tx)
                .await
                .map(|_| PublishOutcome::Qos0);
            let _ = response_tx.send(result);
            return;
        }

        if self.send_window_vacancy() == 0 {
            // Window full: hold the publish until an acknowledgment frees a
            // slot.
            self.publish_queue.push_back((message, response_tx));
            return;
        }
        self.dispatch_qos_publish(message, response_tx, transport, timer_tx)
            .await;
    }

    /// Send one QoS 1/2 publish that has a free window slot.
    async fn dispatch_qos_publish(
        &mut self,
        message: PublishMessage,
        response_tx: oneshot::Sender<Result<PublishOutcome, ClientError>>,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        let Some(packet_id) = self.packet_ids.allocate() else {
            let _ = response_tx.send(Err(ClientError::PacketIdExhausted));
            return;
        };
        let qos = message.qos;
        match self
            .send_publish(message, Some(packet_id), transport, timer_tx)
            .await
        {
            Ok(()) => {
                self.outbound.insert(packet_id, qos, response_tx);
                self.arm_response_timer(packet_id, timer_tx);
            }
            Err(e) => {
                self.packet_ids.release(packet_id);
                let _ = response_tx.send(Err(e));
            }
        }
    }

    async fn send_publish(
        &mut self,
        message: PublishMessage,
        packet_id: Option<u16>,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) -> Result<(), ClientError> {
        let mut properties = message.properties;
        let topic = match self.outbound_aliases.resolve(&message.topic) {
            OutboundTopic::Plain => {
                properties.topic_alias = None;
                message.topic
            }
            OutboundTopic::Assign(alias) => {
                properties.topic_alias = Some(alias);
                message.topic
            }
            OutboundTopic::Existing(alias) => {
                properties.topic_alias = Some(alias);
                String::new()
            }
        };
        let publish = Publish {
            topic,
            payload: message.payload,
            qos: message.qos,
            retain: message.retain,
            dup: false,
            packet_id,
            properties,
        };
        self.send_packet(&Packet::Publish(publish), transport, timer_tx)
            .await
    }

    async fn handle_subscribe(
        &mut self,
        filters: Vec<SubscribeFilter>,
        channel: Option<mpsc::UnboundedSender<ReceivedMessage>>,
        response_tx: oneshot::Sender<Result<Vec<SubscribeReasonCode>, ClientError>>,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        if self.conn_state != ConnectionState::Connected {
            let _ = response_tx.send(Err(ClientError::NotConnected));
            return;
        }
        if filters.is_empty() {
            let _ = response_tx.send(Err(ClientError::Protocol(
                ProtocolError::InvalidTopicFilter(String::new()),
            )));
            return;
        }
        for entry in &filters {
            if let Err(e) = validate_filter(&entry.filter) {
                let _ = response_tx.send(Err(e.into()));
                return;
            }
        }
        let Some(packet_id) = self.packet_ids.allocate() else {
            let _ = response_tx.send(Err(ClientError::PacketIdExhausted));
            return;
        };
        let subscribe = Subscribe {
            packet_id,
            filters: filters.clone(),
            properties: Default::default(),
        };
        match self
            .send_packet(&Packet::Subscribe(subscribe), transport, timer_tx)
            .await
        {
            Ok(()) => {
                self.pending_subscribes.insert(
                    packet_id,
                    PendingSubscribe {
                        filters,
                        channel,
                        response_tx,
                    },
                );
                self.arm_response_timer(packet_id, timer_tx);
            }
            Err(e) => {
                self.packet_ids.release(packet_id);
                let _ = response_tx.send(Err(e));
            }
        }
    }

    async fn handle_unsubscribe(
        &mut self,
        filters: Vec<String>,
        response_tx: oneshot::Sender<Result<Vec<UnsubAckReasonCode>, ClientError>>,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        if self.conn_state != ConnectionState::Connected {
            let _ = response_tx.send(Err(ClientError::NotConnected));
            return;
        }
        if filters.is_empty() {
            let _ = response_tx.send(Err(ClientError::Protocol(
                ProtocolError::InvalidTopicFilter(String::new()),
            )));
            return;
        }
        let Some(packet_id) = self.packet_ids.allocate() else {
            let _ = response_tx.send(Err(ClientError::PacketIdExhausted));
            return;
        };
        let unsubscribe = Unsubscribe {
            packet_id,
            filters: filters.clone(),
            properties: Default::default(),
        };
        match self
            .send_packet(&Packet::Unsubscribe(unsubscribe), transport, timer_tx)
            .await
        {
            Ok(()) => {
                self.pending_unsubscribes.insert(
                    packet_id,
                    PendingUnsubscribe {
                        filters,
                        response_tx,
                    },
                );
                self.arm_response_timer(packet_id, timer_tx);
            }
            Err(e) => {
                self.packet_ids.release(packet_id);
                let _ = response_tx.send(Err(e));
            }
        }
    }

    async fn handle_timer(
        &mut self,
        event: TimerEvent,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        match event {
            TimerEvent::KeepAliveElapsed => {
                self.keep_alive_timer = None;
                if self.conn_state != ConnectionState::Connected {
                    return;
                }
                if self
                    .send_packet(&Packet::Pingreq, transport, timer_tx)
                    .await
                    .is_ok()
                    && !self.awaiting_pingresp
                {
                    self.awaiting_pingresp = true;
                    let keep_alive = self.keep_alive_interval();
                    if let Some(interval) = keep_alive {
                        self.pingresp_timer = Some(spawn_timer(
                            timer_tx,
                            TimerEvent::PingrespTimeout,
                            interval,
                        ));
                    }
                }
            }
            TimerEvent::PingrespTimeout => {
                self.pingresp_timer = None;
                if self.awaiting_pingresp {
                    warn!("no PINGRESP within the keep-alive interval, dropping connection");
                    self.connection_lost(transport, timer_tx).await;
                }
            }
            TimerEvent::ConnectTimeout => {
                self.connect_timer = None;
                if self.conn_state != ConnectionState::Connecting {
                    return;
                }
                debug!("CONNACK did not arrive within the connect timeout");
                if let Some(tx) = self.pending_connect.take() {
                    let _ = tx.send(Err(ClientError::ConnectTimeout));
                }
                self.teardown(transport, timer_tx, || ClientError::ConnectTimeout)
                    .await;
                if self.reconnecting {
                    self.schedule_reconnect(timer_tx);
                }
            }
            TimerEvent::ResponseTimeout(packet_id) => {
                self.response_timers.remove(&packet_id);
                if let Some(responder) = self.outbound.cancel(packet_id) {
                    self.packet_ids.release(packet_id);
                    let _ = responder.send(Err(ClientError::ResponseTimeout));
                    return;
                }
                if let Some(pending) = self.pending_subscribes.remove(&packet_id) {
                    self.packet_ids.release(packet_id);
                    let _ = pending.response_tx.send(Err(ClientError::ResponseTimeout));
                    return;
                }
                if let Some(pending) = self.pending_unsubscribes.remove(&packet_id) {
                    self.packet_ids.release(packet_id);
                    let _ = pending.response_tx.send(Err(ClientError::ResponseTimeout));
                }
            }
            TimerEvent::ReconnectDelayElapsed => {
                self.reconnect_timer = None;
                if self.reconnecting && self.conn_state == ConnectionState::Disconnected {
                    self.start_connect(transport, timer_tx).await;
                }
            }
        }
    }

    /// Decode and dispatch every complete packet in the accumulation
    /// buffer. Incomplete trailing bytes stay for the next read.
    async fn drain_read_buffer(
        &mut self,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        let max_size = self
            .options
            .maximum_packet_size()
            .map(|v| v as usize)
            .unwrap_or(usize::MAX);
        loop {
            match Packet::decode(&mut self.read_buf, max_size) {
                Ok(Some(packet)) => {
                    trace!(packet = packet.type_name(), "received");
                    self.dispatch_packet(packet, transport, timer_tx).await;
                    if transport.is_none() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    // The byte stream can no longer be trusted.
                    warn!(error = %e, "protocol violation in received bytes, closing connection");
                    if let Some(ref mut t) = transport {
                        let disconnect = Disconnect {
                            reason_code: DisconnectReasonCode::ProtocolError,
                            properties: DisconnectProperties::default(),
                        };
                        let mut buf = BytesMut::new();
                        if disconnect.encode(&mut buf).is_ok() {
                            let _ = t.send(&[IoSlice::new(&buf)]).await;
                        }
                    }
                    self.teardown(transport, timer_tx, || ClientError::ConnectionLost)
                        .await;
                    let _ = self.event_tx.send(ClientEvent::ConnectionLost);
                    return;
                }
            }
        }
    }

    async fn dispatch_packet(
        &mut self,
        packet: Packet,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        match packet {
            Packet::Connack(connack) => {
                self.handle_connack(connack, transport, timer_tx).await;
            }
            Packet::Publish(publish) => {
                self.handle_inbound_publish(publish, transport, timer_tx)
                    .await;
            }
            Packet::Puback(ack) => {
                match self.outbound.on_puback(&ack) {
                    Ok(OutboundAction::Release(id)) => self.complete_delivery(id),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "ignoring unsolicited PUBACK"),
                }
                self.drain_publish_queue(transport, timer_tx).await;
            }
            Packet::Pubrec(rec) => match self.outbound.on_pubrec(&rec) {
                Ok(OutboundAction::SendPubrel(id)) => {
                    let pubrel = crate::mqtt_client::packet::Pubrel::new(id);
                    let _ = self
                        .send_packet(&Packet::Pubrel(pubrel), transport, timer_tx)
                        .await;
                }
                Ok(OutboundAction::Release(id)) => {
                    self.complete_delivery(id);
                    self.drain_publish_queue(transport, timer_tx).await;
                }
                Ok(OutboundAction::Ignore) => {}
                Err(e) => warn!(error = %e, "ignoring unsolicited PUBREC"),
            },
            Packet::Pubcomp(comp) => {
                match self.outbound.on_pubcomp(&comp) {
                    Ok(OutboundAction::Release(id)) => self.complete_delivery(id),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "ignoring unsolicited PUBCOMP"),
                }
                self.drain_publish_queue(transport, timer_tx).await;
            }
            Packet::Pubrel(rel) => {
                let ack = self.inbound.on_pubrel(rel.packet_id);
                let _ = self.send_inbound_ack(ack, transport, timer_tx).await;
            }
            Packet::Suback(suback) => {
                let Some(pending) = self.pending_subscribes.remove(&suback.packet_id) else {
                    warn!(packet_id = suback.packet_id, "ignoring unsolicited SUBACK");
                    return;
                };
                self.complete_delivery(suback.packet_id);
                for (entry, code) in pending.filters.iter().zip(&suback.reason_codes) {
                    if code.is_success() {
                        self.registry
                            .insert(entry.clone(), *code, pending.channel.clone());
                    }
                }
                let _ = pending.response_tx.send(Ok(suback.reason_codes));
            }
            Packet::Unsuback(unsuback) => {
                let Some(pending) = self.pending_unsubscribes.remove(&unsuback.packet_id) else {
                    warn!(packet_id = unsuback.packet_id, "ignoring unsolicited UNSUBACK");
                    return;
                };
                self.complete_delivery(unsuback.packet_id);
                for (filter, code) in pending.filters.iter().zip(&unsuback.reason_codes) {
                    if code.is_success() {
                        self.registry.remove(filter);
                    }
                }
                let _ = pending.response_tx.send(Ok(unsuback.reason_codes));
            }
            Packet::Pingresp => {
                self.awaiting_pingresp = false;
                if let Some(handle) = self.pingresp_timer.take() {
                    handle.abort();
                }
            }
            Packet::Disconnect(disconnect) => {
                debug!(reason = ?disconnect.reason_code, "broker sent DISCONNECT");
                let _ = self.event_tx.send(ClientEvent::BrokerDisconnected {
                    reason_code: disconnect.reason_code,
                });
                self.connection_lost(transport, timer_tx).await;
            }
            // Broker-only packets; a broker never sends these to a client.
            Packet::Connect(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::Pingreq => {
                warn!(
                    packet = packet.type_name(),
                    "received a client-to-server packet, closing connection"
                );
                self.teardown(transport, timer_tx, || ClientError::ConnectionLost)
                    .await;
                let _ = self.event_tx.send(ClientEvent::ConnectionLost);
            }
        }
    }

    async fn handle_connack(
        &mut self,
        connack: Connack,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        if self.conn_state != ConnectionState::Connecting {
            warn!("ignoring CONNACK outside of connection establishment");
            return;
        }
        if let Some(handle) = self.connect_timer.take() {
            handle.abort();
        }

        if !connack.reason_code.is_success() {
            debug!(reason = ?connack.reason_code, "broker rejected CONNECT");
            if let Some(tx) = self.pending_connect.take() {
                let _ = tx.send(Err(ClientError::ConnectRejected(connack.reason_code)));
            }
            let _ = self.event_tx.send(ClientEvent::ConnectFailed {
                reason_code: connack.reason_code,
            });
            self.teardown(transport, timer_tx, || ClientError::ConnectionLost)
                .await;
            if self.reconnecting {
                self.schedule_reconnect(timer_tx);
            }
            return;
        }

        let negotiated = NegotiatedSession::from_connack(
            self.options.client_id(),
            self.options.keep_alive(),
            self.options.session_expiry_interval(),
            &connack,
        );
        debug!(
            client_id = %negotiated.client_id,
            session_present = negotiated.session_present,
            "session established"
        );
        self.outbound_aliases = OutboundAliasTable::new(negotiated.send_topic_alias_maximum);
        self.inbound_aliases = InboundAliasTable::new(self.options.topic_alias_maximum());
        self.conn_state = ConnectionState::Connected;
        self.backoff.reset();
        self.reconnecting = false;
        self.arm_keep_alive_timer(timer_tx);

        let result = ConnectResult {
            reason_code: connack.reason_code,
            session_present: connack.session_present,
            negotiated: negotiated.clone(),
        };
        self.negotiated = Some(negotiated);
        if let Some(tx) = self.pending_connect.take() {
            let _ = tx.send(Ok(result));
        }
        let _ = self.event_tx.send(ClientEvent::Connected {
            session_present: connack.session_present,
        });
        self.drain_publish_queue(transport, timer_tx).await;
    }

    async fn handle_inbound_publish(
        &mut self,
        publish: Publish,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        // Resolve the topic alias before anything else; an invalid alias is
        // a stream-fatal violation.
        let topic = match publish.properties.topic_alias {
            Some(alias) if publish.topic.is_empty() => {
                match self.inbound_aliases.lookup(alias) {
                    Ok(topic) => topic.to_owned(),
                    Err(e) => {
                        warn!(error = %e, "closing connection");
                        self.teardown(transport, timer_tx, || ClientError::ConnectionLost)
                            .await;
                        let _ = self.event_tx.send(ClientEvent::ConnectionLost);
                        return;
                    }
                }
            }
            Some(alias) => {
                if let Err(e) = self.inbound_aliases.record(alias, &publish.topic) {
                    warn!(error = %e, "closing connection");
                    self.teardown(transport, timer_tx, || ClientError::ConnectionLost)
                        .await;
                    let _ = self.event_tx.send(ClientEvent::ConnectionLost);
                    return;
                }
                publish.topic.clone()
            }
            None => publish.topic.clone(),
        };

        if let Some(packet_id) = publish.packet_id {
            let ack = self.inbound.on_publish(packet_id, publish.qos);
            if self.send_inbound_ack(ack, transport, timer_tx).await.is_err() {
                return;
            }
        }

        let message = ReceivedMessage {
            topic: topic.clone(),
            payload: publish.payload,
            qos: publish.qos,
            retain: publish.retain,
            packet_id: publish.packet_id,
            properties: publish.properties,
        };
        let outcome = self.registry.route(&topic);
        trace!(topic = %topic, matched = outcome.matched, "routing inbound publish");
        for channel in &outcome.channels {
            let _ = channel.send(message.clone());
        }
        // Dedicated channels are an additional delivery path; the client-wide
        // event channel sees every inbound message.
        let _ = self.event_tx.send(ClientEvent::Message(message));
    }

    async fn send_inbound_ack(
        &mut self,
        ack: InboundAck,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) -> Result<(), ClientError> {
        let packet = match ack {
            InboundAck::SendPuback(p) => Packet::Puback(p),
            InboundAck::SendPubrec(p) => Packet::Pubrec(p),
            InboundAck::SendPubcomp(p) => Packet::Pubcomp(p),
            InboundAck::Nothing => return Ok(()),
        };
        self.send_packet(&packet, transport, timer_tx).await
    }

    /// Open a fresh transport via the retained connector and send CONNECT.
    async fn start_connect(
        &mut self,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        let Some(connector) = self.connector.as_ref() else {
            if let Some(tx) = self.pending_connect.take() {
                let _ = tx.send(Err(ClientError::NotConnected));
            }
            return;
        };
        self.conn_state = ConnectionState::Connecting;
        match connector.connect().await {
            Ok(t) => {
                *transport = Some(t);
            }
            Err(e) => {
                debug!(error = %e, "transport open failed");
                self.conn_state = ConnectionState::Disconnected;
                if let Some(tx) = self.pending_connect.take() {
                    let _ = tx.send(Err(ClientError::Transport(e)));
                } else if self.reconnecting {
                    self.schedule_reconnect(timer_tx);
                }
                return;
            }
        }

        let connect = self.build_connect();
        // A failed write runs the full connection-lost path, which resolves
        // the pending connect and reschedules when the supervisor is active.
        if self
            .send_packet(&Packet::Connect(connect), transport, timer_tx)
            .await
            .is_err()
        {
            return;
        }
        let timeout_ms = self.options.connect_timeout_ms();
        if timeout_ms > 0 {
            self.connect_timer = Some(spawn_timer(
                timer_tx,
                TimerEvent::ConnectTimeout,
                Duration::from_millis(timeout_ms),
            ));
        }
    }

    fn build_connect(&self) -> Connect {
        let options = &self.options;
        Connect {
            client_id: options.client_id().clone(),
            clean_start: options.clean_start(),
            keep_alive: options.keep_alive(),
            username: options.username().clone(),
            password: options.password().clone(),
            will: options.will().clone(),
            properties: ConnectProperties {
                session_expiry_interval: (options.session_expiry_interval() != 0)
                    .then(|| options.session_expiry_interval()),
                receive_maximum: options.receive_maximum(),
                maximum_packet_size: options.maximum_packet_size(),
                topic_alias_maximum: (options.topic_alias_maximum() != 0)
                    .then(|| options.topic_alias_maximum()),
                ..Default::default()
            },
        }
    }

    /// Serialize and write one packet; any write failure tears the
    /// connection down. Writing restarts the keep-alive timer.
    async fn send_packet(
        &mut self,
        packet: &Packet,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) -> Result<(), ClientError> {
        let Some(t) = transport.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        let mut buf = BytesMut::new();
        packet.encode(&mut buf)?;
        if let Some(negotiated) = &self.negotiated {
            if buf.len() > negotiated.send_maximum_packet_size {
                return Err(ClientError::Protocol(ProtocolError::PacketTooLarge {
                    size: buf.len(),
                    max: negotiated.send_maximum_packet_size,
                }));
            }
        }
        trace!(packet = packet.type_name(), bytes = buf.len(), "sending");
        match t.send(&[IoSlice::new(&buf)]).await {
            Ok(()) => {
                if self.conn_state == ConnectionState::Connected {
                    self.arm_keep_alive_timer(timer_tx);
                }
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "transport write failed");
                self.connection_lost(transport, timer_tx).await;
                Err(ClientError::Transport(e))
            }
        }
    }

    fn keep_alive_interval(&self) -> Option<Duration> {
        let seconds = self
            .negotiated
            .as_ref()
            .map(|n| n.keep_alive)
            .unwrap_or_else(|| self.options.keep_alive());
        (seconds > 0).then(|| Duration::from_secs(u64::from(seconds)))
    }

    fn arm_keep_alive_timer(&mut self, timer_tx: &mpsc::UnboundedSender<TimerEvent>) {
        if let Some(handle) = self.keep_alive_timer.take() {
            handle.abort();
        }
        if let Some(interval) = self.keep_alive_interval() {
            self.keep_alive_timer =
                Some(spawn_timer(timer_tx, TimerEvent::KeepAliveElapsed, interval));
        }
    }

    fn arm_response_timer(&mut self, packet_id: u16, timer_tx: &mpsc::UnboundedSender<TimerEvent>) {
        let timeout_ms = self.options.response_timeout_ms();
        if timeout_ms == 0 {
            return;
        }
        self.response_timers.insert(
            packet_id,
            spawn_timer(
                timer_tx,
                TimerEvent::ResponseTimeout(packet_id),
                Duration::from_millis(timeout_ms),
            ),
        );
    }

    /// Terminal acknowledgment processed for `packet_id`: release the
    /// identifier and its response timer.
    fn complete_delivery(&mut self, packet_id: u16) {
        self.packet_ids.release(packet_id);
        if let Some(handle) = self.response_timers.remove(&packet_id) {
            handle.abort();
        }
    }

    fn send_window_vacancy(&self) -> usize {
        let maximum = self
            .negotiated
            .as_ref()
            .map(|n| n.send_receive_maximum as usize)
            .unwrap_or(usize::MAX);
        maximum.saturating_sub(self.outbound.in_flight())
    }

    /// Send publishes that were held back while the Receive Maximum window
    /// was full.
    async fn drain_publish_queue(
        &mut self,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        while self.send_window_vacancy() > 0 {
            let Some((message, response_tx)) = self.publish_queue.pop_front() else {
                return;
            };
            self.dispatch_qos_publish(message, response_tx, transport, timer_tx)
                .await;
            if self.conn_state != ConnectionState::Connected {
                return;
            }
        }
    }

    /// Unexpected connection loss: tear down and, when enabled, hand over
    /// to the reconnect supervisor.
    async fn connection_lost(
        &mut self,
        transport: &mut Transport,
        timer_tx: &mpsc::UnboundedSender<TimerEvent>,
    ) {
        let was_connecting = self.conn_state == ConnectionState::Connecting;
        if let Some(tx) = self.pending_connect.take() {
            let _ = tx.send(Err(ClientError::ConnectionLost));
        }
        self.teardown(transport, timer_tx, || ClientError::ConnectionLost)
            .await;
        let _ = self.event_tx.send(ClientEvent::ConnectionLost);

        if self.options.automatic_reconnect() && (self.reconnecting || !was_connecting) {
            self.reconnecting = true;
            self.schedule_reconnect(timer_tx);
        }
    }

    fn schedule_reconnect(&mut self, timer_tx: &mpsc::UnboundedSender<TimerEvent>) {
        let delay = self.backoff.next_delay();
        let attempt = self.backoff.attempts();
        debug!(attempt, ?delay, "scheduling reconnect");
        let _ = self
            .event_tx
            .send(ClientEvent::Reconnecting { attempt, delay });
        self.reconnect_timer = Some(spawn_timer(
            timer_tx,
            TimerEvent::ReconnectDelayElapsed,
            delay,
        ));
    }

    /// Close the transport and fail every in-flight operation. Connection-
    /// scoped state (aliases, inbound deliveries, identifiers) is dropped;
    /// the subscription registry survives only when the broker may have
    /// kept the session.
    async fn teardown(
        &mut self,
        transport: &mut Transport,
        _timer_tx: &mpsc::UnboundedSender<TimerEvent>,
        make_error: impl Fn() -> ClientError,
    ) {
        if let Some(handle) = self.keep_alive_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.pingresp_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.connect_timer.take() {
            handle.abort();
        }
        for (_, handle) in self.response_timers.drain() {
            handle.abort();
        }
        self.awaiting_pingresp = false;

        self.outbound.fail_all(&make_error);
        for (_, pending) in self.pending_subscribes.drain() {
            let _ = pending.response_tx.send(Err(make_error()));
        }
        for (_, pending) in self.pending_unsubscribes.drain() {
            let _ = pending.response_tx.send(Err(make_error()));
        }
        for (_, response_tx) in self.publish_queue.drain(..) {
            let _ = response_tx.send(Err(make_error()));
        }

        self.inbound.clear();
        self.inbound_aliases.clear();
        self.outbound_aliases.clear();
        self.packet_ids.clear();
        if self.options.clean_start() {
            self.registry.clear();
        }
        self.negotiated = None;
        self.read_buf.clear();

        if let Some(ref mut t) = transport {
            t.shutdown(SHUTDOWN_TIMEOUT).await;
        }
        *transport = None;
        self.conn_state = ConnectionState::Disconnected;
    }

    fn abort_timers(&mut self) {
        if let Some(handle) = self.keep_alive_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.pingresp_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.connect_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.reconnect_timer.take() {
            handle.abort();
        }
        for (_, handle) in self.response_timers.drain() {
            handle.abort();
        }
    }
}
