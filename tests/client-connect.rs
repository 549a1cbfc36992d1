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

mod common;

use std::time::Duration;
use tokio::time::timeout;

use mqtt_client_tokio::mqtt_client::packet::{
    Connack, ConnackProperties, ConnectReasonCode, Disconnect, DisconnectReasonCode, Packet,
};
use mqtt_client_tokio::mqtt_client::{
    Client, ClientError, ClientEvent, ConnectOptions, DisconnectOptions, PublishMessage, Qos,
};

use stub_transport::{establish, establish_with, StubConnector};

fn options() -> ConnectOptions {
    ConnectOptions::builder()
        .client_id("test-client")
        .keep_alive(0u16)
        .build()
        .unwrap()
}

#[tokio::test]
async fn connect_sends_options_and_resolves_on_connack() {
    common::init_tracing();

    let (connector, mut links_rx) = StubConnector::new();
    let (client, mut events) = Client::new(
        ConnectOptions::builder()
            .client_id("test-client")
            .clean_start(false)
            .keep_alive(0u16)
            .session_expiry_interval(120u32)
            .receive_maximum(16u16)
            .build()
            .unwrap(),
    );

    let (result, _broker) = tokio::join!(client.connect(connector), async move {
        let mut broker = links_rx.recv().await.expect("client never dialed");
        let Packet::Connect(connect) = broker.recv_packet().await else {
            panic!("first packet must be CONNECT");
        };
        assert_eq!(connect.client_id, "test-client");
        assert!(!connect.clean_start);
        assert_eq!(connect.keep_alive, 0);
        assert_eq!(connect.properties.session_expiry_interval, Some(120));
        assert_eq!(connect.properties.receive_maximum, Some(16));

        broker.send_packet(&Packet::Connack(Connack {
            session_present: true,
            reason_code: ConnectReasonCode::Success,
            properties: ConnackProperties::default(),
        }));
        broker
    });

    let result = result.expect("connect should succeed");
    assert_eq!(result.reason_code, ConnectReasonCode::Success);
    assert!(result.session_present);

    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(
        event,
        Some(ClientEvent::Connected {
            session_present: true
        })
    );
}

#[tokio::test]
async fn connack_limits_supersede_requested() {
    common::init_tracing();

    let (_client, _events, _broker, result) = establish_with(
        options(),
        Connack {
            session_present: false,
            reason_code: ConnectReasonCode::Success,
            properties: ConnackProperties {
                assigned_client_identifier: Some("assigned-9".into()),
                receive_maximum: Some(5),
                maximum_qos: Some(1),
                server_keep_alive: Some(30),
                topic_alias_maximum: Some(4),
                ..Default::default()
            },
        },
    )
    .await;

    let negotiated = result.expect("connect should succeed").negotiated;
    assert_eq!(negotiated.client_id, "assigned-9");
    assert_eq!(negotiated.send_receive_maximum, 5);
    assert_eq!(negotiated.maximum_qos, Qos::AtLeastOnce);
    assert_eq!(negotiated.keep_alive, 30);
    assert_eq!(negotiated.send_topic_alias_maximum, 4);
}

#[tokio::test]
async fn rejected_connack_fails_the_connect_call() {
    common::init_tracing();

    let (_client, mut events, _broker, result) = establish_with(
        options(),
        Connack {
            session_present: false,
            reason_code: ConnectReasonCode::NotAuthorized,
            properties: ConnackProperties::default(),
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(ClientError::ConnectRejected(ConnectReasonCode::NotAuthorized))
    ));
    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(
        event,
        Some(ClientEvent::ConnectFailed {
            reason_code: ConnectReasonCode::NotAuthorized
        })
    );
}

#[tokio::test(start_paused = true)]
async fn missing_connack_times_out() {
    common::init_tracing();

    let (connector, mut links_rx) = StubConnector::new();
    let (client, _events) = Client::new(
        ConnectOptions::builder()
            .keep_alive(0u16)
            .connect_timeout_ms(200u64)
            .build()
            .unwrap(),
    );

    let (result, _broker) = tokio::join!(client.connect(connector), async move {
        let mut broker = links_rx.recv().await.expect("client never dialed");
        // Swallow the CONNECT, never answer.
        let _ = broker.recv_packet().await;
        broker
    });

    assert!(matches!(result, Err(ClientError::ConnectTimeout)));
}

#[tokio::test]
async fn second_connect_is_rejected_while_connected() {
    common::init_tracing();

    let (client, _events, _broker) = establish(options()).await;

    let (second_connector, _links) = StubConnector::new();
    let result = client.connect(second_connector).await;
    assert!(matches!(result, Err(ClientError::AlreadyConnected)));
}

#[tokio::test]
async fn operations_require_a_session() {
    common::init_tracing();

    let (client, _events) = Client::new(options());

    let publish = client
        .publish(PublishMessage::new("a/b", "x"))
        .await;
    assert!(matches!(publish, Err(ClientError::NotConnected)));

    let unsubscribe = client.unsubscribe(vec!["a/b".into()]).await;
    assert!(matches!(unsubscribe, Err(ClientError::NotConnected)));

    let disconnect = client.disconnect(DisconnectOptions::default()).await;
    assert!(matches!(disconnect, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn requested_disconnect_sends_packet_and_notifies() {
    common::init_tracing();

    let (client, mut events, mut broker) = establish(options()).await;
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Connected {
            session_present: false
        })
    );

    client
        .disconnect(
            DisconnectOptions::builder()
                .reason_code(DisconnectReasonCode::DisconnectWithWillMessage)
                .build()
                .unwrap(),
        )
        .await
        .expect("disconnect should succeed");

    let Packet::Disconnect(disconnect) = broker.recv_packet().await else {
        panic!("expected DISCONNECT on the wire");
    };
    assert_eq!(
        disconnect.reason_code,
        DisconnectReasonCode::DisconnectWithWillMessage
    );

    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(event, Some(ClientEvent::Disconnected));

    // The session is gone; further operations fail cleanly.
    let publish = client.publish(PublishMessage::new("a/b", "x")).await;
    assert!(matches!(publish, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn broker_disconnect_surfaces_reason_and_loss() {
    common::init_tracing();

    let (_client, mut events, broker) = establish(options()).await;
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Connected {
            session_present: false
        })
    );

    broker.send_packet(&Packet::Disconnect(Disconnect {
        reason_code: DisconnectReasonCode::ServerShuttingDown,
        properties: Default::default(),
    }));

    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(
        event,
        Some(ClientEvent::BrokerDisconnected {
            reason_code: DisconnectReasonCode::ServerShuttingDown
        })
    );
    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(event, Some(ClientEvent::ConnectionLost));
}

#[tokio::test]
async fn malformed_bytes_close_the_connection() {
    common::init_tracing();

    let (_client, mut events, broker) = establish(options()).await;
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Connected {
            session_present: false
        })
    );

    // Packet type 0 is reserved; the stream is no longer trustworthy.
    broker.send_bytes(vec![0x00, 0x00]);

    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(event, Some(ClientEvent::ConnectionLost));
}
