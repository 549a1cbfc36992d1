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

use bytes::Bytes;
use mqtt_client_tokio::mqtt_client::packet::{
    Connack, ConnackProperties, ConnectReasonCode, Packet, PubAckReasonCode, PubRelReasonCode,
    Puback, Pubcomp, Pubrec,
};
use mqtt_client_tokio::mqtt_client::{
    ClientError, ConnectOptions, ProtocolError, PublishMessage, PublishOutcome, Qos,
};

use stub_transport::{establish, establish_with};

fn options() -> ConnectOptions {
    ConnectOptions::builder()
        .client_id("pub-client")
        .keep_alive(0u16)
        .build()
        .unwrap()
}

fn connack_with(properties: ConnackProperties) -> Connack {
    Connack {
        session_present: false,
        reason_code: ConnectReasonCode::Success,
        properties,
    }
}

#[tokio::test]
async fn qos0_resolves_as_soon_as_written() {
    common::init_tracing();

    let (client, _events, mut broker) = establish(options()).await;

    let outcome = client
        .publish(PublishMessage::new("sensors/kitchen", "21.5"))
        .await
        .expect("publish should succeed");
    assert_eq!(outcome, PublishOutcome::Qos0);

    let Packet::Publish(publish) = broker.recv_packet().await else {
        panic!("expected PUBLISH on the wire");
    };
    assert_eq!(publish.topic, "sensors/kitchen");
    assert_eq!(publish.payload, Bytes::from("21.5"));
    assert_eq!(publish.qos, Qos::AtMostOnce);
    assert_eq!(publish.packet_id, None);
}

#[tokio::test]
async fn qos1_resolves_on_puback() {
    common::init_tracing();

    let (client, _events, mut broker) = establish(options()).await;

    let (outcome, _) = tokio::join!(
        client.publish(PublishMessage::new("orders/new", "o-1").qos(Qos::AtLeastOnce)),
        async {
            let Packet::Publish(publish) = broker.recv_packet().await else {
                panic!("expected PUBLISH on the wire");
            };
            assert_eq!(publish.qos, Qos::AtLeastOnce);
            assert!(!publish.dup);
            let packet_id = publish.packet_id.expect("QoS 1 carries an identifier");
            broker.send_packet(&Packet::Puback(Puback::new(packet_id)));
        }
    );
    assert_eq!(
        outcome.expect("publish should succeed"),
        PublishOutcome::Qos1(PubAckReasonCode::Success)
    );
}

#[tokio::test]
async fn qos2_completes_the_full_handshake() {
    common::init_tracing();

    let (client, _events, mut broker) = establish(options()).await;

    let (outcome, _) = tokio::join!(
        client.publish(PublishMessage::new("billing/run", "x").qos(Qos::ExactlyOnce)),
        async {
            let Packet::Publish(publish) = broker.recv_packet().await else {
                panic!("expected PUBLISH on the wire");
            };
            assert_eq!(publish.qos, Qos::ExactlyOnce);
            let packet_id = publish.packet_id.expect("QoS 2 carries an identifier");

            broker.send_packet(&Packet::Pubrec(Pubrec::new(packet_id)));
            let Packet::Pubrel(pubrel) = broker.recv_packet().await else {
                panic!("expected PUBREL after PUBREC");
            };
            assert_eq!(pubrel.packet_id, packet_id);
            broker.send_packet(&Packet::Pubcomp(Pubcomp::new(packet_id)));
        }
    );
    assert_eq!(
        outcome.expect("publish should succeed"),
        PublishOutcome::Qos2(PubRelReasonCode::Success)
    );
}

#[tokio::test(start_paused = true)]
async fn receive_maximum_window_queues_excess_publishes() {
    common::init_tracing();

    let (client, _events, mut broker, result) = establish_with(
        options(),
        connack_with(ConnackProperties {
            receive_maximum: Some(1),
            ..Default::default()
        }),
    )
    .await;
    result.expect("connect should succeed");

    let first = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .publish(PublishMessage::new("q/1", "a").qos(Qos::AtLeastOnce))
                .await
        }
    });

    let Packet::Publish(publish1) = broker.recv_packet().await else {
        panic!("expected first PUBLISH");
    };
    let first_id = publish1.packet_id.unwrap();

    let second = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .publish(PublishMessage::new("q/2", "b").qos(Qos::AtLeastOnce))
                .await
        }
    });

    // Window of 1 is full; the second publish must not reach the wire yet.
    assert!(
        timeout(Duration::from_millis(200), broker.recv_packet())
            .await
            .is_err(),
        "second PUBLISH leaked past the Receive Maximum window"
    );

    broker.send_packet(&Packet::Puback(Puback::new(first_id)));
    assert_eq!(
        first.await.unwrap().unwrap(),
        PublishOutcome::Qos1(PubAckReasonCode::Success)
    );

    let Packet::Publish(publish2) = broker.recv_packet().await else {
        panic!("expected the queued PUBLISH after the window opened");
    };
    assert_eq!(publish2.topic, "q/2");
    broker.send_packet(&Packet::Puback(Puback::new(publish2.packet_id.unwrap())));
    assert_eq!(
        second.await.unwrap().unwrap(),
        PublishOutcome::Qos1(PubAckReasonCode::Success)
    );
}

#[tokio::test(start_paused = true)]
async fn missing_ack_times_out_when_configured() {
    common::init_tracing();

    let (client, _events, mut broker, result) = establish_with(
        ConnectOptions::builder()
            .keep_alive(0u16)
            .response_timeout_ms(100u64)
            .build()
            .unwrap(),
        connack_with(ConnackProperties::default()),
    )
    .await;
    result.expect("connect should succeed");

    let (outcome, _) = tokio::join!(
        client.publish(PublishMessage::new("slow/topic", "x").qos(Qos::AtLeastOnce)),
        async {
            // Swallow the PUBLISH, never acknowledge.
            let _ = broker.recv_packet().await;
        }
    );
    assert!(matches!(outcome, Err(ClientError::ResponseTimeout)));
}

#[tokio::test]
async fn qos_is_clamped_to_the_negotiated_maximum() {
    common::init_tracing();

    let (client, _events, mut broker, result) = establish_with(
        options(),
        connack_with(ConnackProperties {
            maximum_qos: Some(0),
            ..Default::default()
        }),
    )
    .await;
    result.expect("connect should succeed");

    let outcome = client
        .publish(PublishMessage::new("t/a", "x").qos(Qos::ExactlyOnce))
        .await
        .expect("clamped publish should succeed");
    assert_eq!(outcome, PublishOutcome::Qos0);

    let Packet::Publish(publish) = broker.recv_packet().await else {
        panic!("expected PUBLISH on the wire");
    };
    assert_eq!(publish.qos, Qos::AtMostOnce);
    assert_eq!(publish.packet_id, None);
}

#[tokio::test]
async fn oversized_publish_is_rejected_locally() {
    common::init_tracing();

    let (client, _events, _broker, result) = establish_with(
        options(),
        connack_with(ConnackProperties {
            maximum_packet_size: Some(16),
            ..Default::default()
        }),
    )
    .await;
    result.expect("connect should succeed");

    let outcome = client
        .publish(PublishMessage::new("t/a", vec![0u8; 64]))
        .await;
    assert!(matches!(
        outcome,
        Err(ClientError::Protocol(ProtocolError::PacketTooLarge { .. }))
    ));
}

#[tokio::test]
async fn wildcard_topic_name_is_rejected() {
    common::init_tracing();

    let (client, _events, _broker) = establish(options()).await;

    let outcome = client.publish(PublishMessage::new("a/+/b", "x")).await;
    assert!(matches!(
        outcome,
        Err(ClientError::Protocol(ProtocolError::InvalidTopicName(_)))
    ));
}

#[tokio::test]
async fn unsolicited_acks_are_ignored() {
    common::init_tracing();

    let (client, _events, mut broker) = establish(options()).await;

    broker.send_packet(&Packet::Puback(Puback::new(42)));
    broker.send_packet(&Packet::Pubcomp(Pubcomp::new(43)));

    // The connection survives; a later publish still round-trips.
    let outcome = client
        .publish(PublishMessage::new("still/alive", "ok"))
        .await
        .expect("publish should succeed");
    assert_eq!(outcome, PublishOutcome::Qos0);

    let Packet::Publish(publish) = broker.recv_packet().await else {
        panic!("expected PUBLISH on the wire");
    };
    assert_eq!(publish.topic, "still/alive");
}
