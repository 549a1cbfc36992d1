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
    Packet, Publish, Suback, SubscribeReasonCode,
};
use mqtt_client_tokio::mqtt_client::{
    ClientEvent, ConnectOptions, Qos, SubscribeFilter,
};

use stub_transport::establish;

/// The full consumer flow: connect, subscribe to a wildcard, receive a QoS 1
/// message, and acknowledge it manually so the broker sees exactly one
/// PUBACK with the delivery's identifier.
#[tokio::test]
async fn manual_consumer_flow_over_wildcard_subscription() {
    common::init_tracing();

    let (client, mut events, mut broker) = establish(
        ConnectOptions::builder()
            .client_id("order-worker")
            .keep_alive(0u16)
            .manual_ack(true)
            .build()
            .unwrap(),
    )
    .await;
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Connected {
            session_present: false
        })
    );

    let (codes, _) = tokio::join!(
        client.subscribe(vec![SubscribeFilter::new("orders/#", Qos::AtLeastOnce)]),
        async {
            let Packet::Subscribe(subscribe) = broker.recv_packet().await else {
                panic!("expected SUBSCRIBE on the wire");
            };
            assert_eq!(subscribe.filters[0].filter, "orders/#");
            broker.send_packet(&Packet::Suback(Suback {
                packet_id: subscribe.packet_id,
                reason_codes: vec![SubscribeReasonCode::GrantedQos1],
                properties: Default::default(),
            }));
        }
    );
    assert_eq!(codes.unwrap(), vec![SubscribeReasonCode::GrantedQos1]);

    broker.send_packet(&Packet::Publish(Publish {
        topic: "orders/new".to_owned(),
        payload: Bytes::from("order-4711"),
        qos: Qos::AtLeastOnce,
        retain: false,
        dup: false,
        packet_id: Some(7),
        properties: Default::default(),
    }));

    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    let Some(ClientEvent::Message(message)) = event else {
        panic!("expected the order message, got {event:?}");
    };
    assert_eq!(message.topic, "orders/new");
    assert_eq!(message.payload, Bytes::from("order-4711"));
    assert_eq!(message.qos, Qos::AtLeastOnce);

    // The application processes the order, then settles the delivery.
    client
        .acknowledge(message.packet_id)
        .await
        .expect("acknowledge should succeed");

    let Packet::Puback(puback) = broker.recv_packet().await else {
        panic!("expected PUBACK after acknowledge()");
    };
    assert_eq!(puback.packet_id, 7);
}
