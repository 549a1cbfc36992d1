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
    Packet, Publish, Suback, SubscribeReasonCode, UnsubAckReasonCode, Unsuback,
};
use mqtt_client_tokio::mqtt_client::{
    ClientError, ClientEvent, ConnectOptions, ProtocolError, Qos, SubscribeFilter,
};

use stub_transport::{establish, BrokerSide};

fn options() -> ConnectOptions {
    ConnectOptions::builder()
        .client_id("sub-client")
        .keep_alive(0u16)
        .build()
        .unwrap()
}

fn qos0_publish(topic: &str, payload: &'static str) -> Packet {
    Packet::Publish(Publish {
        topic: topic.to_owned(),
        payload: Bytes::from(payload),
        qos: Qos::AtMostOnce,
        retain: false,
        dup: false,
        packet_id: None,
        properties: Default::default(),
    })
}

/// Answer one SUBSCRIBE with the given per-filter codes.
async fn grant_subscribe(broker: &mut BrokerSide, codes: Vec<SubscribeReasonCode>) {
    let Packet::Subscribe(subscribe) = broker.recv_packet().await else {
        panic!("expected SUBSCRIBE on the wire");
    };
    broker.send_packet(&Packet::Suback(Suback {
        packet_id: subscribe.packet_id,
        reason_codes: codes,
        properties: Default::default(),
    }));
}

#[tokio::test]
async fn subscribe_resolves_with_reason_codes_in_order() {
    common::init_tracing();

    let (client, _events, mut broker) = establish(options()).await;

    let (codes, _) = tokio::join!(
        client.subscribe(vec![
            SubscribeFilter::new("orders/#", Qos::AtLeastOnce),
            SubscribeFilter::new("alerts/+/critical", Qos::ExactlyOnce),
        ]),
        async {
            let Packet::Subscribe(subscribe) = broker.recv_packet().await else {
                panic!("expected SUBSCRIBE on the wire");
            };
            assert_eq!(subscribe.filters.len(), 2);
            assert_eq!(subscribe.filters[0].filter, "orders/#");
            assert_eq!(subscribe.filters[0].qos, Qos::AtLeastOnce);
            assert_eq!(subscribe.filters[1].filter, "alerts/+/critical");

            broker.send_packet(&Packet::Suback(Suback {
                packet_id: subscribe.packet_id,
                reason_codes: vec![
                    SubscribeReasonCode::GrantedQos1,
                    SubscribeReasonCode::NotAuthorized,
                ],
                properties: Default::default(),
            }));
        }
    );
    assert_eq!(
        codes.expect("subscribe should resolve"),
        vec![
            SubscribeReasonCode::GrantedQos1,
            SubscribeReasonCode::NotAuthorized,
        ]
    );
}

#[tokio::test]
async fn matching_message_reaches_the_event_channel() {
    common::init_tracing();

    let (client, mut events, mut broker) = establish(options()).await;
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Connected {
            session_present: false
        })
    );

    let (codes, _) = tokio::join!(
        client.subscribe(vec![SubscribeFilter::new("orders/#", Qos::AtMostOnce)]),
        grant_subscribe(&mut broker, vec![SubscribeReasonCode::GrantedQos0])
    );
    codes.unwrap();

    broker.send_packet(&qos0_publish("orders/new", "o-77"));

    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    let Some(ClientEvent::Message(message)) = event else {
        panic!("expected a Message event, got {event:?}");
    };
    assert_eq!(message.topic, "orders/new");
    assert_eq!(message.payload, Bytes::from("o-77"));
    assert_eq!(message.packet_id, None);
}

#[tokio::test(start_paused = true)]
async fn dedicated_channel_delivers_alongside_the_event_channel() {
    common::init_tracing();

    let (client, mut events, mut broker) = establish(options()).await;
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Connected {
            session_present: false
        })
    );

    let (result, _) = tokio::join!(
        client.subscribe_with_channel(vec![SubscribeFilter::new("metrics/+", Qos::AtMostOnce)]),
        grant_subscribe(&mut broker, vec![SubscribeReasonCode::GrantedQos0])
    );
    let (_codes, mut channel) = result.unwrap();

    broker.send_packet(&qos0_publish("metrics/cpu", "0.93"));

    let message = timeout(Duration::from_secs(1), channel.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.topic, "metrics/cpu");

    // A dedicated channel never swallows the message: the client-wide
    // event channel receives it as well.
    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    let Some(ClientEvent::Message(message)) = event else {
        panic!("expected a Message event, got {event:?}");
    };
    assert_eq!(message.topic, "metrics/cpu");
    assert_eq!(message.payload, Bytes::from("0.93"));
}

#[tokio::test(start_paused = true)]
async fn dollar_topics_are_hidden_from_wildcards() {
    common::init_tracing();

    let (client, _events, mut broker) = establish(options()).await;

    let (result, _) = tokio::join!(
        client.subscribe_with_channel(vec![SubscribeFilter::new("#", Qos::AtMostOnce)]),
        grant_subscribe(&mut broker, vec![SubscribeReasonCode::GrantedQos0])
    );
    let (_codes, mut channel) = result.unwrap();

    broker.send_packet(&qos0_publish("$SYS/broker/uptime", "12345"));
    broker.send_packet(&qos0_publish("a/b", "visible"));

    // Only the non-$ message may arrive on the subscription channel.
    let message = timeout(Duration::from_secs(1), channel.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.topic, "a/b");
    assert!(
        timeout(Duration::from_millis(200), channel.recv())
            .await
            .is_err(),
        "$-prefixed topic matched a wildcard subscription"
    );
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_stops_routing() {
    common::init_tracing();

    let (client, _events, mut broker) = establish(options()).await;

    let (result, _) = tokio::join!(
        client.subscribe_with_channel(vec![SubscribeFilter::new("news/#", Qos::AtMostOnce)]),
        grant_subscribe(&mut broker, vec![SubscribeReasonCode::GrantedQos0])
    );
    let (_codes, mut channel) = result.unwrap();

    let (codes, _) = tokio::join!(client.unsubscribe(vec!["news/#".into()]), async {
        let Packet::Unsubscribe(unsubscribe) = broker.recv_packet().await else {
            panic!("expected UNSUBSCRIBE on the wire");
        };
        assert_eq!(unsubscribe.filters, vec!["news/#".to_owned()]);
        broker.send_packet(&Packet::Unsuback(Unsuback {
            packet_id: unsubscribe.packet_id,
            reason_codes: vec![UnsubAckReasonCode::Success],
            properties: Default::default(),
        }));
    });
    assert_eq!(codes.unwrap(), vec![UnsubAckReasonCode::Success]);

    broker.send_packet(&qos0_publish("news/local", "late"));
    assert!(
        timeout(Duration::from_millis(200), channel.recv())
            .await
            .is_err(),
        "message was routed to a removed subscription"
    );
}

#[tokio::test]
async fn invalid_filters_are_rejected_locally() {
    common::init_tracing();

    let (client, _events, _broker) = establish(options()).await;

    let empty = client.subscribe(vec![]).await;
    assert!(matches!(empty, Err(ClientError::Protocol(_))));

    let misplaced_hash = client
        .subscribe(vec![SubscribeFilter::new("a/#/b", Qos::AtMostOnce)])
        .await;
    assert!(matches!(
        misplaced_hash,
        Err(ClientError::Protocol(ProtocolError::InvalidTopicFilter(_)))
    ));

    let embedded_plus = client
        .subscribe(vec![SubscribeFilter::new("a/b+", Qos::AtMostOnce)])
        .await;
    assert!(matches!(
        embedded_plus,
        Err(ClientError::Protocol(ProtocolError::InvalidTopicFilter(_)))
    ));
}
