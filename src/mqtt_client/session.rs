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

//! QoS delivery state machines and negotiated session parameters.
//!
//! Both tables are owned by the client's event loop task; that single-writer
//! discipline is what serializes inflow acknowledgments against
//! application-initiated operations.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::mqtt_client::error::{ClientError, ProtocolError};
use crate::mqtt_client::packet::{
    Connack, PubAckReasonCode, PubRelReasonCode, Puback, Pubcomp, Pubrec, Qos,
};

/// Session parameters in force after a successful CONNACK.
///
/// Broker-advertised values supersede requested ones wherever the broker
/// narrows them; absent CONNACK properties fall back to protocol defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedSession {
    pub session_present: bool,
    /// Client identifier actually in force (server-assigned when the
    /// CONNECT carried an empty one).
    pub client_id: String,
    pub keep_alive: u16,
    pub session_expiry_interval: u32,
    /// Broker's Receive Maximum: cap on our unacknowledged QoS 1/2 sends.
    pub send_receive_maximum: u16,
    pub maximum_qos: Qos,
    pub retain_available: bool,
    /// Broker's Maximum Packet Size for packets we send.
    pub send_maximum_packet_size: usize,
    /// Broker's Topic Alias Maximum: cap on aliases we may assign.
    pub send_topic_alias_maximum: u16,
}

impl NegotiatedSession {
    pub fn from_connack(
        requested_client_id: &str,
        requested_keep_alive: u16,
        requested_session_expiry: u32,
        connack: &Connack,
    ) -> Self {
        let props = &connack.properties;
        NegotiatedSession {
            session_present: connack.session_present,
            client_id: props
                .assigned_client_identifier
                .clone()
                .unwrap_or_else(|| requested_client_id.to_owned()),
            keep_alive: props.server_keep_alive.unwrap_or(requested_keep_alive),
            session_expiry_interval: props
                .session_expiry_interval
                .unwrap_or(requested_session_expiry),
            send_receive_maximum: props.receive_maximum.unwrap_or(u16::MAX),
            maximum_qos: match props.maximum_qos {
                Some(0) => Qos::AtMostOnce,
                Some(_) => Qos::AtLeastOnce,
                None => Qos::ExactlyOnce,
            },
            retain_available: props.retain_available != Some(0),
            send_maximum_packet_size: props
                .maximum_packet_size
                .map(|v| v as usize)
                .unwrap_or(usize::MAX),
            send_topic_alias_maximum: props.topic_alias_maximum.unwrap_or(0),
        }
    }
}

/// Result of a completed publish, resolved when the terminal acknowledgment
/// arrives (immediately for QoS 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Fire and forget, no acknowledgment data exists.
    Qos0,
    /// PUBACK reason code.
    Qos1(PubAckReasonCode),
    /// PUBCOMP reason code.
    Qos2(PubRelReasonCode),
}

pub type PublishResponder = oneshot::Sender<Result<PublishOutcome, ClientError>>;

#[derive(Debug, PartialEq, Eq)]
enum OutboundState {
    AwaitingPubAck,
    AwaitingPubRec,
    AwaitingPubComp,
}

struct PendingOutbound {
    state: OutboundState,
    responder: Option<PublishResponder>,
}

/// What the event loop must do after feeding an acknowledgment to the
/// outbound table.
#[derive(Debug, PartialEq, Eq)]
pub enum OutboundAction {
    /// Terminal acknowledgment processed; release the packet identifier.
    Release(u16),
    /// PUBREC accepted; send PUBREL for this identifier.
    SendPubrel(u16),
    /// Duplicate PUBREC after PUBREL was already sent, or an acknowledgment
    /// for an unknown identifier. Nothing to send, nothing to release.
    Ignore,
}

/// Outbound QoS 1/2 deliveries awaiting acknowledgment, keyed by packet
/// identifier.
#[derive(Default)]
pub struct OutboundDeliveries {
    pending: HashMap<u16, PendingOutbound>,
}

impl OutboundDeliveries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a QoS 1/2 PUBLISH that was just written to the transport.
    pub fn insert(&mut self, packet_id: u16, qos: Qos, responder: PublishResponder) {
        let state = match qos {
            Qos::AtLeastOnce => OutboundState::AwaitingPubAck,
            Qos::ExactlyOnce => OutboundState::AwaitingPubRec,
            Qos::AtMostOnce => unreachable!("QoS 0 publishes are never tracked"),
        };
        self.pending.insert(
            packet_id,
            PendingOutbound {
                state,
                responder: Some(responder),
            },
        );
    }

    /// Number of unacknowledged QoS 1/2 publishes, for the broker's
    /// Receive Maximum window.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn on_puback(&mut self, ack: &Puback) -> Result<OutboundAction, ProtocolError> {
        match self.pending.entry(ack.packet_id) {
            Entry::Occupied(entry) if entry.get().state == OutboundState::AwaitingPubAck => {
                let mut pending = entry.remove();
                if let Some(tx) = pending.responder.take() {
                    let _ = tx.send(Ok(PublishOutcome::Qos1(ack.reason_code)));
                }
                Ok(OutboundAction::Release(ack.packet_id))
            }
            _ => Err(ProtocolError::UnsolicitedAck {
                packet_type: "PUBACK",
                packet_id: ack.packet_id,
            }),
        }
    }

    pub fn on_pubrec(&mut self, rec: &Pubrec) -> Result<OutboundAction, ProtocolError> {
        match self.pending.get_mut(&rec.packet_id) {
            Some(p) if p.state == OutboundState::AwaitingPubRec => {
                if !rec.reason_code.is_success() {
                    // Broker refused the publish; the handshake ends here.
                    if let Some(tx) = p.responder.take() {
                        let _ = tx.send(Ok(PublishOutcome::Qos2(
                            PubRelReasonCode::PacketIdentifierNotFound,
                        )));
                    }
                    self.pending.remove(&rec.packet_id);
                    return Ok(OutboundAction::Release(rec.packet_id));
                }
                p.state = OutboundState::AwaitingPubComp;
                Ok(OutboundAction::SendPubrel(rec.packet_id))
            }
            // Duplicate PUBREC after our PUBREL: the handshake does not
            // restart.
            Some(p) if p.state == OutboundState::AwaitingPubComp => Ok(OutboundAction::Ignore),
            _ => Err(ProtocolError::UnsolicitedAck {
                packet_type: "PUBREC",
                packet_id: rec.packet_id,
            }),
        }
    }

    pub fn on_pubcomp(&mut self, comp: &Pubcomp) -> Result<OutboundAction, ProtocolError> {
        match self.pending.entry(comp.packet_id) {
            Entry::Occupied(entry) if entry.get().state == OutboundState::AwaitingPubComp => {
                let mut pending = entry.remove();
                if let Some(tx) = pending.responder.take() {
                    let _ = tx.send(Ok(PublishOutcome::Qos2(comp.reason_code)));
                }
                Ok(OutboundAction::Release(comp.packet_id))
            }
            _ => Err(ProtocolError::UnsolicitedAck {
                packet_type: "PUBCOMP",
                packet_id: comp.packet_id,
            }),
        }
    }

    /// Drop one pending delivery without resolving it, handing back the
    /// responder so the caller can report a timeout or cancellation.
    pub fn cancel(&mut self, packet_id: u16) -> Option<PublishResponder> {
        self.pending
            .remove(&packet_id)
            .and_then(|mut pending| pending.responder.take())
    }

    /// Fail every pending delivery, for connection teardown.
    pub fn fail_all(&mut self, make_error: impl Fn() -> ClientError) {
        for (_, mut pending) in self.pending.drain() {
            if let Some(tx) = pending.responder.take() {
                let _ = tx.send(Err(make_error()));
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum InboundState {
    /// QoS 1/2 publish delivered to the application, acknowledgment not yet
    /// requested (manual mode only).
    Unacknowledged,
    /// PUBREC sent for a QoS 2 publish; waiting for the peer's PUBREL.
    AwaitingPubrel,
    /// Terminal acknowledgment emitted. Kept so a late duplicate
    /// `acknowledge` fails with "already acknowledged" rather than
    /// "no pending inbound publish".
    Acknowledged,
}

/// What the event loop must write after feeding the inbound table.
#[derive(Debug, PartialEq)]
pub enum InboundAck {
    SendPuback(Puback),
    SendPubrec(Pubrec),
    SendPubcomp(Pubcomp),
    Nothing,
}

/// Inbound QoS 1/2 deliveries and their acknowledgment state, keyed by
/// packet identifier.
#[derive(Default)]
pub struct InboundDeliveries {
    manual_ack: bool,
    pending: HashMap<u16, (Qos, InboundState)>,
}

impl InboundDeliveries {
    pub fn new(manual_ack: bool) -> Self {
        InboundDeliveries {
            manual_ack,
            pending: HashMap::new(),
        }
    }

    /// Number of truly unacknowledged inbound deliveries. This is what the
    /// broker's backpressure window resolves against.
    pub fn unacknowledged(&self) -> usize {
        self.pending
            .values()
            .filter(|(_, state)| *state != InboundState::Acknowledged)
            .count()
    }

    /// Feed a received QoS 1/2 PUBLISH. Returns the acknowledgment to emit
    /// now (automatic mode) or `Nothing` (manual mode, the application will
    /// acknowledge later).
    pub fn on_publish(&mut self, packet_id: u16, qos: Qos) -> InboundAck {
        debug_assert_ne!(qos, Qos::AtMostOnce);
        if self.manual_ack {
            // A broker redelivery with an identifier we already track
            // replaces the record only if it was acknowledged and settled.
            self.pending
                .insert(packet_id, (qos, InboundState::Unacknowledged));
            return InboundAck::Nothing;
        }
        match qos {
            Qos::AtLeastOnce => InboundAck::SendPuback(Puback::new(packet_id)),
            Qos::ExactlyOnce => {
                self.pending
                    .insert(packet_id, (qos, InboundState::AwaitingPubrel));
                InboundAck::SendPubrec(Pubrec::new(packet_id))
            }
            Qos::AtMostOnce => InboundAck::Nothing,
        }
    }

    /// Application acknowledgment of a pending inbound delivery.
    pub fn acknowledge(&mut self, packet_id: u16) -> Result<InboundAck, ClientError> {
        if !self.manual_ack {
            return Err(ClientError::ManualAckDisabled);
        }
        let Some((qos, state)) = self.pending.get_mut(&packet_id) else {
            return Err(ClientError::NoPendingInboundPublish(packet_id));
        };
        match state {
            InboundState::Acknowledged | InboundState::AwaitingPubrel => {
                Err(ClientError::AlreadyAcknowledged(packet_id))
            }
            InboundState::Unacknowledged => match qos {
                Qos::AtLeastOnce => {
                    *state = InboundState::Acknowledged;
                    Ok(InboundAck::SendPuback(Puback::new(packet_id)))
                }
                Qos::ExactlyOnce => {
                    *state = InboundState::AwaitingPubrel;
                    Ok(InboundAck::SendPubrec(Pubrec::new(packet_id)))
                }
                Qos::AtMostOnce => unreachable!("QoS 0 deliveries are never tracked"),
            },
        }
    }

    /// Peer's PUBREL for a QoS 2 delivery. Always answered with PUBCOMP; an
    /// unknown identifier gets the PacketIdentifierNotFound reason code.
    pub fn on_pubrel(&mut self, packet_id: u16) -> InboundAck {
        match self.pending.get_mut(&packet_id) {
            Some((Qos::ExactlyOnce, state)) if *state == InboundState::AwaitingPubrel => {
                *state = InboundState::Acknowledged;
                InboundAck::SendPubcomp(Pubcomp::new(packet_id))
            }
            Some((Qos::ExactlyOnce, state)) if *state == InboundState::Acknowledged => {
                // Duplicate PUBREL: answer again, state is already settled.
                InboundAck::SendPubcomp(Pubcomp::new(packet_id))
            }
            _ => {
                let mut comp = Pubcomp::new(packet_id);
                comp.reason_code = PubRelReasonCode::PacketIdentifierNotFound;
                InboundAck::SendPubcomp(comp)
            }
        }
    }

    /// Drop all state, for connection teardown.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_client::packet::{AckProperties, ConnackProperties, ConnectReasonCode};

    fn connack(props: ConnackProperties) -> Connack {
        Connack {
            session_present: false,
            reason_code: ConnectReasonCode::Success,
            properties: props,
        }
    }

    #[test]
    fn negotiated_defaults_when_connack_is_bare() {
        let session = NegotiatedSession::from_connack("cid", 60, 0, &connack(Default::default()));
        assert_eq!(session.client_id, "cid");
        assert_eq!(session.keep_alive, 60);
        assert_eq!(session.send_receive_maximum, u16::MAX);
        assert_eq!(session.maximum_qos, Qos::ExactlyOnce);
        assert!(session.retain_available);
    }

    #[test]
    fn broker_values_supersede_requested() {
        let session = NegotiatedSession::from_connack(
            "",
            60,
            300,
            &connack(ConnackProperties {
                assigned_client_identifier: Some("auto-9".into()),
                server_keep_alive: Some(30),
                receive_maximum: Some(5),
                maximum_qos: Some(1),
                ..Default::default()
            }),
        );
        assert_eq!(session.client_id, "auto-9");
        assert_eq!(session.keep_alive, 30);
        assert_eq!(session.send_receive_maximum, 5);
        assert_eq!(session.maximum_qos, Qos::AtLeastOnce);
        assert_eq!(session.session_expiry_interval, 300);
    }

    fn responder() -> (
        PublishResponder,
        oneshot::Receiver<Result<PublishOutcome, ClientError>>,
    ) {
        oneshot::channel()
    }

    #[test]
    fn qos1_outbound_completes_on_puback() {
        let mut out = OutboundDeliveries::new();
        let (tx, mut rx) = responder();
        out.insert(7, Qos::AtLeastOnce, tx);
        assert_eq!(out.in_flight(), 1);

        let action = out.on_puback(&Puback::new(7)).unwrap();
        assert_eq!(action, OutboundAction::Release(7));
        assert_eq!(out.in_flight(), 0);
        assert_eq!(
            rx.try_recv().unwrap().unwrap(),
            PublishOutcome::Qos1(PubAckReasonCode::Success)
        );
    }

    #[test]
    fn qos2_outbound_handshake_completes_exactly_once() {
        let mut out = OutboundDeliveries::new();
        let (tx, mut rx) = responder();
        out.insert(9, Qos::ExactlyOnce, tx);

        assert_eq!(
            out.on_pubrec(&Pubrec::new(9)).unwrap(),
            OutboundAction::SendPubrel(9)
        );
        // Duplicate PUBREC after PUBREL: no restart.
        assert_eq!(out.on_pubrec(&Pubrec::new(9)).unwrap(), OutboundAction::Ignore);
        assert!(rx.try_recv().is_err());

        assert_eq!(
            out.on_pubcomp(&Pubcomp::new(9)).unwrap(),
            OutboundAction::Release(9)
        );
        assert_eq!(
            rx.try_recv().unwrap().unwrap(),
            PublishOutcome::Qos2(PubRelReasonCode::Success)
        );

        // A second PUBCOMP is unsolicited.
        assert_eq!(
            out.on_pubcomp(&Pubcomp::new(9)),
            Err(ProtocolError::UnsolicitedAck {
                packet_type: "PUBCOMP",
                packet_id: 9,
            })
        );
    }

    #[test]
    fn unsolicited_puback_is_an_error() {
        let mut out = OutboundDeliveries::new();
        assert_eq!(
            out.on_puback(&Puback::new(3)),
            Err(ProtocolError::UnsolicitedAck {
                packet_type: "PUBACK",
                packet_id: 3,
            })
        );
    }

    #[test]
    fn puback_for_qos2_delivery_is_unsolicited() {
        let mut out = OutboundDeliveries::new();
        let (tx, _rx) = responder();
        out.insert(4, Qos::ExactlyOnce, tx);
        assert!(out.on_puback(&Puback::new(4)).is_err());
    }

    #[test]
    fn rejected_pubrec_ends_the_handshake() {
        let mut out = OutboundDeliveries::new();
        let (tx, mut rx) = responder();
        out.insert(5, Qos::ExactlyOnce, tx);

        let mut rec = Pubrec::new(5);
        rec.reason_code = PubAckReasonCode::NotAuthorized;
        rec.properties = AckProperties::default();
        assert_eq!(out.on_pubrec(&rec).unwrap(), OutboundAction::Release(5));
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(out.in_flight(), 0);
    }

    #[test]
    fn fail_all_resolves_every_responder() {
        let mut out = OutboundDeliveries::new();
        let (tx1, mut rx1) = responder();
        let (tx2, mut rx2) = responder();
        out.insert(1, Qos::AtLeastOnce, tx1);
        out.insert(2, Qos::ExactlyOnce, tx2);
        out.fail_all(|| ClientError::ConnectionLost);
        assert!(matches!(
            rx1.try_recv().unwrap(),
            Err(ClientError::ConnectionLost)
        ));
        assert!(matches!(
            rx2.try_recv().unwrap(),
            Err(ClientError::ConnectionLost)
        ));
    }

    #[test]
    fn automatic_mode_acks_immediately() {
        let mut inbound = InboundDeliveries::new(false);
        assert_eq!(
            inbound.on_publish(7, Qos::AtLeastOnce),
            InboundAck::SendPuback(Puback::new(7))
        );
        assert_eq!(inbound.unacknowledged(), 0);

        assert_eq!(
            inbound.on_publish(8, Qos::ExactlyOnce),
            InboundAck::SendPubrec(Pubrec::new(8))
        );
        assert_eq!(
            inbound.on_pubrel(8),
            InboundAck::SendPubcomp(Pubcomp::new(8))
        );
    }

    #[test]
    fn manual_mode_single_ack_then_already_acknowledged() {
        let mut inbound = InboundDeliveries::new(true);
        assert_eq!(inbound.on_publish(7, Qos::AtLeastOnce), InboundAck::Nothing);
        assert_eq!(inbound.unacknowledged(), 1);

        assert_eq!(
            inbound.acknowledge(7).unwrap(),
            InboundAck::SendPuback(Puback::new(7))
        );
        assert_eq!(inbound.unacknowledged(), 0);

        assert!(matches!(
            inbound.acknowledge(7),
            Err(ClientError::AlreadyAcknowledged(7))
        ));
    }

    #[test]
    fn manual_mode_unknown_id_is_distinct_error() {
        let mut inbound = InboundDeliveries::new(true);
        assert!(matches!(
            inbound.acknowledge(99),
            Err(ClientError::NoPendingInboundPublish(99))
        ));
    }

    #[test]
    fn acknowledge_with_manual_mode_disabled_fails() {
        let mut inbound = InboundDeliveries::new(false);
        assert!(matches!(
            inbound.acknowledge(1),
            Err(ClientError::ManualAckDisabled)
        ));
    }

    #[test]
    fn manual_qos2_ack_awaits_pubrel() {
        let mut inbound = InboundDeliveries::new(true);
        inbound.on_publish(11, Qos::ExactlyOnce);

        assert_eq!(
            inbound.acknowledge(11).unwrap(),
            InboundAck::SendPubrec(Pubrec::new(11))
        );
        // Acknowledging again while awaiting PUBREL is a duplicate.
        assert!(matches!(
            inbound.acknowledge(11),
            Err(ClientError::AlreadyAcknowledged(11))
        ));
        assert_eq!(
            inbound.on_pubrel(11),
            InboundAck::SendPubcomp(Pubcomp::new(11))
        );
    }

    #[test]
    fn pubrel_for_unknown_id_answers_not_found() {
        let mut inbound = InboundDeliveries::new(false);
        match inbound.on_pubrel(42) {
            InboundAck::SendPubcomp(comp) => {
                assert_eq!(comp.packet_id, 42);
                assert_eq!(comp.reason_code, PubRelReasonCode::PacketIdentifierNotFound);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
