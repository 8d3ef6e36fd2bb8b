//! In-memory transport behavior at the protocol-message level
//!
//! Head-of-line delivery, per-sender FIFO, the kind-discriminated message
//! enum flowing through a single typed channel, and broadcast reference
//! counts.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vesna::protocol::{
    ClientId, Clock, EntityId, EntityStateUpdate, InputMessage, Message, StateMessage,
    VirtualClock,
};
use vesna::transport::{MemoryNetwork, TransportError, TwoWayBuffer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Pos {
    x: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Move {
    dx: f64,
}

fn input(seq: u64) -> InputMessage<Move> {
    InputMessage {
        entity_id: EntityId::from("p1"),
        input: Move { dx: 1.0 },
        input_sequence_number: seq,
    }
}

fn snapshot(x: f64, timestamp_ms: u64) -> StateMessage<Pos> {
    StateMessage {
        entity: EntityStateUpdate {
            id: EntityId::from("p1"),
            state: Pos { x },
            belongs_to_recipient_client: false,
        },
        last_processed_input_sequence_number: 0,
        timestamp_ms,
    }
}

#[test]
fn head_of_line_ordering_with_changing_lag() {
    let clock = Arc::new(VirtualClock::new(0));
    let network: MemoryNetwork<InputMessage<Move>, StateMessage<Pos>> =
        MemoryNetwork::new(clock.clone() as Arc<dyn Clock>);
    let client_id = ClientId::new_v4();
    let mut client = network.connect(client_id, 100);
    let mut server = network.server_endpoint(client_id);

    // m1 sent at t=0 with lag 100; m2 sent at t=5 with lag 10
    client.send(vec![input(0)]).unwrap();
    clock.set(5);
    network.set_lag(client_id, 10).unwrap();
    client.send(vec![input(1)]).unwrap();

    // t=50: m2 is ready but blocked behind m1
    clock.set(50);
    assert!(server.receive().is_empty());

    // t=100: both arrive, in send order
    clock.set(100);
    let received = server.receive();
    let sequences: Vec<u64> = received.iter().map(|m| m.input_sequence_number).collect();
    assert_eq!(sequences, [0, 1]);
}

#[test]
fn both_kinds_route_through_a_single_typed_channel() {
    // a transport that carries the tagged enum in both directions
    let clock = Arc::new(VirtualClock::new(0));
    let network: MemoryNetwork<Message<Pos, Move>, Message<Pos, Move>> =
        MemoryNetwork::new(clock.clone() as Arc<dyn Clock>);
    let client_id = ClientId::new_v4();
    let mut client = network.connect(client_id, 0);
    let mut server = network.server_endpoint(client_id);

    client.send(vec![Message::Input(input(3))]).unwrap();
    server.send(vec![Message::State(snapshot(2.0, 40))]).unwrap();
    clock.set(1);

    match server.receive().as_slice() {
        [Message::Input(message)] => assert_eq!(message.input_sequence_number, 3),
        other => panic!("expected one input message, got {other:?}"),
    }
    match client.receive().as_slice() {
        [Message::State(message)] => assert_eq!(message.timestamp_ms, 40),
        other => panic!("expected one state message, got {other:?}"),
    }
}

#[test]
fn per_sender_fifo_across_many_batches() {
    let clock = Arc::new(VirtualClock::new(0));
    let network: MemoryNetwork<InputMessage<Move>, StateMessage<Pos>> =
        MemoryNetwork::new(clock.clone() as Arc<dyn Clock>);
    let client_id = ClientId::new_v4();
    let mut client = network.connect(client_id, 25);
    let mut server = network.server_endpoint(client_id);

    for seq in 0..10 {
        client.send(vec![input(seq)]).unwrap();
        clock.advance(5);
    }

    clock.advance(100);
    let sequences: Vec<u64> = server
        .receive()
        .iter()
        .map(|m| m.input_sequence_number)
        .collect();
    assert_eq!(sequences, (0..10).collect::<Vec<u64>>());
}

#[test]
fn broadcast_reference_counts_reach_zero_when_everyone_received() {
    let clock = Arc::new(VirtualClock::new(0));
    let network: MemoryNetwork<InputMessage<Move>, StateMessage<Pos>> =
        MemoryNetwork::new(clock.clone() as Arc<dyn Clock>);

    let slow = ClientId::new_v4();
    let fast = ClientId::new_v4();
    let mut slow_client = network.connect(slow, 100);
    let mut fast_client = network.connect(fast, 10);

    network.broadcast(vec![snapshot(1.0, 0)]).unwrap();
    assert_eq!(network.unreceived_server_batches(), 1);

    clock.set(10);
    assert_eq!(fast_client.receive().len(), 1);
    assert!(slow_client.receive().is_empty());
    assert_eq!(network.unreceived_server_batches(), 1);

    clock.set(100);
    assert_eq!(slow_client.receive().len(), 1);
    assert_eq!(network.unreceived_server_batches(), 0);
}

#[test]
fn sending_to_an_unconnected_slot_is_test_misuse() {
    let clock = Arc::new(VirtualClock::new(0));
    let network: MemoryNetwork<InputMessage<Move>, StateMessage<Pos>> =
        MemoryNetwork::new(clock as Arc<dyn Clock>);

    let stranger = ClientId::new_v4();
    let mut server = network.server_endpoint(stranger);
    assert!(matches!(
        server.send(vec![snapshot(0.0, 0)]),
        Err(TransportError::SendBeforeConnect(_))
    ));
}
