//! Message schema for client–server synchronization
//!
//! Two message kinds flow between the endpoints:
//! - `InputMessage` (client → server): one per-tick command for one entity,
//!   tagged with the client's input sequence number
//! - `StateMessage` (server → client): one authoritative entity snapshot,
//!   tagged with the last input sequence number the server has processed
//!   for the recipient
//!
//! Both kinds carry a `kind` discriminator (via the `Message` enum) so a
//! transport can route them through a single typed channel. Encoding is the
//! transport's concern; the in-memory transport moves these values as-is.

use crate::EntityId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Marker trait for state and input payloads carried in messages.
///
/// Payloads must be value-like (no cycles, no owned external resources) and
/// wire-ready: even though the in-memory transport never encodes them, a
/// real transport substituted for it will.
///
/// Blanket-implemented; applications never implement this by hand.
pub trait Payload:
    Clone + std::fmt::Debug + Send + Serialize + DeserializeOwned + 'static
{
}

impl<T> Payload for T where
    T: Clone + std::fmt::Debug + Send + Serialize + DeserializeOwned + 'static
{
}

/// A single per-tick command for one entity, sent client → server.
///
/// Sequence numbers are assigned per input-collection batch, not per
/// message: every input collected in the same client tick shares one
/// sequence number, so a server acknowledgement covers the whole batch
/// atomically even when one client owns several entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage<I> {
    /// Entity the input applies to.
    pub entity_id: EntityId,

    /// The input payload, applied deterministically by both endpoints.
    pub input: I,

    /// Per-client monotonically non-decreasing batch sequence number.
    pub input_sequence_number: u64,
}

/// One entity's authoritative state inside a `StateMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStateUpdate<S> {
    /// Entity this snapshot describes.
    pub id: EntityId,

    /// The authoritative state at the message's timestamp.
    pub state: S,

    /// True exactly when the recipient client owns this entity. Owned
    /// entities are reconciled; non-owned entities are interpolated,
    /// dead-reckoned, or adopted raw per their sync strategy.
    pub belongs_to_recipient_client: bool,
}

/// An authoritative snapshot for one entity, sent server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage<S> {
    /// The entity snapshot.
    pub entity: EntityStateUpdate<S>,

    /// Highest input sequence number from the recipient that the server has
    /// applied to this entity. The client drops pending inputs at or below
    /// this number before replaying the rest.
    pub last_processed_input_sequence_number: u64,

    /// Server time at which the snapshot was taken.
    pub timestamp_ms: u64,
}

/// Kind-discriminated envelope for routing both message kinds through a
/// single typed channel.
///
/// The paired in-memory transport keeps the two directions in separate
/// queues and does not need the discriminator; a single-channel transport
/// routes on `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Message<S, I> {
    /// Client → server input command.
    Input(InputMessage<I>),

    /// Server → client authoritative snapshot.
    State(StateMessage<S>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pos {
        x: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Move {
        dx: f64,
    }

    #[test]
    fn input_message_serializes_with_kind_tag() {
        let message: Message<Pos, Move> = Message::Input(InputMessage {
            entity_id: EntityId::from("p1"),
            input: Move { dx: 1.0 },
            input_sequence_number: 4,
        });

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "Input");
        assert_eq!(json["entity_id"], "p1");
        assert_eq!(json["input_sequence_number"], 4);
    }

    #[test]
    fn state_message_roundtrips() {
        let message: Message<Pos, Move> = Message::State(StateMessage {
            entity: EntityStateUpdate {
                id: EntityId::from("p1"),
                state: Pos { x: 2.5 },
                belongs_to_recipient_client: true,
            },
            last_processed_input_sequence_number: 9,
            timestamp_ms: 1_200,
        });

        let json = serde_json::to_string(&message).unwrap();
        let back: Message<Pos, Move> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
