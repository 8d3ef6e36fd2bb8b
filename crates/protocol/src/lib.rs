//! # Vesna Protocol
//!
//! Shared definitions for the Vesna entity synchronization core.
//!
//! This crate provides:
//! - The message schema exchanged between client and server
//!   (`InputMessage`, `StateMessage`, and the kind-tagged `Message` enum)
//! - The entity model: the `SyncedEntity` trait, the `SyncStrategy` a client
//!   uses to reconstruct a non-owned entity, and the insertion-ordered
//!   `EntityCollection`
//! - Recursive linear interpolation over field trees for entities whose
//!   state is a tree of numeric leaves
//! - Timing primitives: the injectable `Clock`, the `Interval` tick period,
//!   and the thread-backed `IntervalRunner`
//! - A typed synchronous `EventEmitter`
//!
//! ## Example
//!
//! ```
//! use vesna_protocol::{EntityId, InputMessage};
//!
//! let message = InputMessage {
//!     entity_id: EntityId::from("p1"),
//!     input: 3u32,
//!     input_sequence_number: 0,
//! };
//! assert_eq!(message.entity_id.as_str(), "p1");
//! ```

pub mod entity;
pub mod events;
pub mod interpolate;
pub mod messages;
pub mod runner;
pub mod time;

pub use entity::{EntityCollection, SyncStrategy, SyncedEntity};
pub use events::EventEmitter;
pub use interpolate::{interpolate_fields, interpolate_states, InterpolationError};
pub use messages::{EntityStateUpdate, InputMessage, Message, Payload, StateMessage};
pub use runner::{Interval, IntervalRunner};
pub use time::{Clock, SystemClock, VirtualClock};

use serde::{Deserialize, Serialize};

/// Client identifier used to key per-client transport slots and input
/// acknowledgements on the server.
///
/// The id is assigned by the application when a client connects. It is never
/// part of a wire message; messages reach the server already associated with
/// the sending client's slot.
pub type ClientId = uuid::Uuid;

/// Stable identifier for a synchronized entity.
///
/// Entity ids are chosen by the application (server side) and travel inside
/// every `InputMessage` and `StateMessage`. Two entities never share an id,
/// and an entity keeps its id for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
