//! Entity model: behavior trait, sync strategy, and the keyed collection
//!
//! An entity carries two payloads: a fully replicated `State` and a per-tick
//! `Input`. Behavior is expressed through the `SyncedEntity` trait; an
//! entity implements the capabilities its strategy needs (`apply_input` for
//! predicted local entities, `interpolate` for interpolated remotes,
//! `reckon` for dead-reckoned remotes) and leaves the rest at their
//! defaults. Games with heterogeneous entity kinds implement the trait on
//! an enum and dispatch internally.

use crate::messages::Payload;
use crate::EntityId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a client reconstructs a non-owned entity from snapshots.
///
/// Assigned per entity at creation by the client's `NewEntityHandler` and
/// fixed for the entity's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStrategy {
    /// Adopt each snapshot as it arrives, no smoothing.
    Raw,

    /// Buffer snapshots and interpolate between the two bracketing the
    /// render timestamp. No extrapolation: with fewer than two buffered
    /// snapshots the entity keeps its current state.
    Interpolation,

    /// Adopt each snapshot, then extrapolate forward by the snapshot's age.
    DeadReckoning,
}

/// A synchronized entity.
///
/// `apply_input` must be deterministic and pure with respect to the current
/// state: the client predicts by applying inputs locally and the server
/// applies the same inputs authoritatively, and the two must agree.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use vesna_protocol::{EntityId, SyncedEntity};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Pos { x: f64 }
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Move { dx: f64 }
///
/// struct Pawn { id: EntityId, pos: Pos }
///
/// impl SyncedEntity for Pawn {
///     type State = Pos;
///     type Input = Move;
///
///     fn id(&self) -> &EntityId { &self.id }
///     fn state(&self) -> Pos { self.pos.clone() }
///     fn set_state(&mut self, state: Pos) { self.pos = state; }
///     fn apply_input(&mut self, input: &Move) { self.pos.x += input.dx; }
/// }
/// ```
pub trait SyncedEntity: Send + 'static {
    /// Fully replicated state payload.
    type State: Payload + PartialEq;

    /// Per-tick command payload.
    type Input: Payload;

    /// The entity's stable id.
    fn id(&self) -> &EntityId;

    /// Snapshot of the current state.
    fn state(&self) -> Self::State;

    /// Replaces the current state (adoption of an authoritative snapshot).
    fn set_state(&mut self, state: Self::State);

    /// Applies one input deterministically.
    fn apply_input(&mut self, input: &Self::Input);

    /// Moves the entity toward `to`, `ratio` of the way from `from`.
    ///
    /// Called only for entities under the `Interpolation` strategy. The
    /// default snaps to `to`; interpolated entities override this, usually
    /// by lerping numeric fields (see `interpolate_states` for a generic
    /// field-tree walker).
    fn interpolate(&mut self, from: &Self::State, to: &Self::State, ratio: f64) {
        let _ = (from, ratio);
        self.set_state(to.clone());
    }

    /// Extrapolates the entity forward by `elapsed_ms` from its current
    /// state.
    ///
    /// Called only for entities under the `DeadReckoning` strategy, right
    /// after a snapshot is adopted, with the snapshot's age as the elapsed
    /// time. The default holds the last state.
    fn reckon(&mut self, elapsed_ms: u64) {
        let _ = elapsed_ms;
    }
}

/// Insertion-ordered collection of entities keyed by id.
///
/// Iteration yields entities in the order they were added, which keeps
/// snapshot broadcasts and input application deterministic across ticks.
/// Entity retirement is out of scope; the collection has no removal.
#[derive(Debug)]
pub struct EntityCollection<E> {
    entities: IndexMap<EntityId, E>,
}

impl<E: SyncedEntity> EntityCollection<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            entities: IndexMap::new(),
        }
    }

    /// Adds an entity, keyed by its own id. Replaces any previous entity
    /// with the same id (keeping the original insertion position).
    pub fn add(&mut self, entity: E) {
        self.entities.insert(entity.id().clone(), entity);
    }

    /// Returns the entity with the given id.
    pub fn get(&self, id: &EntityId) -> Option<&E> {
        self.entities.get(id)
    }

    /// Returns the entity with the given id, mutably.
    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut E> {
        self.entities.get_mut(id)
    }

    /// True when an entity with the given id is present.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Iterates entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &E)> {
        self.entities.iter()
    }

    /// Iterates entities mutably in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&EntityId, &mut E)> {
        self.entities.iter_mut()
    }

    /// The id-keyed map itself, for read-only consumers such as the
    /// `synchronized` event.
    pub fn as_map(&self) -> &IndexMap<EntityId, E> {
        &self.entities
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entities are present.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<E: SyncedEntity> Default for EntityCollection<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: i64,
    }

    struct CounterEntity {
        id: EntityId,
        state: Counter,
    }

    impl CounterEntity {
        fn new(id: &str, value: i64) -> Self {
            Self {
                id: EntityId::from(id),
                state: Counter { value },
            }
        }
    }

    impl SyncedEntity for CounterEntity {
        type State = Counter;
        type Input = i64;

        fn id(&self) -> &EntityId {
            &self.id
        }

        fn state(&self) -> Counter {
            self.state.clone()
        }

        fn set_state(&mut self, state: Counter) {
            self.state = state;
        }

        fn apply_input(&mut self, input: &i64) {
            self.state.value += input;
        }
    }

    #[test]
    fn collection_preserves_insertion_order() {
        let mut entities = EntityCollection::new();
        entities.add(CounterEntity::new("c", 0));
        entities.add(CounterEntity::new("a", 0));
        entities.add(CounterEntity::new("b", 0));

        let ids: Vec<&str> = entities.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn collection_lookups() {
        let mut entities = EntityCollection::new();
        assert!(entities.is_empty());

        entities.add(CounterEntity::new("a", 3));
        assert!(entities.contains(&EntityId::from("a")));
        assert!(!entities.contains(&EntityId::from("b")));
        assert_eq!(entities.len(), 1);
        assert_eq!(entities.get(&EntityId::from("a")).unwrap().state.value, 3);
    }

    #[test]
    fn default_interpolate_snaps_to_target() {
        let mut entity = CounterEntity::new("a", 0);
        entity.interpolate(&Counter { value: 0 }, &Counter { value: 10 }, 0.25);
        assert_eq!(entity.state.value, 10);
    }

    #[test]
    fn default_reckon_holds_state() {
        let mut entity = CounterEntity::new("a", 5);
        entity.reckon(250);
        assert_eq!(entity.state.value, 5);
    }
}
