//! # Vesna Server
//!
//! The authoritative side of the synchronization core.
//!
//! Each tick the server drains client inputs in per-client FIFO order and
//! applies them deterministically, advances any game-driven simulation,
//! records a world snapshot into the timestamped history, and sends every
//! client one state message per entity, marking the entities that client
//! owns so it can reconcile its predictions against them.
//!
//! Delayed client actions (hits, pickups) go through lag compensation: the
//! history frame at the client's perceived time is located, the action
//! applied there, and later frames resimulated forward in place.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use vesna_protocol::SystemClock;
//! use vesna_server::{ServerConfig, ServerSyncer};
//! use vesna_transport::MemoryNetwork;
//! # use serde::{Deserialize, Serialize};
//! # use vesna_protocol::{EntityId, SyncedEntity};
//! # #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! # struct Pos { x: f64 }
//! # #[derive(Debug, Clone, Serialize, Deserialize)]
//! # struct Move { dx: f64 }
//! # struct Pawn { id: EntityId, pos: Pos }
//! # impl SyncedEntity for Pawn {
//! #     type State = Pos;
//! #     type Input = Move;
//! #     fn id(&self) -> &EntityId { &self.id }
//! #     fn state(&self) -> Pos { self.pos.clone() }
//! #     fn set_state(&mut self, state: Pos) { self.pos = state; }
//! #     fn apply_input(&mut self, input: &Move) { self.pos.x += input.dx; }
//! # }
//!
//! let clock = Arc::new(SystemClock);
//! let network = MemoryNetwork::new(clock.clone());
//! let mut server: ServerSyncer<Pawn, _> = ServerSyncer::new(clock, ServerConfig::default());
//!
//! let client_id = Uuid::new_v4();
//! let _client_buffer = network.connect(client_id, 50);
//! server.connect_client(client_id, network.server_endpoint(client_id));
//! server.add_entity(
//!     Pawn { id: EntityId::from("p1"), pos: Pos { x: 0.0 } },
//!     Some(client_id),
//! );
//!
//! server.tick().unwrap();
//! ```

mod compensation;
mod error;
mod history;

pub use compensation::{
    process_request, CompensationContext, LagCompensationRequest, LagCompensator,
    ResimulationStep,
};
pub use error::{HistoryError, Result, ServerSyncError};
pub use history::TimestampedBuffer;

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use vesna_protocol::{
    ClientId, Clock, EntityCollection, EntityId, EntityStateUpdate, InputMessage, Interval,
    IntervalRunner, StateMessage, SyncedEntity,
};
use vesna_transport::TwoWayBuffer;

/// The world snapshot recorded into history each tick: every entity's
/// state, keyed by id in entity registration order.
pub type WorldState<S> = IndexMap<EntityId, S>;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Rolling history window for lag compensation. Should cover the
    /// worst-case client round trip; requests older than this are rejected.
    pub history_window_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            history_window_ms: 1_000,
        }
    }
}

/// Authoritative entity synchronizer.
///
/// Owns the entity collection and the snapshot history exclusively. Clients
/// are registered with their server-side transport endpoints; the tick
/// polls them in registration order (cross-client ordering is
/// implementation-defined, and this is the definition).
pub struct ServerSyncer<E, B>
where
    E: SyncedEntity,
    B: TwoWayBuffer<Recv = InputMessage<E::Input>, Send = StateMessage<E::State>>,
{
    clock: Arc<dyn Clock>,
    entities: EntityCollection<E>,
    owners: HashMap<EntityId, ClientId>,
    clients: IndexMap<ClientId, B>,
    last_processed: HashMap<ClientId, HashMap<EntityId, u64>>,
    history: TimestampedBuffer<WorldState<E::State>>,
    simulation_step: Option<Box<dyn FnMut(&mut EntityCollection<E>, u64) + Send>>,
}

impl<E, B> ServerSyncer<E, B>
where
    E: SyncedEntity,
    B: TwoWayBuffer<Recv = InputMessage<E::Input>, Send = StateMessage<E::State>>,
{
    /// Creates a syncer with no clients and no entities.
    pub fn new(clock: Arc<dyn Clock>, config: ServerConfig) -> Self {
        Self {
            clock,
            entities: EntityCollection::new(),
            owners: HashMap::new(),
            clients: IndexMap::new(),
            last_processed: HashMap::new(),
            history: TimestampedBuffer::new(config.history_window_ms),
            simulation_step: None,
        }
    }

    /// Registers a client and the endpoint its inputs arrive on. The tick
    /// polls clients in registration order.
    pub fn connect_client(&mut self, client_id: ClientId, buffer: B) {
        self.clients.insert(client_id, buffer);
        tracing::debug!(client_id = %client_id, "client registered");
    }

    /// Unregisters a client, dropping its endpoint, acknowledgement
    /// bookkeeping, and ownership marks. Its entities stay in the world,
    /// unowned.
    pub fn remove_client(&mut self, client_id: ClientId) {
        self.clients.shift_remove(&client_id);
        self.last_processed.remove(&client_id);
        self.owners.retain(|_, owner| *owner != client_id);
        tracing::debug!(client_id = %client_id, "client removed");
    }

    /// Adds an entity to the world, optionally owned by a client. Owned
    /// entities are the ones that client predicts and reconciles.
    pub fn add_entity(&mut self, entity: E, owner: Option<ClientId>) {
        if let Some(client_id) = owner {
            self.owners.insert(entity.id().clone(), client_id);
        }
        self.entities.add(entity);
    }

    /// Installs the server-driven part of the simulation (environment, AI),
    /// run once per tick after client inputs are applied.
    pub fn set_simulation_step(
        &mut self,
        step: impl FnMut(&mut EntityCollection<E>, u64) + Send + 'static,
    ) {
        self.simulation_step = Some(Box::new(step));
    }

    /// The authoritative entities.
    pub fn entities(&self) -> &EntityCollection<E> {
        &self.entities
    }

    /// Mutable access to one entity, for game code outside the input path.
    pub fn entity_mut(&mut self, id: &EntityId) -> Option<&mut E> {
        self.entities.get_mut(id)
    }

    /// The snapshot history.
    pub fn history(&self) -> &TimestampedBuffer<WorldState<E::State>> {
        &self.history
    }

    /// Highest input sequence number applied for a client's entity.
    pub fn last_processed_input(&self, client_id: ClientId, entity_id: &EntityId) -> Option<u64> {
        self.last_processed
            .get(&client_id)
            .and_then(|acks| acks.get(entity_id))
            .copied()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// One authoritative tick: drain and apply inputs, advance the
    /// simulation, snapshot, broadcast.
    pub fn tick(&mut self) -> Result<()> {
        let now_ms = self.clock.now_ms();

        self.apply_client_inputs();
        if let Some(step) = &mut self.simulation_step {
            step(&mut self.entities, now_ms);
        }
        let world = self.world_state();
        self.history.record(now_ms, world)?;
        self.broadcast_state(now_ms)?;
        Ok(())
    }

    /// Runs a shared syncer at a fixed tick rate until the returned runner
    /// is stopped. Tick errors are fatal by policy and logged; the runner
    /// keeps going so the error is observable.
    pub fn start(syncer: Arc<Mutex<Self>>, rate_hz: f64) -> IntervalRunner
    where
        B: Send + 'static,
    {
        let mut runner = IntervalRunner::new(
            move || {
                let mut syncer = syncer.lock().expect("server syncer poisoned");
                if let Err(error) = syncer.tick() {
                    tracing::error!(%error, "server tick failed");
                }
            },
            Interval::from_hz(rate_hz),
        );
        runner.start();
        runner
    }

    /// Evaluates a lag compensation request against the history.
    ///
    /// On success the rewritten present (the latest history frame) is
    /// adopted as the live entity state, so the compensated change
    /// survives into subsequent ticks instead of being overwritten by the
    /// next snapshot.
    pub fn process_request<C>(
        &mut self,
        request: &C::Request,
        compensator: &C,
    ) -> std::result::Result<bool, HistoryError>
    where
        C: LagCompensator<WorldState<E::State>>,
    {
        let now_ms = self.clock.now_ms();
        let accepted = process_request(&mut self.history, compensator, request, now_ms)?;
        if accepted {
            self.adopt_latest_frame();
        }
        Ok(accepted)
    }

    fn apply_client_inputs(&mut self) {
        for (client_id, buffer) in self.clients.iter_mut() {
            for message in buffer.receive() {
                let Some(entity) = self.entities.get_mut(&message.entity_id) else {
                    tracing::warn!(
                        client_id = %client_id,
                        entity_id = %message.entity_id,
                        sequence = message.input_sequence_number,
                        "dropping input for unknown entity"
                    );
                    continue;
                };
                entity.apply_input(&message.input);
                self.last_processed
                    .entry(*client_id)
                    .or_default()
                    .insert(message.entity_id.clone(), message.input_sequence_number);
                tracing::debug!(
                    client_id = %client_id,
                    entity_id = %message.entity_id,
                    sequence = message.input_sequence_number,
                    "applied client input"
                );
            }
        }
    }

    fn world_state(&self) -> WorldState<E::State> {
        self.entities
            .iter()
            .map(|(id, entity)| (id.clone(), entity.state()))
            .collect()
    }

    fn broadcast_state(&mut self, now_ms: u64) -> Result<()> {
        for (client_id, buffer) in self.clients.iter_mut() {
            let mut batch = Vec::with_capacity(self.entities.len());
            for (entity_id, entity) in self.entities.iter() {
                let acknowledged = self
                    .last_processed
                    .get(client_id)
                    .and_then(|acks| acks.get(entity_id))
                    .copied()
                    .unwrap_or(0);
                batch.push(StateMessage {
                    entity: EntityStateUpdate {
                        id: entity_id.clone(),
                        state: entity.state(),
                        belongs_to_recipient_client: self.owners.get(entity_id) == Some(client_id),
                    },
                    last_processed_input_sequence_number: acknowledged,
                    timestamp_ms: now_ms,
                });
            }
            buffer.send(batch)?;
        }
        Ok(())
    }

    fn adopt_latest_frame(&mut self) {
        let Some((_, frame)) = self.history.latest() else {
            return;
        };
        let frame = frame.clone();
        for (entity_id, state) in frame {
            if let Some(entity) = self.entities.get_mut(&entity_id) {
                entity.set_state(state);
            }
        }
    }
}
