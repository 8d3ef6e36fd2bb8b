//! # Vesna Client
//!
//! The predicting side of the synchronization core.
//!
//! Each tick the client drains authoritative state messages, then, once
//! connected (it knows at least one entity), collects inputs, sends them,
//! and applies them locally without waiting for the server. When a
//! snapshot for an owned entity arrives, the client adopts the
//! authoritative state and replays the inputs the server has not yet
//! acknowledged, so the predicted state stays a pure fold of inputs over
//! the authoritative one. Entities owned by other participants are
//! reconstructed per their sync strategy: adopted raw, interpolated
//! between buffered snapshots at a render timestamp one server tick in the
//! past, or dead-reckoned forward from the latest snapshot.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use vesna_client::{ClientConfig, ClientSyncer, ScriptedInputs};
//! use vesna_protocol::SystemClock;
//! use vesna_transport::MemoryNetwork;
//! # use serde::{Deserialize, Serialize};
//! # use vesna_client::{NewEntityHandler, NonLocalEntity};
//! # use vesna_protocol::{EntityId, StateMessage, SyncStrategy, SyncedEntity};
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
//! # struct PawnHandler;
//! # impl NewEntityHandler<Pawn> for PawnHandler {
//! #     fn create_local_entity(&mut self, m: &StateMessage<Pos>) -> Pawn {
//! #         Pawn { id: m.entity.id.clone(), pos: m.entity.state.clone() }
//! #     }
//! #     fn create_non_local_entity(&mut self, m: &StateMessage<Pos>) -> NonLocalEntity<Pawn> {
//! #         NonLocalEntity {
//! #             entity: Pawn { id: m.entity.id.clone(), pos: m.entity.state.clone() },
//! #             sync_strategy: SyncStrategy::Interpolation,
//! #         }
//! #     }
//! # }
//!
//! let clock = Arc::new(SystemClock);
//! let network = MemoryNetwork::new(clock.clone());
//! let client_id = Uuid::new_v4();
//! let buffer = network.connect(client_id, 50);
//!
//! let mut client = ClientSyncer::<Pawn, _>::new(
//!     buffer,
//!     PawnHandler,
//!     ScriptedInputs::<Move>::new(),
//!     clock,
//!     ClientConfig::default(),
//! );
//! client.tick().unwrap();
//! ```

mod error;
mod handler;
mod input;
mod state_buffer;

pub use error::{ClientSyncError, Result};
pub use handler::{CheckedNewEntityHandler, NewEntityHandler, NonLocalEntity};
pub use input::{EntityInput, InputCollectionStrategy, ScriptedInputs};
pub use state_buffer::EntityStateBuffer;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use vesna_protocol::{
    Clock, EntityCollection, EntityId, EventEmitter, InputMessage, Interval, IntervalRunner,
    StateMessage, SyncStrategy, SyncedEntity,
};
use vesna_transport::TwoWayBuffer;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The server's snapshot rate. The render timestamp for interpolation
    /// trails the clock by one server update period, so that two
    /// bracketing snapshots have normally arrived.
    pub server_update_rate_hz: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_update_rate_hz: 10.0,
        }
    }
}

/// Client-side entity synchronizer.
///
/// Owns its local entity collection, pending-input queue, and per-entity
/// snapshot buffers exclusively. "Connected" means at least one entity is
/// known; until the first state message arrives, ticks do nothing beyond
/// draining the transport.
pub struct ClientSyncer<E, B>
where
    E: SyncedEntity,
    B: TwoWayBuffer<Recv = StateMessage<E::State>, Send = InputMessage<E::Input>>,
{
    clock: Arc<dyn Clock>,
    transport: B,
    handler: CheckedNewEntityHandler<E>,
    input_strategy: Box<dyn InputCollectionStrategy<E::Input>>,
    config: ClientConfig,
    entities: EntityCollection<E>,
    strategies: HashMap<EntityId, SyncStrategy>,
    player_entity_ids: HashSet<EntityId>,
    pending_inputs: Vec<InputMessage<E::Input>>,
    state_buffers: HashMap<EntityId, EntityStateBuffer<E::State>>,
    current_input_sequence_number: u64,
    last_input_collection_ms: Option<u64>,
    synchronized: EventEmitter<EntityCollection<E>>,
}

impl<E, B> ClientSyncer<E, B>
where
    E: SyncedEntity,
    B: TwoWayBuffer<Recv = StateMessage<E::State>, Send = InputMessage<E::Input>>,
{
    /// Creates a syncer over its transport buffer, entity handler, and
    /// input source.
    pub fn new(
        transport: B,
        handler: impl NewEntityHandler<E> + 'static,
        input_strategy: impl InputCollectionStrategy<E::Input> + 'static,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        Self {
            clock,
            transport,
            handler: CheckedNewEntityHandler::new(handler),
            input_strategy: Box::new(input_strategy),
            config,
            entities: EntityCollection::new(),
            strategies: HashMap::new(),
            player_entity_ids: HashSet::new(),
            pending_inputs: Vec::new(),
            state_buffers: HashMap::new(),
            current_input_sequence_number: 0,
            last_input_collection_ms: None,
            synchronized: EventEmitter::new(),
        }
    }

    /// True once at least one entity is known.
    pub fn connected(&self) -> bool {
        !self.entities.is_empty()
    }

    /// The local entity collection.
    pub fn entities(&self) -> &EntityCollection<E> {
        &self.entities
    }

    /// Ids of the entities this client owns.
    pub fn player_entity_ids(&self) -> &HashSet<EntityId> {
        &self.player_entity_ids
    }

    /// Inputs sent but not yet acknowledged by the server.
    pub fn pending_inputs(&self) -> &[InputMessage<E::Input>] {
        &self.pending_inputs
    }

    /// The sequence number the next non-empty input batch will carry.
    pub fn current_input_sequence_number(&self) -> u64 {
        self.current_input_sequence_number
    }

    /// Subscribes to the `synchronized` event, emitted at the end of every
    /// connected tick with the entity map read-only.
    pub fn on_synchronized(
        &mut self,
        listener: impl FnMut(&EntityCollection<E>) + Send + 'static,
    ) {
        self.synchronized.on(listener);
    }

    /// One client tick: drain snapshots, then (when connected) collect and
    /// predict inputs, interpolate remote entities, and emit
    /// `synchronized`.
    pub fn tick(&mut self) -> Result<()> {
        self.process_server_messages()?;
        if !self.connected() {
            return Ok(());
        }
        self.process_inputs()?;
        self.interpolate_entities();
        self.synchronized.emit(&self.entities);
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
                let mut syncer = syncer.lock().expect("client syncer poisoned");
                if let Err(error) = syncer.tick() {
                    tracing::error!(%error, "client tick failed");
                }
            },
            Interval::from_hz(rate_hz),
        );
        runner.start();
        runner
    }

    fn process_server_messages(&mut self) -> Result<()> {
        let now_ms = self.clock.now_ms();
        for message in self.transport.receive() {
            self.process_state_message(message, now_ms)?;
        }
        Ok(())
    }

    fn process_state_message(
        &mut self,
        message: StateMessage<E::State>,
        now_ms: u64,
    ) -> Result<()> {
        let entity_id = message.entity.id.clone();
        if !self.entities.contains(&entity_id) {
            self.register_entity(&message)?;
        }

        if self.player_entity_ids.contains(&entity_id) {
            let entity = self
                .entities
                .get_mut(&entity_id)
                .ok_or_else(|| ClientSyncError::InternalInconsistency(entity_id.clone()))?;
            entity.set_state(message.entity.state.clone());
            self.reconcile(&message);
            return Ok(());
        }

        let strategy = self
            .strategies
            .get(&entity_id)
            .copied()
            .ok_or_else(|| ClientSyncError::InternalInconsistency(entity_id.clone()))?;
        match strategy {
            SyncStrategy::Raw => {
                let entity = self
                    .entities
                    .get_mut(&entity_id)
                    .ok_or_else(|| ClientSyncError::InternalInconsistency(entity_id.clone()))?;
                entity.set_state(message.entity.state);
            }
            SyncStrategy::DeadReckoning => {
                let entity = self
                    .entities
                    .get_mut(&entity_id)
                    .ok_or_else(|| ClientSyncError::InternalInconsistency(entity_id.clone()))?;
                entity.set_state(message.entity.state);
                entity.reckon(now_ms.saturating_sub(message.timestamp_ms));
            }
            SyncStrategy::Interpolation => {
                self.state_buffers
                    .entry(entity_id)
                    .or_default()
                    .record(now_ms, message.entity.state);
            }
        }
        Ok(())
    }

    fn register_entity(&mut self, message: &StateMessage<E::State>) -> Result<()> {
        if message.entity.belongs_to_recipient_client {
            let entity = self.handler.create_local_entity(message)?;
            tracing::debug!(entity_id = %entity.id(), "created local player entity");
            self.player_entity_ids.insert(entity.id().clone());
            self.entities.add(entity);
        } else {
            let NonLocalEntity {
                entity,
                sync_strategy,
            } = self.handler.create_non_local_entity(message)?;
            let entity_id = entity.id().clone();
            tracing::debug!(
                entity_id = %entity_id,
                strategy = ?sync_strategy,
                "created non-local entity"
            );
            self.strategies.insert(entity_id.clone(), sync_strategy);
            if sync_strategy == SyncStrategy::Interpolation {
                self.state_buffers
                    .insert(entity_id, EntityStateBuffer::new());
            }
            self.entities.add(entity);
        }
        Ok(())
    }

    /// Drops acknowledged inputs, then replays the rest in sequence order
    /// over the just-adopted authoritative state.
    fn reconcile(&mut self, message: &StateMessage<E::State>) {
        let acknowledged = message.last_processed_input_sequence_number;
        self.pending_inputs
            .retain(|input| input.input_sequence_number > acknowledged);
        tracing::debug!(
            entity_id = %message.entity.id,
            acknowledged,
            replayed = self.pending_inputs.len(),
            "reconciling against authoritative state"
        );

        for pending in &self.pending_inputs {
            match self.entities.get_mut(&pending.entity_id) {
                Some(entity) => entity.apply_input(&pending.input),
                None => tracing::warn!(
                    entity_id = %pending.entity_id,
                    sequence = pending.input_sequence_number,
                    "dropping pending input for unknown entity"
                ),
            }
        }
    }

    fn process_inputs(&mut self) -> Result<()> {
        let now_ms = self.clock.now_ms();
        let last_ms = self.last_input_collection_ms.unwrap_or(now_ms);
        self.last_input_collection_ms = Some(now_ms);

        let inputs = self
            .input_strategy
            .collect_inputs(now_ms.saturating_sub(last_ms));
        if inputs.is_empty() {
            return Ok(());
        }

        let mut batch = Vec::with_capacity(inputs.len());
        for EntityInput { entity_id, input } in inputs {
            let Some(entity) = self.entities.get_mut(&entity_id) else {
                tracing::warn!(%entity_id, "dropping collected input for unknown entity");
                continue;
            };
            let message = InputMessage {
                entity_id,
                input,
                input_sequence_number: self.current_input_sequence_number,
            };
            entity.apply_input(&message.input);
            self.pending_inputs.push(message.clone());
            batch.push(message);
        }
        if batch.is_empty() {
            return Ok(());
        }

        self.transport.send(batch)?;
        self.current_input_sequence_number += 1;
        Ok(())
    }

    /// Moves every remote interpolated entity to the render timestamp, one
    /// server update period behind now. Owned entities are never
    /// interpolated: their truth is prediction plus reconciliation.
    fn interpolate_entities(&mut self) {
        let now_ms = self.clock.now_ms();
        let render_ts =
            now_ms.saturating_sub((1_000.0 / self.config.server_update_rate_hz) as u64);

        for (entity_id, entity) in self.entities.iter_mut() {
            if self.player_entity_ids.contains(entity_id) {
                continue;
            }
            if self.strategies.get(entity_id) != Some(&SyncStrategy::Interpolation) {
                continue;
            }
            let Some(buffer) = self.state_buffers.get_mut(entity_id) else {
                continue;
            };

            buffer.discard_passed(render_ts);
            if let Some(((t0, from), (t1, to))) = buffer.bracket(render_ts) {
                let ratio = if t1 > t0 {
                    (render_ts - t0) as f64 / (t1 - t0) as f64
                } else {
                    1.0
                };
                entity.interpolate(from, to, ratio);
            }
        }
    }
}
