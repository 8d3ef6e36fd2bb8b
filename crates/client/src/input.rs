//! Input collection seam
//!
//! Device I/O is the game's problem; the syncer only asks "what inputs
//! happened in the last `elapsed_ms`?" once per tick. Every input in one
//! answer shares a single sequence number, so the server's acknowledgement
//! covers the whole batch atomically even when one client steers several
//! entities.

use vesna_protocol::EntityId;

/// One collected input, addressed to the entity it steers.
#[derive(Debug, Clone)]
pub struct EntityInput<I> {
    pub entity_id: EntityId,
    pub input: I,
}

/// Supplies the inputs gathered since the previous collection.
///
/// Implementations should be pure with respect to elapsed time: the same
/// device state over the same elapsed window yields the same inputs.
pub trait InputCollectionStrategy<I>: Send {
    /// Inputs gathered over the last `elapsed_ms`. An empty answer means
    /// no sequence number is consumed this tick.
    fn collect_inputs(&mut self, elapsed_ms: u64) -> Vec<EntityInput<I>>;
}

/// Pops one pre-scripted batch per call; empty once exhausted. Test
/// helper, also handy for demos and replays.
#[derive(Debug)]
pub struct ScriptedInputs<I> {
    batches: std::collections::VecDeque<Vec<EntityInput<I>>>,
}

impl<I> Default for ScriptedInputs<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> ScriptedInputs<I> {
    pub fn new() -> Self {
        Self {
            batches: std::collections::VecDeque::new(),
        }
    }

    /// Queues the batch returned by the next `collect_inputs` call.
    pub fn push_batch(&mut self, batch: Vec<EntityInput<I>>) {
        self.batches.push_back(batch);
    }
}

impl<I: Send + 'static> InputCollectionStrategy<I> for ScriptedInputs<I> {
    fn collect_inputs(&mut self, _elapsed_ms: u64) -> Vec<EntityInput<I>> {
        self.batches.pop_front().unwrap_or_default()
    }
}
