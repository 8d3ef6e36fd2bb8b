//! Entity instantiation seam
//!
//! The syncer learns about entities from the server's state messages; the
//! game decides what to build for them. A `NewEntityHandler` constructs a
//! locally owned entity (predicted and reconciled) or a non-local one
//! together with the sync strategy the client should use for it. The
//! syncer talks to the handler through a checking wrapper that enforces
//! the id contract.

use crate::error::{ClientSyncError, Result};
use vesna_protocol::{StateMessage, SyncStrategy, SyncedEntity};

/// A freshly built non-local entity and how to keep it in sync.
pub struct NonLocalEntity<E> {
    pub entity: E,
    pub sync_strategy: SyncStrategy,
}

/// Builds client-side entities from the first state message that mentions
/// them.
///
/// The returned entity's id must equal `message.entity.id`; the syncer
/// fails with `EntityIdMismatch` otherwise.
pub trait NewEntityHandler<E: SyncedEntity>: Send {
    /// Builds an entity owned by this client.
    fn create_local_entity(&mut self, message: &StateMessage<E::State>) -> E;

    /// Builds an entity owned elsewhere, choosing its sync strategy.
    fn create_non_local_entity(&mut self, message: &StateMessage<E::State>) -> NonLocalEntity<E>;
}

/// Wraps a handler and verifies the id contract on every construction.
pub struct CheckedNewEntityHandler<E: SyncedEntity> {
    inner: Box<dyn NewEntityHandler<E>>,
}

impl<E: SyncedEntity> CheckedNewEntityHandler<E> {
    pub fn new(inner: impl NewEntityHandler<E> + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    pub fn create_local_entity(&mut self, message: &StateMessage<E::State>) -> Result<E> {
        let entity = self.inner.create_local_entity(message);
        Self::check_id(&entity, message)?;
        Ok(entity)
    }

    pub fn create_non_local_entity(
        &mut self,
        message: &StateMessage<E::State>,
    ) -> Result<NonLocalEntity<E>> {
        let created = self.inner.create_non_local_entity(message);
        Self::check_id(&created.entity, message)?;
        Ok(created)
    }

    fn check_id(entity: &E, message: &StateMessage<E::State>) -> Result<()> {
        if entity.id() != &message.entity.id {
            return Err(ClientSyncError::EntityIdMismatch {
                expected: message.entity.id.clone(),
                actual: entity.id().clone(),
            });
        }
        Ok(())
    }
}
