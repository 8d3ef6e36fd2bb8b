use thiserror::Error;
use vesna_protocol::EntityId;
use vesna_transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientSyncError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The entity handler returned an entity whose id does not match the
    /// state message it was built from. Handler contract violation; fatal.
    #[error("entity handler returned id `{actual}` for a state message about `{expected}`")]
    EntityIdMismatch { expected: EntityId, actual: EntityId },

    /// An entity that was just instantiated is missing from the
    /// collection. Programming error; fatal.
    #[error("entity `{0}` missing after instantiation")]
    InternalInconsistency(EntityId),
}

/// Result type for client synchronization operations
pub type Result<T> = std::result::Result<T, ClientSyncError>;
