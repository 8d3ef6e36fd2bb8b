use thiserror::Error;
use vesna_protocol::ClientId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A send was attempted for a client with no transport slot. This is
    /// test misuse: connect the client first.
    #[error("send before connect: no transport slot for client {0}")]
    SendBeforeConnect(ClientId),

    /// An operation referenced a client the network does not know.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
