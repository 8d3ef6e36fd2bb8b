use thiserror::Error;
use vesna_transport::TransportError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// A snapshot was recorded at or before the latest recorded timestamp.
    /// Indicates tick-rate misconfiguration; the server treats this as
    /// fatal.
    #[error("non-monotonic timestamp: {timestamp_ms} is not after {latest_ms}")]
    NonMonotonicTimestamp { timestamp_ms: u64, latest_ms: u64 },

    /// A rewrite targeted a timestamp with no recorded entry. Indicates a
    /// resimulation bug; fatal.
    #[error("no history entry at timestamp {timestamp_ms}")]
    NoSuchTimestamp { timestamp_ms: u64 },
}

#[derive(Debug, Error)]
pub enum ServerSyncError {
    #[error("history: {0}")]
    History(#[from] HistoryError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for server synchronization operations
pub type Result<T> = std::result::Result<T, ServerSyncError>;
