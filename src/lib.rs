//! # Vesna
//!
//! A client–server entity synchronization core for soft-realtime
//! simulations, with support for:
//! - Client-side prediction with server reconciliation for entities owned
//!   by the local participant
//! - Snapshot interpolation and dead reckoning for entities owned by
//!   remote participants
//! - Server-side lag compensation with bounded historical resimulation
//! - An in-memory transport with configurable per-client latency for
//!   testing without sockets
//!
//! ## Components
//!
//! - `vesna-protocol`: message schema, entity model, timing primitives
//! - `vesna-transport`: two-way buffers and the in-memory lagged network
//! - `vesna-client`: the predicting endpoint
//! - `vesna-server`: the authoritative endpoint
//!
//! ## Example
//!
//! See the integration tests in `tests/` for complete client–server
//! round trips.

pub use vesna_client as client;
pub use vesna_protocol as protocol;
pub use vesna_server as server;
pub use vesna_transport as transport;
