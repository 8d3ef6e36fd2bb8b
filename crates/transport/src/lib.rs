//! # Vesna Transport
//!
//! Message buffers between the two endpoints of a synchronized simulation.
//!
//! The core never blocks on the network: each endpoint drains its side of a
//! [`TwoWayBuffer`] during its tick and sends without waiting. This crate
//! defines that contract and provides [`MemoryNetwork`], an in-process
//! implementation with configurable per-client latency. The in-memory
//! network is what makes the synchronization core testable without sockets;
//! a real transport substituted for it must preserve per-sender FIFO order
//! or client reconciliation breaks.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use vesna_protocol::VirtualClock;
//! use vesna_transport::{MemoryNetwork, TwoWayBuffer};
//!
//! let clock = Arc::new(VirtualClock::new(0));
//! let network: MemoryNetwork<u32, u32> = MemoryNetwork::new(clock.clone());
//!
//! let client_id = Uuid::new_v4();
//! let mut client = network.connect(client_id, 50);
//! let mut server = network.server_endpoint(client_id);
//!
//! client.send(vec![1, 2]).unwrap();
//! assert!(server.receive().is_empty()); // still in flight
//!
//! clock.advance(50);
//! assert_eq!(server.receive(), vec![1, 2]);
//! ```

mod error;
mod memory;

pub use error::{Result, TransportError};
pub use memory::{ClientEndpoint, MemoryNetwork, NetworkEvent, ServerEndpoint};

/// One endpoint's view of a bidirectional message buffer.
///
/// `receive` is non-blocking: it drains every message whose delivery time
/// has passed and returns immediately. Messages from a single sender are
/// delivered in send order, without loss or duplication; ordering across
/// senders is not defined.
pub trait TwoWayBuffer {
    /// Message type arriving at this endpoint.
    type Recv;

    /// Message type leaving this endpoint.
    type Send;

    /// Enqueues a batch of messages toward the peer. The whole batch shares
    /// one delivery time.
    fn send(&mut self, messages: Vec<Self::Send>) -> Result<()>;

    /// Enqueues a single message toward the peer.
    fn send_one(&mut self, message: Self::Send) -> Result<()> {
        self.send(vec![message])
    }

    /// Drains every message that is ready, in FIFO order. A not-yet-ready
    /// batch stops the drain: later batches stay queued behind it even when
    /// their own delivery time has passed.
    fn receive(&mut self) -> Vec<Self::Recv>;
}
