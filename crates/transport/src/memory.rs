//! In-memory transport with configurable latency
//!
//! [`MemoryNetwork`] keeps one slot per connected client, each holding a
//! pair of FIFO queues (client → server, server → client). Every enqueued
//! batch records the time it becomes deliverable (`now + lag_ms`), and
//! receives drain only ready batches, preserving head-of-line order: a
//! batch that is not ready yet blocks everything behind it.
//!
//! Server-sent batches carry a reference count, one per recipient,
//! decremented as each recipient receives the batch. The count exists for
//! introspection in tests; delivery does not depend on it.
//!
//! The network value is a cheap handle over shared interior state, so one
//! network can be cloned into the server and every client of a test.

use crate::{Result, TransportError, TwoWayBuffer};
use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use vesna_protocol::{ClientId, Clock, EventEmitter};

/// Observable transport activity, emitted synchronously on every send.
///
/// Listeners run on the sending endpoint's thread while the network lock is
/// held, so they must not call back into the network.
#[derive(Debug, Clone)]
pub enum NetworkEvent<C2S, S2C> {
    /// A client enqueued a batch toward the server.
    ClientSentMessages {
        client_id: ClientId,
        messages: Vec<C2S>,
    },

    /// The server enqueued a batch toward one or more clients.
    ServerSentMessages {
        recipients: Vec<ClientId>,
        messages: Vec<S2C>,
    },
}

struct ClientBatch<M> {
    ready_at_ms: u64,
    messages: Vec<M>,
}

struct ServerBatch<M> {
    id: u64,
    ready_at_ms: u64,
    messages: Arc<Vec<M>>,
}

struct Slot<C2S, S2C> {
    lag_ms: u64,
    to_server: VecDeque<ClientBatch<C2S>>,
    to_client: VecDeque<ServerBatch<S2C>>,
}

impl<C2S, S2C> Slot<C2S, S2C> {
    fn new(lag_ms: u64) -> Self {
        Self {
            lag_ms,
            to_server: VecDeque::new(),
            to_client: VecDeque::new(),
        }
    }
}

struct Inner<C2S, S2C> {
    slots: IndexMap<ClientId, Slot<C2S, S2C>>,
    server_batch_refs: HashMap<u64, usize>,
    next_batch_id: u64,
    events: EventEmitter<NetworkEvent<C2S, S2C>>,
}

/// Decrements a reference count, removing the entry when it reaches zero.
fn decrement_or_remove(refs: &mut HashMap<u64, usize>, id: u64) {
    if let Some(count) = refs.get_mut(&id) {
        if *count <= 1 {
            refs.remove(&id);
        } else {
            *count -= 1;
        }
    }
}

/// In-process message network between one server and its clients.
pub struct MemoryNetwork<C2S, S2C> {
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner<C2S, S2C>>>,
}

impl<C2S, S2C> Clone for MemoryNetwork<C2S, S2C> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C2S, S2C> MemoryNetwork<C2S, S2C>
where
    C2S: Clone,
    S2C: Clone,
{
    /// Creates an empty network reading time from `clock`. The same clock
    /// should drive the endpoints, or delivery times will not line up.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(Inner {
                slots: IndexMap::new(),
                server_batch_refs: HashMap::new(),
                next_batch_id: 0,
                events: EventEmitter::new(),
            })),
        }
    }

    /// Opens a slot for `client_id` with a one-way latency of `lag_ms` and
    /// returns the client's endpoint. Reconnecting an id drops anything
    /// still queued in its old slot.
    pub fn connect(&self, client_id: ClientId, lag_ms: u64) -> ClientEndpoint<C2S, S2C> {
        let mut inner = self.lock();
        if let Some(old) = inner.slots.insert(client_id, Slot::new(lag_ms)) {
            for batch in &old.to_client {
                decrement_or_remove(&mut inner.server_batch_refs, batch.id);
            }
        }
        tracing::debug!(client_id = %client_id, lag_ms, "client transport connected");
        ClientEndpoint {
            network: self.clone(),
            client_id,
        }
    }

    /// Closes a client's slot, dropping anything still queued.
    pub fn disconnect(&self, client_id: ClientId) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.shift_remove(&client_id) {
            for batch in &slot.to_client {
                decrement_or_remove(&mut inner.server_batch_refs, batch.id);
            }
            tracing::debug!(client_id = %client_id, "client transport disconnected");
        }
    }

    /// The server's endpoint for one client's slot.
    pub fn server_endpoint(&self, client_id: ClientId) -> ServerEndpoint<C2S, S2C> {
        ServerEndpoint {
            network: self.clone(),
            client_id,
        }
    }

    /// Changes a connected client's one-way latency. Batches already in
    /// flight keep their original delivery times.
    pub fn set_lag(&self, client_id: ClientId, lag_ms: u64) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner
            .slots
            .get_mut(&client_id)
            .ok_or(TransportError::UnknownClient(client_id))?;
        slot.lag_ms = lag_ms;
        Ok(())
    }

    /// Connected client ids, in connection order.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.lock().slots.keys().copied().collect()
    }

    /// Enqueues one shared batch toward every connected client. The batch's
    /// reference count starts at the number of recipients.
    pub fn broadcast(&self, messages: Vec<S2C>) -> Result<()> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        let recipients: Vec<ClientId> = inner.slots.keys().copied().collect();
        if recipients.is_empty() {
            return Ok(());
        }

        let id = inner.next_batch_id;
        inner.next_batch_id += 1;
        inner.server_batch_refs.insert(id, recipients.len());

        let shared = Arc::new(messages);
        for slot in inner.slots.values_mut() {
            slot.to_client.push_back(ServerBatch {
                id,
                ready_at_ms: now + slot.lag_ms,
                messages: Arc::clone(&shared),
            });
        }

        let event = NetworkEvent::ServerSentMessages {
            recipients,
            messages: shared.as_ref().clone(),
        };
        inner.events.emit(&event);
        Ok(())
    }

    /// Subscribes to send events.
    pub fn on_event(&self, listener: impl FnMut(&NetworkEvent<C2S, S2C>) + Send + 'static) {
        self.lock().events.on(listener);
    }

    /// Number of client → server batches queued for `client_id`, ready or
    /// not.
    pub fn pending_to_server(&self, client_id: ClientId) -> Result<usize> {
        let inner = self.lock();
        inner
            .slots
            .get(&client_id)
            .map(|slot| slot.to_server.len())
            .ok_or(TransportError::UnknownClient(client_id))
    }

    /// Number of server → client batches queued for `client_id`, ready or
    /// not.
    pub fn pending_to_client(&self, client_id: ClientId) -> Result<usize> {
        let inner = self.lock();
        inner
            .slots
            .get(&client_id)
            .map(|slot| slot.to_client.len())
            .ok_or(TransportError::UnknownClient(client_id))
    }

    /// Number of server-sent batches at least one recipient has not yet
    /// received.
    pub fn unreceived_server_batches(&self) -> usize {
        self.lock().server_batch_refs.len()
    }

    fn send_from_client(&self, client_id: ClientId, messages: Vec<C2S>) -> Result<()> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        let slot = inner
            .slots
            .get_mut(&client_id)
            .ok_or(TransportError::SendBeforeConnect(client_id))?;
        slot.to_server.push_back(ClientBatch {
            ready_at_ms: now + slot.lag_ms,
            messages: messages.clone(),
        });

        let event = NetworkEvent::ClientSentMessages {
            client_id,
            messages,
        };
        inner.events.emit(&event);
        Ok(())
    }

    fn send_to_client(&self, client_id: ClientId, messages: Vec<S2C>) -> Result<()> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        if !inner.slots.contains_key(&client_id) {
            return Err(TransportError::SendBeforeConnect(client_id));
        }
        let id = inner.next_batch_id;
        inner.next_batch_id += 1;
        inner.server_batch_refs.insert(id, 1);

        let slot = inner.slots.get_mut(&client_id).expect("slot just checked");
        slot.to_client.push_back(ServerBatch {
            id,
            ready_at_ms: now + slot.lag_ms,
            messages: Arc::new(messages.clone()),
        });

        let event = NetworkEvent::ServerSentMessages {
            recipients: vec![client_id],
            messages,
        };
        inner.events.emit(&event);
        Ok(())
    }

    fn receive_for_server(&self, client_id: ClientId) -> Vec<C2S> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        let Some(slot) = inner.slots.get_mut(&client_id) else {
            return Vec::new();
        };

        let mut drained = Vec::new();
        while slot
            .to_server
            .front()
            .is_some_and(|batch| batch.ready_at_ms <= now)
        {
            let batch = slot.to_server.pop_front().expect("front just checked");
            drained.extend(batch.messages);
        }
        drained
    }

    fn receive_for_client(&self, client_id: ClientId) -> Vec<S2C> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        let mut drained = Vec::new();
        let mut received_ids = Vec::new();
        if let Some(slot) = inner.slots.get_mut(&client_id) {
            while slot
                .to_client
                .front()
                .is_some_and(|batch| batch.ready_at_ms <= now)
            {
                let batch = slot.to_client.pop_front().expect("front just checked");
                received_ids.push(batch.id);
                drained.extend(batch.messages.iter().cloned());
            }
        }
        for id in received_ids {
            decrement_or_remove(&mut inner.server_batch_refs, id);
        }
        drained
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C2S, S2C>> {
        self.inner.lock().expect("transport state poisoned")
    }
}

/// A client's side of its buffer pair: sends inputs, receives snapshots.
pub struct ClientEndpoint<C2S, S2C> {
    network: MemoryNetwork<C2S, S2C>,
    client_id: ClientId,
}

impl<C2S: Clone, S2C: Clone> ClientEndpoint<C2S, S2C> {
    /// The client this endpoint belongs to.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

impl<C2S: Clone, S2C: Clone> TwoWayBuffer for ClientEndpoint<C2S, S2C> {
    type Recv = S2C;
    type Send = C2S;

    fn send(&mut self, messages: Vec<C2S>) -> Result<()> {
        self.network.send_from_client(self.client_id, messages)
    }

    fn receive(&mut self) -> Vec<S2C> {
        self.network.receive_for_client(self.client_id)
    }
}

/// The server's side of one client's buffer pair: sends snapshots,
/// receives inputs.
pub struct ServerEndpoint<C2S, S2C> {
    network: MemoryNetwork<C2S, S2C>,
    client_id: ClientId,
}

impl<C2S: Clone, S2C: Clone> ServerEndpoint<C2S, S2C> {
    /// The client whose slot this endpoint reads and writes.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

impl<C2S: Clone, S2C: Clone> TwoWayBuffer for ServerEndpoint<C2S, S2C> {
    type Recv = C2S;
    type Send = S2C;

    fn send(&mut self, messages: Vec<S2C>) -> Result<()> {
        self.network.send_to_client(self.client_id, messages)
    }

    fn receive(&mut self) -> Vec<C2S> {
        self.network.receive_for_server(self.client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vesna_protocol::VirtualClock;

    fn network() -> (Arc<VirtualClock>, MemoryNetwork<u32, u32>) {
        let clock = Arc::new(VirtualClock::new(0));
        let network = MemoryNetwork::new(clock.clone() as Arc<dyn Clock>);
        (clock, network)
    }

    #[test]
    fn messages_arrive_after_lag() {
        let (clock, network) = network();
        let id = ClientId::new_v4();
        let mut client = network.connect(id, 100);
        let mut server = network.server_endpoint(id);

        client.send(vec![7]).unwrap();
        assert!(server.receive().is_empty());

        clock.advance(99);
        assert!(server.receive().is_empty());

        clock.advance(1);
        assert_eq!(server.receive(), vec![7]);
        assert!(server.receive().is_empty());
    }

    #[test]
    fn per_sender_fifo_is_preserved() {
        let (clock, network) = network();
        let id = ClientId::new_v4();
        let mut client = network.connect(id, 10);
        let mut server = network.server_endpoint(id);

        client.send(vec![1, 2]).unwrap();
        client.send(vec![3]).unwrap();
        clock.advance(10);
        assert_eq!(server.receive(), vec![1, 2, 3]);
    }

    #[test]
    fn head_of_line_batch_blocks_later_ready_batches() {
        let (clock, network) = network();
        let id = ClientId::new_v4();
        let mut client = network.connect(id, 100);
        let mut server = network.server_endpoint(id);

        // m1 at t=0 with lag 100, m2 at t=5 with lag 10
        client.send(vec![1]).unwrap();
        clock.set(5);
        network.set_lag(id, 10).unwrap();
        client.send(vec![2]).unwrap();

        clock.set(50);
        assert!(server.receive().is_empty());

        clock.set(100);
        assert_eq!(server.receive(), vec![1, 2]);
    }

    #[test]
    fn send_before_connect_fails() {
        let (_clock, network) = network();
        let stranger = ClientId::new_v4();
        let mut server = network.server_endpoint(stranger);
        assert_eq!(
            server.send(vec![1]),
            Err(TransportError::SendBeforeConnect(stranger))
        );
    }

    #[test]
    fn broadcast_refcount_drops_to_zero_as_clients_receive() {
        let (clock, network) = network();
        let a = ClientId::new_v4();
        let b = ClientId::new_v4();
        let mut client_a = network.connect(a, 0);
        let mut client_b = network.connect(b, 0);

        network.broadcast(vec![9]).unwrap();
        assert_eq!(network.unreceived_server_batches(), 1);

        clock.advance(1);
        assert_eq!(client_a.receive(), vec![9]);
        assert_eq!(network.unreceived_server_batches(), 1);

        assert_eq!(client_b.receive(), vec![9]);
        assert_eq!(network.unreceived_server_batches(), 0);
    }

    #[test]
    fn decrement_or_remove_deletes_at_one() {
        let mut refs = HashMap::new();
        refs.insert(1, 2);

        decrement_or_remove(&mut refs, 1);
        assert_eq!(refs.get(&1), Some(&1));

        decrement_or_remove(&mut refs, 1);
        assert!(!refs.contains_key(&1));

        // unknown ids are ignored
        decrement_or_remove(&mut refs, 42);
    }

    #[test]
    fn send_events_fire_synchronously() {
        let (_clock, network) = network();
        let id = ClientId::new_v4();
        let mut client = network.connect(id, 0);
        let mut server = network.server_endpoint(id);

        let client_sends = Arc::new(AtomicUsize::new(0));
        let server_sends = Arc::new(AtomicUsize::new(0));
        let (c, s) = (Arc::clone(&client_sends), Arc::clone(&server_sends));
        network.on_event(move |event| match event {
            NetworkEvent::ClientSentMessages { messages, .. } => {
                assert_eq!(messages, &vec![1]);
                c.fetch_add(1, Ordering::SeqCst);
            }
            NetworkEvent::ServerSentMessages { messages, .. } => {
                assert_eq!(messages, &vec![2]);
                s.fetch_add(1, Ordering::SeqCst);
            }
        });

        client.send(vec![1]).unwrap();
        assert_eq!(client_sends.load(Ordering::SeqCst), 1);

        server.send(vec![2]).unwrap();
        assert_eq!(server_sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnect_drops_queued_batches_and_refs() {
        let (clock, network) = network();
        let id = ClientId::new_v4();
        let _client = network.connect(id, 0);
        let mut server = network.server_endpoint(id);

        server.send(vec![1]).unwrap();
        assert_eq!(network.unreceived_server_batches(), 1);

        network.disconnect(id);
        assert_eq!(network.unreceived_server_batches(), 0);
        assert!(network.client_ids().is_empty());

        clock.advance(1);
        assert_eq!(server.send(vec![2]), Err(TransportError::SendBeforeConnect(id)));
    }

    #[test]
    fn receive_on_unknown_slot_is_empty() {
        let (_clock, network) = network();
        let mut server = network.server_endpoint(ClientId::new_v4());
        assert!(server.receive().is_empty());
    }
}
