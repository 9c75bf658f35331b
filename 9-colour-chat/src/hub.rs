//! Fan-out hub that owns the set of joined clients.
//!
//! The [`Hub`] runs as a single task and is reached only through the three
//! event channels behind a [`HubHandle`]. Each event is processed to
//! completion before the next one is taken, and each handle call returns only
//! once the hub has processed it, so events from one producer are handled in
//! issue order. Across producers the order is whatever `select!` picks; the
//! hub is not linearizable across concurrent sessions.
//!
//! A member's outgoing queue is closed only here, by dropping the member's
//! [`Client`] when it leaves or is evicted.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, info};

use crate::error::HubClosed;

pub type ClientId = u64;

const EVENT_BUFFER: usize = 32;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Membership handle for one authenticated session.
///
/// Identity is the handle's id, not the username: a user who logs out and
/// back in joins under a fresh handle.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    name: String,
    outgoing: mpsc::Sender<String>,
}

impl Client {
    pub fn new(name: impl Into<String>, outgoing: mpsc::Sender<String>) -> Self {
        Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            outgoing,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Event<T> {
    payload: T,
    done: oneshot::Sender<()>,
}

#[derive(Clone)]
pub struct HubHandle {
    join_tx: mpsc::Sender<Event<Client>>,
    leave_tx: mpsc::Sender<Event<ClientId>>,
    broadcast_tx: mpsc::Sender<Event<String>>,
}

impl HubHandle {
    /// Adds the client and pushes the current roster, itself included, onto
    /// its queue before returning.
    pub async fn join(&self, client: Client) -> Result<(), HubClosed> {
        submit(&self.join_tx, client).await
    }

    /// Removes the client and closes its queue. Unknown ids are ignored.
    pub async fn leave(&self, id: ClientId) -> Result<(), HubClosed> {
        submit(&self.leave_tx, id).await
    }

    /// Offers the line to every member without waiting on any of them.
    pub async fn broadcast(&self, text: impl Into<String>) -> Result<(), HubClosed> {
        submit(&self.broadcast_tx, text.into()).await
    }
}

async fn submit<T>(tx: &mpsc::Sender<Event<T>>, payload: T) -> Result<(), HubClosed> {
    let (done, processed) = oneshot::channel();
    tx.send(Event { payload, done })
        .await
        .map_err(|_| HubClosed)?;
    processed.await.map_err(|_| HubClosed)
}

pub struct Hub {
    join_rx: mpsc::Receiver<Event<Client>>,
    leave_rx: mpsc::Receiver<Event<ClientId>>,
    broadcast_rx: mpsc::Receiver<Event<String>>,
    members: HashMap<ClientId, Client>,
}

impl Hub {
    pub fn new() -> (Self, HubHandle) {
        let (join_tx, join_rx) = mpsc::channel(EVENT_BUFFER);
        let (leave_tx, leave_rx) = mpsc::channel(EVENT_BUFFER);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(EVENT_BUFFER);
        let hub = Self {
            join_rx,
            leave_rx,
            broadcast_rx,
            members: HashMap::new(),
        };
        let handle = HubHandle {
            join_tx,
            leave_tx,
            broadcast_tx,
        };
        (hub, handle)
    }

    /// Spawns the hub onto the runtime and returns the handle to reach it.
    pub fn spawn() -> HubHandle {
        let (hub, handle) = Self::new();
        tokio::spawn(hub.run());
        handle
    }

    /// Runs until every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        loop {
            select! {
                Some(event) = self.join_rx.recv() => {
                    self.handle_join(event.payload);
                    let _ = event.done.send(());
                }
                Some(event) = self.leave_rx.recv() => {
                    self.handle_leave(event.payload);
                    let _ = event.done.send(());
                }
                Some(event) = self.broadcast_rx.recv() => {
                    self.handle_broadcast(&event.payload);
                    let _ = event.done.send(());
                }
                else => break,
            }
        }
        debug!("hub stopped");
    }

    fn handle_join(&mut self, client: Client) {
        let id = client.id;
        info!(client_id = id, user = %client.name, "client joined hub");
        self.members.insert(id, client);

        let mut roster = String::from("Current clients:");
        for member in self.members.values() {
            roster.push('\n');
            roster.push_str(&member.name);
        }
        if !self.deliver(id, roster) {
            self.evict(id);
        }
    }

    fn handle_leave(&mut self, id: ClientId) {
        if let Some(client) = self.members.remove(&id) {
            info!(client_id = id, user = %client.name, "client left hub");
        }
    }

    fn handle_broadcast(&mut self, text: &str) {
        let failed: Vec<ClientId> = self
            .members
            .keys()
            .copied()
            .filter(|id| !self.deliver(*id, text.to_string()))
            .collect();
        for id in failed {
            self.evict(id);
        }
    }

    fn deliver(&self, id: ClientId, line: String) -> bool {
        match self.members.get(&id) {
            Some(client) => client.outgoing.try_send(line).is_ok(),
            None => false,
        }
    }

    fn evict(&mut self, id: ClientId) {
        if let Some(client) = self.members.remove(&id) {
            info!(client_id = id, user = %client.name, "evicted client with full or closed queue");
        }
    }
}
