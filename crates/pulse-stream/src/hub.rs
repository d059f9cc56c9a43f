use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use futures_util::{Sink, Stream};
use pulse_core::types::{ClientId, TenantId};
use pulse_protocol::events::CONNECTION_ESTABLISHED;
use pulse_protocol::frames::EventFrame;
use pulse_protocol::handshake::ConnectionEstablished;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::client::{self, Client, Enqueue};
use crate::error::{Result, StreamError};
use crate::types::{BroadcastReport, ClientSettings, CloseReason};

/// Tenant-keyed registry of live clients and the only fan-out point.
///
/// Cheap to clone; every clone refers to the same registry. Broadcast holds
/// a tenant shard's read guard only while attempting non-blocking enqueues,
/// never across I/O, so one stalled client cannot hold up its siblings or
/// other tenants.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    clients: DashMap<TenantId, HashMap<ClientId, Arc<Client>>>,
    /// Flipped to false exactly once by shutdown. Connect holds the read
    /// side across register + spawn so nothing slips in behind shutdown.
    accepting: RwLock<bool>,
    next_client_id: AtomicU64,
    event_seq: AtomicU64,
    active: AtomicUsize,
    tasks: TaskTracker,
    settings: ClientSettings,
}

impl Hub {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            inner: Arc::new(HubInner {
                clients: DashMap::new(),
                accepting: RwLock::new(true),
                next_client_id: AtomicU64::new(1),
                event_seq: AtomicU64::new(0),
                active: AtomicUsize::new(0),
                tasks: TaskTracker::new(),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    /// Construct a client for an upgraded connection, register it and start
    /// both pumps.
    ///
    /// Registration happens before this returns, so any broadcast issued
    /// afterwards reaches the client. After [`Hub::shutdown`] the halves are
    /// dropped (closing the socket) and `HubClosed` is returned.
    pub fn connect<W, R, E>(&self, tenant: TenantId, writer: W, reader: R) -> Result<Arc<Client>>
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: fmt::Display + Send,
        R: Stream<Item = std::result::Result<Message, E>> + Unpin + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let accepting = self
            .inner
            .accepting
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if !*accepting {
            return Err(StreamError::HubClosed);
        }

        let id = ClientId(self.inner.next_client_id.fetch_add(1, Ordering::Relaxed));
        let settings = self.inner.settings.clone();
        let (client, queue) = Client::new(id, tenant, settings.queue_capacity);

        // written by the outbound pump ahead of the queue, so it never
        // takes a queue slot
        let welcome = EventFrame::try_new(
            CONNECTION_ESTABLISHED,
            &ConnectionEstablished::new(id.to_string(), client.tenant().as_str()),
        )
        .and_then(|frame| serde_json::to_string(&frame));
        let welcome = match welcome {
            Ok(json) => Some(Utf8Bytes::from(json)),
            Err(e) => {
                warn!(client_id = %id, error = %e, "failed to serialize welcome frame");
                None
            }
        };

        self.register(&client);
        self.inner.tasks.spawn(client::run_outbound(
            Arc::clone(&client),
            self.clone(),
            writer,
            queue,
            welcome,
            settings.clone(),
        ));
        self.inner.tasks.spawn(client::run_inbound(
            Arc::clone(&client),
            self.clone(),
            reader,
            settings,
        ));
        drop(accepting);

        info!(client_id = %id, tenant = %client.tenant(), "client connected");
        Ok(client)
    }

    /// Add an Active client to its tenant's set. Non-Active clients are
    /// ignored.
    pub fn register(&self, client: &Arc<Client>) {
        if !client.is_active() {
            debug!(client_id = %client.id(), "refusing to register inactive client");
            return;
        }
        let mut set = self.inner.clients.entry(client.tenant().clone()).or_default();
        if set.insert(client.id(), Arc::clone(client)).is_none() {
            self.inner.active.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a client if present. Returns whether anything was removed;
    /// repeated calls are no-ops. Empty tenant sets are pruned.
    pub fn unregister(&self, client: &Client) -> bool {
        let tenant = client.tenant();
        let removed = match self.inner.clients.get_mut(tenant) {
            Some(mut set) => set.remove(&client.id()).is_some(),
            None => false,
        };
        if removed {
            self.inner.active.fetch_sub(1, Ordering::Relaxed);
            self.inner.clients.remove_if(tenant, |_, set| set.is_empty());
        }
        removed
    }

    /// Fan a frame out to every client of `tenant`.
    ///
    /// Stamps the next sequence number and serializes once. Each recipient
    /// gets a non-blocking enqueue; a client whose queue is full is
    /// disconnected as a slow consumer and the rest still receive the frame.
    pub fn broadcast(&self, tenant: &TenantId, frame: EventFrame) -> BroadcastReport {
        let seq = self.inner.event_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = frame.with_seq(seq);
        let text: Utf8Bytes = match serde_json::to_string(&frame) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(tenant = %tenant, event = %frame.event, error = %e, "failed to serialize event");
                return BroadcastReport {
                    seq,
                    delivered: 0,
                    dropped: 0,
                };
            }
        };

        let mut delivered = 0usize;
        let mut slow: Vec<Arc<Client>> = Vec::new();
        if let Some(set) = self.inner.clients.get(tenant) {
            for client in set.values() {
                match client.try_enqueue(text.clone()) {
                    Enqueue::Queued => delivered += 1,
                    Enqueue::Full => slow.push(Arc::clone(client)),
                    Enqueue::Closed => {}
                }
            }
        }

        // shard guard released above; unregister needs the write side
        for client in &slow {
            warn!(client_id = %client.id(), tenant = %tenant, seq, "outbound queue full, disconnecting slow client");
            self.disconnect(client, CloseReason::SlowConsumer);
        }

        debug!(tenant = %tenant, event = %frame.event, seq, delivered, dropped = slow.len(), "broadcast event");
        BroadcastReport {
            seq,
            delivered,
            dropped: slow.len(),
        }
    }

    /// Move a client to Closing and drop it from the registry. Only the
    /// first call per client has any effect.
    pub(crate) fn disconnect(&self, client: &Client, reason: CloseReason) {
        if client.begin_close(reason) {
            self.unregister(client);
            info!(
                client_id = %client.id(),
                tenant = %client.tenant(),
                reason = %client.close_reason().map(ToString::to_string).unwrap_or_default(),
                "client disconnecting"
            );
        }
    }

    /// Close every client and wait for all pump tasks to finish.
    ///
    /// After this returns the registry is empty, no connection is open and
    /// `connect` refuses new clients.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        {
            let mut accepting = self
                .inner
                .accepting
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *accepting = false;
        }

        let clients: Vec<Arc<Client>> = self
            .inner
            .clients
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect();
        info!(clients = clients.len(), "shutting down hub");

        for client in &clients {
            self.disconnect(client, CloseReason::Shutdown);
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        self.inner.clients.clear();
        self.inner.active.store(0, Ordering::Relaxed);
        info!("hub shut down");
    }

    pub fn is_accepting(&self) -> bool {
        *self
            .inner
            .accepting
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registered clients across all tenants.
    pub fn client_count(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Tenants with at least one registered client.
    pub fn tenant_count(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn tenant_client_count(&self, tenant: &TenantId) -> usize {
        self.inner.clients.get(tenant).map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_registered(&self, client: &Client) -> bool {
        self.inner
            .clients
            .get(client.tenant())
            .map(|set| set.contains_key(&client.id()))
            .unwrap_or(false)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}
