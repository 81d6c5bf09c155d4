//! # In-Memory Transport
//!
//! Routes messages between endpoints in the same process.

use crate::endpoint::{Endpoint, MessageListener};
use crate::{TransportError, DEFAULT_CHANNEL_CAPACITY, MEMORY_SCHEME};
use async_trait::async_trait;
use dashmap::DashMap;
use mal_types::{Message, Uri};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type ListenerSlot = Arc<RwLock<Option<Arc<dyn MessageListener>>>>;

struct Route {
    sender: mpsc::Sender<Message>,
    capacity: usize,
}

/// Process-local message router.
pub struct InMemoryTransport {
    routes: DashMap<Uri, Route>,
    capacity: usize,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            routes: DashMap::new(),
            capacity: capacity.max(1),
        })
    }

    /// Bind `malmem://<name>` with the transport's default capacity.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create_endpoint(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Arc<InMemoryEndpoint>, TransportError> {
        self.create_endpoint_with_capacity(name, self.capacity)
    }

    /// Bind `malmem://<name>`; senders wait once `capacity` messages are
    /// queued for it.
    pub fn create_endpoint_with_capacity(
        self: &Arc<Self>,
        name: &str,
        capacity: usize,
    ) -> Result<Arc<InMemoryEndpoint>, TransportError> {
        let uri = Uri::new(format!("{}://{}", MEMORY_SCHEME, name));
        if self.routes.contains_key(&uri) {
            return Err(TransportError::AlreadyBound(uri));
        }

        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        self.routes.insert(uri.clone(), Route { sender: tx, capacity });

        let listener: ListenerSlot = Arc::new(RwLock::new(None));
        let ready = Arc::new(Notify::new());
        let task = tokio::spawn(receive_loop(uri.clone(), rx, listener.clone(), ready.clone()));

        debug!(uri = %uri, capacity = capacity, "In-memory endpoint bound");

        Ok(Arc::new(InMemoryEndpoint {
            uri,
            transport: self.clone(),
            listener,
            ready,
            closed: AtomicBool::new(false),
            receive_task: Mutex::new(Some(task)),
            messages_sent: AtomicU64::new(0),
        }))
    }

    /// Bind an endpoint under a fresh unique name.
    pub fn create_anonymous_endpoint(self: &Arc<Self>) -> Result<Arc<InMemoryEndpoint>, TransportError> {
        self.create_endpoint(&uuid::Uuid::new_v4().to_string())
    }

    /// True if an endpoint is bound to `uri`.
    pub fn is_bound(&self, uri: &Uri) -> bool {
        self.routes.contains_key(uri)
    }

    pub fn endpoint_count(&self) -> usize {
        self.routes.len()
    }

    /// Inbound buffer size of the endpoint bound to `uri`.
    pub fn endpoint_capacity(&self, uri: &Uri) -> Option<usize> {
        self.routes.get(uri).map(|entry| entry.value().capacity)
    }

    fn route(&self, uri: &Uri) -> Option<mpsc::Sender<Message>> {
        self.routes.get(uri).map(|entry| entry.value().sender.clone())
    }

    fn unbind(&self, uri: &Uri) {
        self.routes.remove(uri);
    }
}

async fn receive_loop(
    uri: Uri,
    mut rx: mpsc::Receiver<Message>,
    slot: ListenerSlot,
    ready: Arc<Notify>,
) {
    while let Some(message) = rx.recv().await {
        // Hold messages until a listener is installed.
        let listener = loop {
            if let Some(listener) = slot.read().clone() {
                break listener;
            }
            ready.notified().await;
        };
        listener.on_message(message).await;
    }
    debug!(uri = %uri, "In-memory endpoint receive loop stopped");
}

/// Endpoint bound on an `InMemoryTransport`.
pub struct InMemoryEndpoint {
    uri: Uri,
    transport: Arc<InMemoryTransport>,
    listener: ListenerSlot,
    ready: Arc<Notify>,
    closed: AtomicBool,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    messages_sent: AtomicU64,
}

impl InMemoryEndpoint {
    /// Messages successfully handed to a destination.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.transport.unbind(&self.uri);
        if let Some(task) = self.receive_task.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Endpoint for InMemoryEndpoint {
    fn uri(&self) -> &Uri {
        &self.uri
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.uri.clone()));
        }

        let to = message.header.uri_to.clone();
        let Some(sender) = self.transport.route(&to) else {
            warn!(from = %self.uri, to = %to, "Send to unbound URI");
            return Err(TransportError::DestinationUnknown(to));
        };

        if sender.send(message).await.is_err() {
            warn!(from = %self.uri, to = %to, "Destination stopped receiving");
            self.transport.unbind(&to);
            return Err(TransportError::DestinationLost(to));
        }

        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_message_listener(&self, listener: Arc<dyn MessageListener>) {
        *self.listener.write() = Some(listener);
        self.ready.notify_one();
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.uri.clone()));
        }
        self.shutdown();
        debug!(uri = %self.uri, "In-memory endpoint closed");
        Ok(())
    }
}

impl Drop for InMemoryEndpoint {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.shutdown();
        }
    }
}
