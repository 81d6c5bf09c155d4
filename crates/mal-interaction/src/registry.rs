//! # Transaction Registry
//!
//! Correlates inbound stages to in-flight interactions.
//!
//! ## Flow
//!
//! 1. Caller calls `create_transaction()` and sends the initiating message.
//! 2. Inbound stages reach `handle_stage()`, which advances the pattern
//!    state under the map lock.
//! 3. With the lock released, the stage either fills the caller's result
//!    cell or is pushed to the transaction's listener queue.
//! 4. A synchronous caller awaits `wait_for_result()`.
//!
//! The result cell is a `oneshot` kept in its own map, so a reply that lands
//! before the caller starts waiting is still delivered.

use crate::id::{IdGenerator, SequentialIdGenerator};
use crate::listener::{InteractionListener, ListenerCall, ListenerQueue};
use crate::state::{InteractionPattern, InteractionState};
use mal_types::{MalError, MalResult, Message, MessageHeader, TransactionId, Uri};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A pending interaction, owned by the registry until retired.
struct PendingInteraction {
    pattern: InteractionPattern,
    state: InteractionState,
    synchronous: bool,
    listener: Option<Arc<dyn InteractionListener>>,
    /// Spawned on the first stage that goes to `listener`.
    queue: Option<ListenerQueue>,
    /// Taken when the first result-bearing stage arrives.
    result: Option<oneshot::Sender<Message>>,
    created_at: Instant,
}

/// Where a received request came from, kept on the provider side until the
/// final reply goes out.
#[derive(Debug, Clone)]
pub struct TransactionSource {
    pub origin: Uri,
    pub original_transaction_id: TransactionId,
    pub header: MessageHeader,
    created_at: Instant,
}

/// Counters for registry activity.
#[derive(Debug, Default)]
pub struct RegistryStats {
    pub total_created: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_cancelled: AtomicU64,
    pub total_rejected_stages: AtomicU64,
}

enum Delivery {
    Waiter(oneshot::Sender<Message>),
    Listener(ListenerQueue, ListenerCall),
    Dropped(ListenerCall),
}

/// Transaction id → pending interaction map.
pub struct TransactionRegistry {
    pending: Mutex<HashMap<TransactionId, PendingInteraction>>,
    results: Mutex<HashMap<TransactionId, oneshot::Receiver<Message>>>,
    sources: Mutex<HashMap<TransactionId, TransactionSource>>,
    ids: Arc<dyn IdGenerator>,
    sync_timeout: Option<Duration>,
    stats: Arc<RegistryStats>,
}

impl TransactionRegistry {
    /// Registry with a sequential id generator.
    ///
    /// `sync_timeout` bounds `wait_for_result`; `None` waits forever.
    pub fn new(sync_timeout: Option<Duration>) -> Self {
        Self::with_id_generator(Arc::new(SequentialIdGenerator::new()), sync_timeout)
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>, sync_timeout: Option<Duration>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
            ids,
            sync_timeout,
            stats: Arc::new(RegistryStats::default()),
        }
    }

    /// Allocate an id and store a fresh pending interaction under it.
    pub fn create_transaction(
        &self,
        pattern: InteractionPattern,
        is_synchronous: bool,
        listener: Option<Arc<dyn InteractionListener>>,
    ) -> TransactionId {
        let id = self.ids.next_id();

        let result = if is_synchronous {
            let (tx, rx) = oneshot::channel();
            self.results.lock().insert(id, rx);
            Some(tx)
        } else {
            None
        };

        let record = PendingInteraction {
            pattern,
            state: InteractionState::initial(pattern),
            synchronous: is_synchronous,
            listener,
            queue: None,
            result,
            created_at: Instant::now(),
        };

        let previous = self.pending.lock().insert(id, record);
        if previous.is_some() {
            warn!(transaction_id = %id, "Id generator reused a live transaction id");
        }
        self.stats.total_created.fetch_add(1, Ordering::Relaxed);

        debug!(
            transaction_id = %id,
            pattern = ?pattern,
            synchronous = is_synchronous,
            "Created transaction"
        );

        id
    }

    /// Wait for the first result-bearing stage of a synchronous transaction.
    ///
    /// An error-flagged reply becomes `Err(MalError::Standard)`. A live
    /// transaction with no result cell (asynchronous, continued, or already
    /// waited on) is `IncorrectState`.
    pub async fn wait_for_result(&self, id: TransactionId) -> MalResult<Message> {
        let Some(rx) = self.results.lock().remove(&id) else {
            if self.is_pending(id) {
                warn!(transaction_id = %id, "Wait on transaction without a result cell");
                return Err(MalError::IncorrectState(format!(
                    "transaction {} is not awaiting a synchronous result",
                    id
                )));
            }
            warn!(transaction_id = %id, "Wait for unknown transaction");
            return Err(MalError::UnknownTransaction(id));
        };

        let received = match self.sync_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.lock().remove(&id);
                    self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        transaction_id = %id,
                        timeout_ms = limit.as_millis() as u64,
                        "Synchronous interaction timed out"
                    );
                    return Err(MalError::DeliveryTimedOut(id));
                }
            },
            None => rx.await,
        };

        match received {
            Ok(message) => match message.as_error() {
                Some(err) => Err(err),
                None => Ok(message),
            },
            // Sender dropped: the record was purged or cancelled.
            Err(_) => Err(MalError::DeliveryTimedOut(id)),
        }
    }

    /// Apply an inbound stage to its pending interaction.
    ///
    /// Out-of-order stages return `UnexpectedStage` and leave the record and
    /// any waiter untouched.
    pub async fn handle_stage(&self, message: Message) -> MalResult<()> {
        let header = &message.header;
        let stage_name = header.stage_name();

        let Some(id) = header.transaction_id else {
            warn!(stage = stage_name, "Stage without transaction id");
            return Err(MalError::IncorrectState(format!(
                "{} message has no transaction id",
                stage_name
            )));
        };
        let Some(stage) = header.interaction_stage else {
            warn!(transaction_id = %id, "Stage message without stage");
            return Err(MalError::UnexpectedStage {
                transaction_id: id,
                stage: stage_name,
            });
        };

        let delivery = {
            let mut pending = self.pending.lock();
            let Some(record) = pending.get_mut(&id) else {
                self.stats.total_rejected_stages.fetch_add(1, Ordering::Relaxed);
                warn!(transaction_id = %id, stage = stage_name, "Stage for unknown transaction");
                return Err(MalError::UnknownTransaction(id));
            };

            let Some(transition) =
                record
                    .state
                    .advance(header.interaction_type, stage, header.is_error_message)
            else {
                let pattern = record.pattern;
                self.stats.total_rejected_stages.fetch_add(1, Ordering::Relaxed);
                warn!(
                    transaction_id = %id,
                    stage = stage_name,
                    pattern = ?pattern,
                    "Out-of-order stage rejected"
                );
                return Err(MalError::UnexpectedStage {
                    transaction_id: id,
                    stage: stage_name,
                });
            };

            let waiter = if transition.result_bearing && record.synchronous {
                record.result.take()
            } else {
                None
            };
            let delivery = match (waiter, &record.listener) {
                (Some(tx), _) => Delivery::Waiter(tx),
                (None, Some(listener)) => {
                    let queue = record
                        .queue
                        .get_or_insert_with(|| ListenerQueue::spawn(listener.clone()));
                    Delivery::Listener(queue.clone(), transition.call)
                }
                (None, None) => Delivery::Dropped(transition.call),
            };

            if transition.finished {
                pending.remove(&id);
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(transaction_id = %id, stage = stage_name, "Transaction finished");
            }

            delivery
        };

        match delivery {
            Delivery::Waiter(tx) => {
                if tx.send(message).is_err() {
                    debug!(transaction_id = %id, "Waiter gone before result arrived");
                }
            }
            Delivery::Listener(queue, call) => queue.push(call, message),
            Delivery::Dropped(call) => {
                debug!(transaction_id = %id, call = ?call, "No listener for stage");
            }
        }

        Ok(())
    }

    /// Attach a listener to a pending transaction and switch it to
    /// asynchronous delivery. A caller not yet waiting on the result loses
    /// that wait; every later stage goes to `listener`.
    pub fn continue_transaction(
        &self,
        id: TransactionId,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<()> {
        {
            let mut pending = self.pending.lock();
            let Some(record) = pending.get_mut(&id) else {
                return Err(MalError::UnknownTransaction(id));
            };
            record.listener = Some(listener);
            record.queue = None;
            record.synchronous = false;
            record.result = None;
        }
        self.results.lock().remove(&id);
        debug!(transaction_id = %id, "Transaction continued asynchronously");
        Ok(())
    }

    /// Retire a transaction without a result, e.g. after a failed send.
    pub fn cancel(&self, id: TransactionId) -> bool {
        let removed = self.pending.lock().remove(&id).is_some();
        self.results.lock().remove(&id);
        if removed {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove transactions and sources older than `max_age`.
    ///
    /// Returns the number of transactions removed. Waiting callers see
    /// `DeliveryTimedOut`.
    pub fn purge_expired(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();

        self.pending.lock().retain(|id, record| {
            let age = now.duration_since(record.created_at);
            if age > max_age {
                expired.push(*id);
                warn!(
                    transaction_id = %id,
                    pattern = ?record.pattern,
                    age_ms = age.as_millis() as u64,
                    "Removing expired transaction"
                );
                false
            } else {
                true
            }
        });

        if !expired.is_empty() {
            let mut results = self.results.lock();
            for id in &expired {
                results.remove(id);
            }
        }

        self.sources
            .lock()
            .retain(|_, source| now.duration_since(source.created_at) <= max_age);

        self.stats
            .total_timeouts
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, id: TransactionId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    // =========================================================================
    // PROVIDER-SIDE SOURCES
    // =========================================================================

    /// Remember where a received request came from. Returns a local id for
    /// the provider's replies.
    pub fn add_transaction_source(&self, header: &MessageHeader) -> TransactionId {
        let id = self.ids.next_id();
        let source = TransactionSource {
            origin: header.uri_from.clone(),
            original_transaction_id: header.transaction_id.unwrap_or(id),
            header: header.clone(),
            created_at: Instant::now(),
        };
        self.sources.lock().insert(id, source);
        debug!(transaction_id = %id, origin = %header.uri_from, "Added transaction source");
        id
    }

    pub fn resolve_transaction_source(&self, id: TransactionId) -> Option<TransactionSource> {
        self.sources.lock().get(&id).cloned()
    }

    pub fn remove_transaction_source(&self, id: TransactionId) -> Option<TransactionSource> {
        self.sources.lock().remove(&id)
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }
}

/// Background task retiring abandoned transactions.
pub async fn cleanup_task(registry: Arc<TransactionRegistry>, interval: Duration, ttl: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = registry.purge_expired(ttl);
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired transactions");
        }
    }
}
