//! # MAL Runtime
//!
//! Wires one endpoint to the dispatcher and owns the shared maps.
//!
//! ## Initialization
//!
//! ```text
//! 1. Validate RuntimeConfig
//! 2. TransactionRegistry (sync timeout from config)
//! 3. MessageSend ──→ MessageReceive
//! 4. Endpoint listener ──→ MessageReceive (weak)
//! 5. Background purge of expired transactions
//! ```

use crate::broker::BrokerBinding;
use crate::config::RuntimeConfig;
use crate::consumer::Consumer;
use crate::details::InteractionDetails;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::provider::ProviderHandler;
use crate::publisher::Publisher;
use crate::receive::{HandlerKey, MessageReceive, ReceiveListener};
use crate::send::MessageSend;
use mal_broker::BrokerHandler;
use mal_interaction::{cleanup_task, NotifyListeners, PublishListeners, TransactionRegistry};
use mal_telemetry::{metric_set, PENDING_TRANSACTIONS};
use mal_transport::{Endpoint, InMemoryTransport, NullSecurityCheck, SecurityCheck};
use mal_types::{MalResult, Message, Operation, Uri};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// One MAL node: an endpoint plus everything needed to consume, provide and
/// broker services through it.
pub struct MalRuntime {
    config: RuntimeConfig,
    endpoint: Arc<dyn Endpoint>,
    registry: Arc<TransactionRegistry>,
    sender: Arc<MessageSend>,
    receiver: Arc<MessageReceive>,
    notify: Arc<NotifyListeners>,
    publish: Arc<PublishListeners>,
    metrics: Arc<DispatchMetrics>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl MalRuntime {
    /// Runtime with a pass-through security check.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(endpoint: Arc<dyn Endpoint>, config: RuntimeConfig) -> MalResult<Arc<Self>> {
        Self::with_security(endpoint, config, Arc::new(NullSecurityCheck))
    }

    /// Runtime on a new `malmem://<name>` endpoint of `transport`, buffered
    /// to `config.channel_capacity`.
    pub fn bind(
        transport: &Arc<InMemoryTransport>,
        name: &str,
        config: RuntimeConfig,
    ) -> MalResult<Arc<Self>> {
        config.validate()?;
        let endpoint = transport.create_endpoint_with_capacity(name, config.channel_capacity)?;
        Self::new(endpoint, config)
    }

    #[instrument(name = "mal_runtime_init", skip_all, fields(uri = %endpoint.uri()))]
    pub fn with_security(
        endpoint: Arc<dyn Endpoint>,
        config: RuntimeConfig,
        security: Arc<dyn SecurityCheck>,
    ) -> MalResult<Arc<Self>> {
        config.validate()?;

        let registry = Arc::new(TransactionRegistry::new(config.sync_timeout));
        let metrics = Arc::new(DispatchMetrics::new());
        let notify = Arc::new(NotifyListeners::new());
        let publish = Arc::new(PublishListeners::new());

        let sender = Arc::new(MessageSend::new(
            endpoint.clone(),
            registry.clone(),
            security.clone(),
            metrics.clone(),
        ));
        let receiver = Arc::new(MessageReceive::new(
            sender.clone(),
            security,
            notify.clone(),
            publish.clone(),
        ));
        endpoint.set_message_listener(Arc::new(ReceiveListener::new(&receiver)));

        let cleanup = tokio::spawn(cleanup_task(
            registry.clone(),
            config.cleanup_interval,
            config.transaction_ttl,
        ));

        info!(
            sync_timeout_ms = config.sync_timeout.map(|t| t.as_millis() as u64),
            ttl_secs = config.transaction_ttl.as_secs(),
            "MAL runtime started"
        );

        Ok(Arc::new(Self {
            config,
            endpoint,
            registry,
            sender,
            receiver,
            notify,
            publish,
            metrics,
            cleanup: Mutex::new(Some(cleanup)),
        }))
    }

    pub fn uri(&self) -> &Uri {
        self.endpoint.uri()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    pub fn sender(&self) -> &Arc<MessageSend> {
        &self.sender
    }

    /// Counter snapshot; also refreshes the pending-transaction gauge.
    pub fn metrics(&self) -> MetricsSnapshot {
        metric_set!(PENDING_TRANSACTIONS, self.registry.pending_count());
        self.metrics.snapshot()
    }

    /// Details for talking to `provider`, with the configured QoS defaults.
    pub fn details(&self, provider: impl Into<Uri>) -> InteractionDetails {
        InteractionDetails::new(provider)
            .with_qos(self.config.default_qos_level, self.config.default_priority)
    }

    // =========================================================================
    // CONSUMER / PUBLISHER
    // =========================================================================

    pub fn consumer(&self, details: InteractionDetails) -> Consumer {
        Consumer::new(details, self.sender.clone(), self.notify.clone())
    }

    pub fn publisher(&self, details: InteractionDetails, operation: Operation) -> MalResult<Publisher> {
        Publisher::new(details, operation, self.sender.clone(), self.publish.clone())
    }

    // =========================================================================
    // PROVIDER / BROKER
    // =========================================================================

    /// Serve `area.service` version `version` on this endpoint.
    pub fn register_provider(
        &self,
        area: u16,
        service: u16,
        version: u8,
        handler: Arc<dyn ProviderHandler>,
    ) {
        let key = HandlerKey::new(self.uri().clone(), area, service, version);
        info!(area, service, version, "Provider registered");
        self.receiver.register_provider(key, handler);
    }

    pub fn remove_provider(&self, area: u16, service: u16, version: u8) -> bool {
        self.receiver
            .remove_provider(&HandlerKey::new(self.uri().clone(), area, service, version))
    }

    /// Broker the PUBSUB operations of `area.service` version `version`.
    pub fn register_broker(
        &self,
        area: u16,
        service: u16,
        version: u8,
        handler: Arc<dyn BrokerHandler>,
    ) -> Arc<BrokerBinding> {
        let binding = Arc::new(BrokerBinding::new(handler, self.metrics.clone()));
        let key = HandlerKey::new(self.uri().clone(), area, service, version);
        info!(area, service, version, "Broker registered");
        self.receiver.register_broker(key, binding.clone());
        binding
    }

    pub fn remove_broker(&self, area: u16, service: u16, version: u8) -> bool {
        self.receiver
            .remove_broker(&HandlerKey::new(self.uri().clone(), area, service, version))
    }

    /// Feed a message to the receive path directly, bypassing the endpoint.
    pub async fn receive(&self, message: Message) -> MalResult<()> {
        self.receiver.receive(message).await
    }

    /// Stop the purge task and close the endpoint.
    pub async fn close(&self) -> MalResult<()> {
        if let Some(task) = self.cleanup.lock().take() {
            task.abort();
        }
        self.endpoint.close().await?;
        info!(uri = %self.uri(), "MAL runtime closed");
        Ok(())
    }
}

impl Drop for MalRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup.lock().take() {
            task.abort();
        }
    }
}
