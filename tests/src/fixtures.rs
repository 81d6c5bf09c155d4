//! # Test Fixtures
//!
//! Shared nodes, operations and listeners for the integration flows.

use async_trait::async_trait;
use mal_broker::BrokerEngine;
use mal_dispatch::{Interaction, MalRuntime, ProviderHandler, RuntimeConfig};
use mal_interaction::InteractionListener;
use mal_transport::InMemoryTransport;
use mal_types::{
    Element, EntityKey, EntityRequest, InteractionType, MalError, MalResult, Message, MessageBody,
    Operation, StandardError, Subscription, UpdateHeader, UpdateType, Uri,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// OPERATIONS
// =============================================================================

pub const AREA: u16 = 10;
pub const SERVICE: u16 = 1;
pub const VERSION: u8 = 1;

pub const LOG: Operation = Operation::new("log", AREA, SERVICE, VERSION, 1, InteractionType::Send);
pub const STORE: Operation = Operation::new("store", AREA, SERVICE, VERSION, 2, InteractionType::Submit);
pub const ECHO: Operation = Operation::new("echo", AREA, SERVICE, VERSION, 3, InteractionType::Request);
pub const COMPUTE: Operation = Operation::new("compute", AREA, SERVICE, VERSION, 4, InteractionType::Invoke);
pub const COUNT: Operation = Operation::new("count", AREA, SERVICE, VERSION, 5, InteractionType::Progress);
pub const MONITOR: Operation = Operation::new("monitor", AREA, SERVICE, VERSION, 6, InteractionType::PubSub);
pub const MONITOR_ALARMS: Operation =
    Operation::new("monitorAlarms", AREA, SERVICE, VERSION, 7, InteractionType::PubSub);

/// Submit with no handler method behind it.
pub const PURGE: Operation = Operation::new("purge", AREA, 2, VERSION, 1, InteractionType::Submit);

/// Service-specific error number raised by `STORE`.
pub const STORE_REJECTED: u32 = 70_001;

/// Sync timeout for every test node.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on waiting for an asynchronous callback.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// NODES
// =============================================================================

pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        sync_timeout: Some(SYNC_TIMEOUT),
        ..RuntimeConfig::default()
    }
}

/// A runtime bound to `malmem://<name>`.
pub fn node(transport: &Arc<InMemoryTransport>, name: &str) -> Arc<MalRuntime> {
    node_with_config(transport, name, test_config())
}

pub fn node_with_config(
    transport: &Arc<InMemoryTransport>,
    name: &str,
    config: RuntimeConfig,
) -> Arc<MalRuntime> {
    MalRuntime::bind(transport, name, config).unwrap()
}

/// A node brokering `MONITOR`, with its engine for inspection.
pub fn broker_node(transport: &Arc<InMemoryTransport>, name: &str) -> (Arc<MalRuntime>, Arc<BrokerEngine>) {
    let runtime = node(transport, name);
    let engine = Arc::new(BrokerEngine::new());
    runtime.register_broker(AREA, SERVICE, VERSION, engine.clone());
    (runtime, engine)
}

// =============================================================================
// PUBSUB HELPERS
// =============================================================================

pub fn key(first: &str, second: i64, third: i64, fourth: i64) -> EntityKey {
    EntityKey::new(first, second, third, fourth)
}

pub fn subscription(id: &str, only_on_change: bool, keys: Vec<EntityKey>) -> Subscription {
    Subscription::new(id, vec![EntityRequest::new(only_on_change, keys)])
}

pub fn update(source: &Uri, update_type: UpdateType, key: EntityKey) -> UpdateHeader {
    UpdateHeader::new(source.clone(), update_type, key)
}

// =============================================================================
// PROVIDER
// =============================================================================

/// Provider of `STORE`, `ECHO`, `COMPUTE`, `COUNT` and `LOG`.
///
/// - `STORE` with a `Null` body fails with `STORE_REJECTED`.
/// - `COMPUTE` acks, then responds with the doubled `Long`.
/// - `COUNT` acks, sends `n` updates `0..n`, then responds with `n`.
/// - `LOG` forwards its body to `logged`.
pub struct TestProvider {
    logged: mpsc::UnboundedSender<MessageBody>,
}

impl TestProvider {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MessageBody>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { logged: tx }), rx)
    }
}

#[async_trait]
impl ProviderHandler for TestProvider {
    async fn handle_send(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        let _ = self.logged.send(body);
        Ok(())
    }

    async fn handle_submit(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        if body.get(0) == Some(&Element::Null) {
            return Err(MalError::Standard(StandardError::with_text(
                STORE_REJECTED,
                "nothing to store",
            )));
        }
        interaction.send_acknowledgement(MessageBody::empty()).await
    }

    async fn handle_request(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        interaction.send_response(body).await
    }

    async fn handle_invoke(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        let Some(Element::Long(value)) = body.get(0).cloned() else {
            return Err(MalError::BadEncoding("expected Long".into()));
        };
        interaction
            .send_acknowledgement(MessageBody::single(Element::Boolean(true)))
            .await?;
        interaction
            .send_response(MessageBody::single(Element::Long(value * 2)))
            .await
    }

    async fn handle_progress(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        let Some(Element::Long(n)) = body.get(0).cloned() else {
            return Err(MalError::BadEncoding("expected Long".into()));
        };
        interaction.send_acknowledgement(MessageBody::empty()).await?;
        for i in 0..n {
            interaction
                .send_update(MessageBody::single(Element::Long(i)))
                .await?;
        }
        interaction
            .send_response(MessageBody::single(Element::Long(n)))
            .await
    }
}

/// Provider that accepts every initiation and never replies.
pub struct SilentProvider;

#[async_trait]
impl ProviderHandler for SilentProvider {
    async fn handle_submit(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        Ok(())
    }

    async fn handle_request(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        Ok(())
    }

    async fn handle_invoke(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        Ok(())
    }
}

// =============================================================================
// RECORDING LISTENER
// =============================================================================

/// One listener callback.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: &'static str,
    pub message: Message,
}

/// Listener forwarding every callback to an `Events` stream.
pub struct RecordingListener {
    tx: mpsc::UnboundedSender<Event>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), Events { rx })
    }

    fn record(&self, kind: &'static str, message: Message) {
        let _ = self.tx.send(Event { kind, message });
    }
}

pub struct Events {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Events {
    /// Next callback; panics after `EVENT_TIMEOUT`.
    pub async fn next(&mut self) -> Event {
        tokio::time::timeout(EVENT_TIMEOUT, self.rx.recv())
            .await
            .expect("listener callback timed out")
            .expect("listener dropped")
    }

    /// Asserts nothing arrives within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Some(event)) = tokio::time::timeout(window, self.rx.recv()).await {
            panic!("unexpected callback {}", event.kind);
        }
    }
}

#[async_trait]
impl InteractionListener for RecordingListener {
    async fn submit_ack_received(&self, message: Message) {
        self.record("submit_ack", message);
    }
    async fn submit_error_received(&self, message: Message) {
        self.record("submit_error", message);
    }
    async fn request_response_received(&self, message: Message) {
        self.record("request_response", message);
    }
    async fn request_error_received(&self, message: Message) {
        self.record("request_error", message);
    }
    async fn invoke_ack_received(&self, message: Message) {
        self.record("invoke_ack", message);
    }
    async fn invoke_ack_error_received(&self, message: Message) {
        self.record("invoke_ack_error", message);
    }
    async fn invoke_response_received(&self, message: Message) {
        self.record("invoke_response", message);
    }
    async fn invoke_response_error_received(&self, message: Message) {
        self.record("invoke_response_error", message);
    }
    async fn progress_ack_received(&self, message: Message) {
        self.record("progress_ack", message);
    }
    async fn progress_update_received(&self, message: Message) {
        self.record("progress_update", message);
    }
    async fn progress_response_received(&self, message: Message) {
        self.record("progress_response", message);
    }
    async fn register_ack_received(&self, message: Message) {
        self.record("register_ack", message);
    }
    async fn deregister_ack_received(&self, message: Message) {
        self.record("deregister_ack", message);
    }
    async fn notify_received(&self, message: Message) {
        self.record("notify", message);
    }
    async fn notify_error_received(&self, message: Message) {
        self.record("notify_error", message);
    }
    async fn publish_error_received(&self, message: Message) {
        self.record("publish_error", message);
    }
}
