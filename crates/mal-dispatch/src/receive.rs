//! # Message Receive
//!
//! Inbound half of the dispatcher. Every message passes the security check,
//! then is routed strictly by (interaction type, stage):
//!
//! | Message                                   | Route                         |
//! |-------------------------------------------|-------------------------------|
//! | SEND, SUBMIT, REQUEST, INVOKE, PROGRESS   | provider handler (own task)   |
//! | REGISTER, DEREGISTER, PUBLISH_(DE)REGISTER, PUBLISH | broker binding      |
//! | error PUBLISH                             | provider publish listener     |
//! | NOTIFY                                    | consumer notify listener      |
//! | any other known stage                     | `TransactionRegistry`         |
//!
//! Anything else is `MalError::UnroutableStage`. Initiations with no handler
//! are answered with DESTINATION_UNKNOWN.
//!
//! Routing itself runs in arrival order. Provider handlers run on their own
//! task, and listener callbacks on their route's `ListenerQueue`, so either
//! may wait on replies arriving at this endpoint.

use crate::broker::BrokerBinding;
use crate::metrics::DispatchMetrics;
use crate::provider::{run_handler, Interaction, ProviderHandler};
use crate::send::MessageSend;
use crate::stages::{calculate_error_stage, is_initiation};
use async_trait::async_trait;
use mal_interaction::{NotifyListeners, PublishListeners, TransactionRegistry};
use mal_telemetry::log_interaction;
use mal_transport::{MessageListener, SecurityCheck};
use mal_types::{InteractionStage, InteractionType, MalError, MalResult, Message, Uri};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Handler lookup key: local endpoint URI, area, service, area version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub uri: Uri,
    pub area: u16,
    pub service: u16,
    pub version: u8,
}

impl HandlerKey {
    pub fn new(uri: Uri, area: u16, service: u16, version: u8) -> Self {
        Self {
            uri,
            area,
            service,
            version,
        }
    }

    fn for_message(message: &Message) -> Self {
        let header = &message.header;
        Self::new(
            header.uri_to.clone(),
            header.service_area,
            header.service,
            header.area_version,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Provider,
    Broker,
    PublishError,
    Notify,
    Transaction,
}

fn route_for(interaction_type: InteractionType, stage: Option<InteractionStage>, is_error: bool) -> Option<Route> {
    if interaction_type == InteractionType::PubSub {
        return match stage? {
            InteractionStage::PUBLISH if is_error => Some(Route::PublishError),
            InteractionStage::NOTIFY => Some(Route::Notify),
            InteractionStage::REGISTER
            | InteractionStage::PUBLISH_REGISTER
            | InteractionStage::PUBLISH
            | InteractionStage::DEREGISTER
            | InteractionStage::PUBLISH_DEREGISTER => Some(Route::Broker),
            InteractionStage::REGISTER_ACK
            | InteractionStage::PUBLISH_REGISTER_ACK
            | InteractionStage::DEREGISTER_ACK
            | InteractionStage::PUBLISH_DEREGISTER_ACK => Some(Route::Transaction),
            _ => None,
        };
    }

    if is_initiation(interaction_type, stage) {
        return Some(Route::Provider);
    }

    let known = match (interaction_type, stage?) {
        (InteractionType::Submit, s) => s == InteractionStage::SUBMIT_ACK,
        (InteractionType::Request, s) => s == InteractionStage::REQUEST_RESPONSE,
        (InteractionType::Invoke, s) => {
            s == InteractionStage::INVOKE_ACK || s == InteractionStage::INVOKE_RESPONSE
        }
        (InteractionType::Progress, s) => matches!(
            s,
            InteractionStage::PROGRESS_ACK
                | InteractionStage::PROGRESS_UPDATE
                | InteractionStage::PROGRESS_RESPONSE
        ),
        _ => false,
    };
    known.then_some(Route::Transaction)
}

/// Inbound dispatcher bound to one endpoint.
pub struct MessageReceive {
    sender: Arc<MessageSend>,
    registry: Arc<TransactionRegistry>,
    security: Arc<dyn SecurityCheck>,
    notify: Arc<NotifyListeners>,
    publish: Arc<PublishListeners>,
    providers: RwLock<HashMap<HandlerKey, Arc<dyn ProviderHandler>>>,
    brokers: RwLock<HashMap<HandlerKey, Arc<BrokerBinding>>>,
    metrics: Arc<DispatchMetrics>,
}

impl MessageReceive {
    pub fn new(
        sender: Arc<MessageSend>,
        security: Arc<dyn SecurityCheck>,
        notify: Arc<NotifyListeners>,
        publish: Arc<PublishListeners>,
    ) -> Self {
        Self {
            registry: sender.registry().clone(),
            metrics: sender.metrics().clone(),
            sender,
            security,
            notify,
            publish,
            providers: RwLock::new(HashMap::new()),
            brokers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_provider(&self, key: HandlerKey, handler: Arc<dyn ProviderHandler>) {
        self.providers.write().insert(key, handler);
    }

    pub fn remove_provider(&self, key: &HandlerKey) -> bool {
        self.providers.write().remove(key).is_some()
    }

    pub fn register_broker(&self, key: HandlerKey, binding: Arc<BrokerBinding>) {
        self.brokers.write().insert(key, binding);
    }

    pub fn remove_broker(&self, key: &HandlerKey) -> bool {
        self.brokers.write().remove(key).is_some()
    }

    /// Route one inbound message.
    pub async fn receive(&self, message: Message) -> MalResult<()> {
        let message = self.security.check(message)?;
        self.metrics.record_received(&message.header);

        let header = &message.header;
        let Some(route) = route_for(
            header.interaction_type,
            header.interaction_stage,
            header.is_error_message,
        ) else {
            log_interaction!(
                error,
                "Unroutable message",
                header.transaction_id,
                header.uri_from,
                header.stage_name(),
                interaction = %header.interaction_type
            );
            return Err(MalError::UnroutableStage {
                interaction: interaction_name(header.interaction_type),
                stage: header.stage_name(),
            });
        };

        match route {
            Route::Provider => self.dispatch_to_provider(message).await,
            Route::Broker => self.dispatch_to_broker(message).await,
            Route::PublishError => self.publish.deliver(message),
            Route::Notify => self.notify.deliver(message).map(drop),
            Route::Transaction => self.registry.handle_stage(message).await,
        }
    }

    async fn dispatch_to_provider(&self, message: Message) -> MalResult<()> {
        let handler = self
            .providers
            .read()
            .get(&HandlerKey::for_message(&message))
            .cloned();

        let Some(handler) = handler else {
            return self.reject_unknown_destination(message).await;
        };

        let interaction = Interaction::new(message.header, self.sender.clone());
        tokio::spawn(run_handler(handler, interaction, message.body));
        Ok(())
    }

    async fn dispatch_to_broker(&self, message: Message) -> MalResult<()> {
        let binding = self
            .brokers
            .read()
            .get(&HandlerKey::for_message(&message))
            .cloned();

        match binding {
            Some(binding) => binding.handle(message, &self.sender).await,
            None => self.reject_unknown_destination(message).await,
        }
    }

    async fn reject_unknown_destination(&self, message: Message) -> MalResult<()> {
        let header = message.header;
        let err = MalError::DestinationUnknown(header.uri_to.clone());
        log_interaction!(
            warn,
            "No handler for service",
            header.transaction_id,
            header.uri_from,
            header.stage_name(),
            area = header.service_area,
            service = header.service,
            version = header.area_version
        );

        match calculate_error_stage(&header) {
            Some(stage) => {
                if let Err(send_err) = self.sender.return_error(&header, stage, &err).await {
                    warn!(error = %send_err, "Could not return DESTINATION_UNKNOWN");
                }
            }
            None => debug!(stage = header.stage_name(), "Rejected message expects no reply"),
        }
        Err(err)
    }
}

fn interaction_name(interaction_type: InteractionType) -> &'static str {
    match interaction_type {
        InteractionType::Send => "SEND",
        InteractionType::Submit => "SUBMIT",
        InteractionType::Request => "REQUEST",
        InteractionType::Invoke => "INVOKE",
        InteractionType::Progress => "PROGRESS",
        InteractionType::PubSub => "PUBSUB",
    }
}

/// Endpoint listener forwarding to a `MessageReceive`.
///
/// Holds a weak reference so the endpoint does not keep the runtime alive.
pub struct ReceiveListener {
    receiver: Weak<MessageReceive>,
}

impl ReceiveListener {
    pub fn new(receiver: &Arc<MessageReceive>) -> Self {
        Self {
            receiver: Arc::downgrade(receiver),
        }
    }
}

#[async_trait]
impl MessageListener for ReceiveListener {
    async fn on_message(&self, message: Message) {
        let Some(receiver) = self.receiver.upgrade() else {
            warn!(uri = %message.header.uri_to, "Message after runtime shutdown");
            return;
        };
        if let Err(err) = receiver.receive(message).await {
            receiver.metrics.record_rejected(&err);
            warn!(error = %err, "Inbound message rejected");
        }
    }
}
