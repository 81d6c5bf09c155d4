//! # Consumer
//!
//! Client-side facade over `MessageSend` for one provider (and its broker).
//!
//! Synchronous calls return once the first result-bearing stage arrives:
//! the ack for SUBMIT, INVOKE, PROGRESS and PUBSUB, the response for
//! REQUEST. For INVOKE and PROGRESS the remaining stages go to the listener
//! passed with the call.

use crate::details::InteractionDetails;
use crate::send::MessageSend;
use mal_interaction::{InteractionListener, InteractionPattern, NotifyKey, NotifyListeners};
use mal_telemetry::log_subscription;
use mal_types::{
    Element, Identifier, InteractionStage, MalResult, MessageBody, Operation, Subscription,
    TransactionId,
};
use std::sync::Arc;

/// Consumer of one service provider.
pub struct Consumer {
    details: InteractionDetails,
    sender: Arc<MessageSend>,
    notify: Arc<NotifyListeners>,
}

impl Consumer {
    pub fn new(
        details: InteractionDetails,
        sender: Arc<MessageSend>,
        notify: Arc<NotifyListeners>,
    ) -> Self {
        Self {
            details,
            sender,
            notify,
        }
    }

    pub fn details(&self) -> &InteractionDetails {
        &self.details
    }

    // =========================================================================
    // SYNCHRONOUS
    // =========================================================================

    pub async fn send(&self, operation: &Operation, body: MessageBody) -> MalResult<()> {
        self.sender.send(&self.details, operation, body).await
    }

    pub async fn submit(&self, operation: &Operation, body: MessageBody) -> MalResult<()> {
        self.sender
            .synchronous(&self.details, operation, InteractionPattern::Submit, body, None)
            .await
            .map(drop)
    }

    /// Returns the REQUEST_RESPONSE body.
    pub async fn request(&self, operation: &Operation, body: MessageBody) -> MalResult<MessageBody> {
        self.sender
            .synchronous(&self.details, operation, InteractionPattern::Request, body, None)
            .await
            .map(|message| message.body)
    }

    /// Returns the INVOKE_ACK body; the response goes to `listener`.
    pub async fn invoke(
        &self,
        operation: &Operation,
        body: MessageBody,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<MessageBody> {
        self.sender
            .synchronous(
                &self.details,
                operation,
                InteractionPattern::Invoke,
                body,
                Some(listener),
            )
            .await
            .map(|message| message.body)
    }

    /// Returns the PROGRESS_ACK body; updates and the response go to
    /// `listener`.
    pub async fn progress(
        &self,
        operation: &Operation,
        body: MessageBody,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<MessageBody> {
        self.sender
            .synchronous(
                &self.details,
                operation,
                InteractionPattern::Progress,
                body,
                Some(listener),
            )
            .await
            .map(|message| message.body)
    }

    /// Subscribe and wait for REGISTER_ACK. NOTIFYs for the subscription go
    /// to `listener`.
    pub async fn register(
        &self,
        operation: &Operation,
        subscription: Subscription,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<()> {
        let subscription_id = subscription.subscription_id.clone();
        let key = self.notify_key(operation, subscription_id.clone());
        // Installed first: a NOTIFY may overtake the ack.
        self.notify.register(key.clone(), listener);

        let result = self
            .sender
            .synchronous(
                &self.details,
                operation,
                InteractionPattern::Register,
                MessageBody::single(Element::Subscription(subscription)),
                None,
            )
            .await;

        match result {
            Ok(_) => {
                log_subscription!(debug, "Subscription registered", self.sender.uri(), subscription_id);
                Ok(())
            }
            Err(err) => {
                self.notify.remove(&key);
                Err(err)
            }
        }
    }

    /// Remove subscriptions and wait for DEREGISTER_ACK.
    pub async fn deregister(
        &self,
        operation: &Operation,
        subscription_ids: Vec<Identifier>,
    ) -> MalResult<()> {
        self.drop_notify_routes(operation, &subscription_ids);
        self.sender
            .synchronous(
                &self.details,
                operation,
                InteractionPattern::Deregister,
                MessageBody::single(Element::IdentifierList(subscription_ids)),
                None,
            )
            .await
            .map(drop)
    }

    // =========================================================================
    // ASYNCHRONOUS
    // =========================================================================

    pub async fn async_submit(
        &self,
        operation: &Operation,
        body: MessageBody,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<TransactionId> {
        self.sender
            .asynchronous(&self.details, operation, InteractionPattern::Submit, body, listener)
            .await
    }

    pub async fn async_request(
        &self,
        operation: &Operation,
        body: MessageBody,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<TransactionId> {
        self.sender
            .asynchronous(&self.details, operation, InteractionPattern::Request, body, listener)
            .await
    }

    pub async fn async_invoke(
        &self,
        operation: &Operation,
        body: MessageBody,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<TransactionId> {
        self.sender
            .asynchronous(&self.details, operation, InteractionPattern::Invoke, body, listener)
            .await
    }

    pub async fn async_progress(
        &self,
        operation: &Operation,
        body: MessageBody,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<TransactionId> {
        self.sender
            .asynchronous(&self.details, operation, InteractionPattern::Progress, body, listener)
            .await
    }

    /// Subscribe; the ack and every NOTIFY go to `listener`.
    pub async fn async_register(
        &self,
        operation: &Operation,
        subscription: Subscription,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<TransactionId> {
        let key = self.notify_key(operation, subscription.subscription_id.clone());
        self.notify.register(key.clone(), listener.clone());

        let result = self
            .sender
            .asynchronous(
                &self.details,
                operation,
                InteractionPattern::Register,
                MessageBody::single(Element::Subscription(subscription)),
                listener,
            )
            .await;
        if result.is_err() {
            self.notify.remove(&key);
        }
        result
    }

    pub async fn async_deregister(
        &self,
        operation: &Operation,
        subscription_ids: Vec<Identifier>,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<TransactionId> {
        self.drop_notify_routes(operation, &subscription_ids);
        self.sender
            .asynchronous(
                &self.details,
                operation,
                InteractionPattern::Deregister,
                MessageBody::single(Element::IdentifierList(subscription_ids)),
                listener,
            )
            .await
    }

    /// Hand the remaining stages of a pending interaction to `listener`.
    pub fn continue_interaction(
        &self,
        transaction_id: TransactionId,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<()> {
        self.sender
            .registry()
            .continue_transaction(transaction_id, listener)
    }

    /// Route key matching the NOTIFY the broker sends back for a REGISTER
    /// of `operation`.
    fn notify_key(&self, operation: &Operation, subscription_id: Identifier) -> NotifyKey {
        let header = self
            .details
            .header(operation, Some(InteractionStage::REGISTER), None);
        NotifyKey::new(self.sender.uri().clone(), &header, subscription_id)
    }

    fn drop_notify_routes(&self, operation: &Operation, subscription_ids: &[Identifier]) {
        for id in subscription_ids {
            if self.notify.remove(&self.notify_key(operation, id.clone())) {
                log_subscription!(debug, "Subscription listener removed", self.sender.uri(), id);
            }
        }
    }
}
