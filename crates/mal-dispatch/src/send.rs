//! # Message Send
//!
//! Outbound half of the dispatcher. Builds headers, registers transactions
//! before the initiating message leaves, and sends provider and broker
//! replies.
//!
//! ## Failure Handling
//!
//! - A local send failure retires the transaction and surfaces as
//!   `MalError::Transport`.
//! - An error-flagged reply to a synchronous call surfaces as
//!   `MalError::Standard`.

use crate::details::InteractionDetails;
use crate::metrics::DispatchMetrics;
use mal_broker::NotifyMessageSet;
use mal_interaction::{InteractionListener, InteractionPattern, TransactionRegistry};
use mal_telemetry::{log_interaction, time_histogram, SYNC_WAIT_DURATION};
use mal_transport::{Endpoint, SecurityCheck};
use mal_types::{
    Element, InteractionStage, InteractionType, MalError, MalResult, Message, MessageBody,
    MessageHeader, Operation, TransactionId, Uri,
};
use std::sync::Arc;

/// Outbound dispatcher bound to one endpoint.
pub struct MessageSend {
    endpoint: Arc<dyn Endpoint>,
    registry: Arc<TransactionRegistry>,
    security: Arc<dyn SecurityCheck>,
    metrics: Arc<DispatchMetrics>,
}

impl MessageSend {
    pub fn new(
        endpoint: Arc<dyn Endpoint>,
        registry: Arc<TransactionRegistry>,
        security: Arc<dyn SecurityCheck>,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            endpoint,
            registry,
            security,
            metrics,
        }
    }

    /// URI replies and notifications are sent from.
    pub fn uri(&self) -> &Uri {
        self.endpoint.uri()
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Security-check and send a fully built header and body.
    pub async fn send_message(&self, header: MessageHeader, body: MessageBody) -> MalResult<()> {
        let message = self.endpoint.create_message(header, body);
        let message = self.security.check(message)?;
        let header = message.header.clone();

        match self.endpoint.send(message).await {
            Ok(()) => {
                self.metrics.record_sent(&header);
                log_interaction!(
                    debug,
                    "Message sent",
                    header.transaction_id,
                    header.uri_to,
                    header.stage_name()
                );
                Ok(())
            }
            Err(err) => {
                self.metrics.record_send_failure();
                log_interaction!(
                    error,
                    "Send failed",
                    header.transaction_id,
                    header.uri_to,
                    header.stage_name(),
                    error = %err
                );
                Err(err.into())
            }
        }
    }

    // =========================================================================
    // CONSUMER SIDE
    // =========================================================================

    /// Fire-and-forget SEND.
    pub async fn send(
        &self,
        details: &InteractionDetails,
        operation: &Operation,
        body: MessageBody,
    ) -> MalResult<()> {
        expect_type(operation, InteractionType::Send)?;
        let header = details.header(operation, None, None);
        self.send_message(header, body).await
    }

    /// Start an interaction and wait for its first result-bearing stage.
    ///
    /// `listener` receives every later stage (INVOKE response, PROGRESS
    /// updates and response).
    pub async fn synchronous(
        &self,
        details: &InteractionDetails,
        operation: &Operation,
        pattern: InteractionPattern,
        body: MessageBody,
        listener: Option<Arc<dyn InteractionListener>>,
    ) -> MalResult<Message> {
        let id = self.initiate(details, operation, pattern, body, true, listener).await?;

        let _timer = time_histogram!(SYNC_WAIT_DURATION);
        let result = self.registry.wait_for_result(id).await;
        if let Err(MalError::DeliveryTimedOut(_)) = &result {
            self.metrics.record_sync_timeout();
        }
        result
    }

    /// Start an interaction whose stages all go to `listener`.
    pub async fn asynchronous(
        &self,
        details: &InteractionDetails,
        operation: &Operation,
        pattern: InteractionPattern,
        body: MessageBody,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<TransactionId> {
        self.initiate(details, operation, pattern, body, false, Some(listener))
            .await
    }

    async fn initiate(
        &self,
        details: &InteractionDetails,
        operation: &Operation,
        pattern: InteractionPattern,
        body: MessageBody,
        is_synchronous: bool,
        listener: Option<Arc<dyn InteractionListener>>,
    ) -> MalResult<TransactionId> {
        expect_type(operation, pattern.interaction_type())?;

        // Registered before sending so a fast reply finds its record.
        let id = self
            .registry
            .create_transaction(pattern, is_synchronous, listener);
        let header = details.header(operation, Some(pattern.initial_stage()), Some(id));

        if let Err(err) = self.send_message(header, body).await {
            self.registry.cancel(id);
            return Err(err);
        }
        Ok(id)
    }

    // =========================================================================
    // PROVIDER / BROKER SIDE
    // =========================================================================

    /// Reply to `request` at `stage`.
    pub async fn return_response(
        &self,
        request: &MessageHeader,
        stage: InteractionStage,
        body: MessageBody,
    ) -> MalResult<()> {
        self.send_message(request.reply(stage, false), body).await
    }

    /// Error reply to `request` at `stage`.
    pub async fn return_error(
        &self,
        request: &MessageHeader,
        stage: InteractionStage,
        err: &MalError,
    ) -> MalResult<()> {
        let standard = err.to_standard();
        log_interaction!(
            debug,
            "Returning error",
            request.transaction_id,
            request.uri_from,
            request.stage_name(),
            error = %standard
        );
        self.send_message(request.reply(stage, true), MessageBody::error(&standard))
            .await
    }

    /// NOTIFY one consumer with its matched updates.
    pub async fn send_notify(&self, set: NotifyMessageSet) -> MalResult<()> {
        let header = set.register_header.reply(InteractionStage::NOTIFY, false);
        let body = MessageBody::single(Element::SubscriptionUpdateList(set.updates));
        self.send_message(header, body).await?;
        self.metrics.record_notify();
        Ok(())
    }
}

fn expect_type(operation: &Operation, interaction_type: InteractionType) -> MalResult<()> {
    if operation.interaction_type == interaction_type {
        Ok(())
    } else {
        Err(MalError::IncorrectState(format!(
            "{} is a {} operation, not {}",
            operation.name, operation.interaction_type, interaction_type
        )))
    }
}
