//! # Broker Binding
//!
//! Connects a `BrokerHandler` to the message path.
//!
//! ```text
//! REGISTER ──────────→ add_consumer ──────→ REGISTER_ACK
//! DEREGISTER ────────→ remove_consumer ───→ DEREGISTER_ACK
//! PUBLISH_REGISTER ──→ add_provider ──────→ PUBLISH_REGISTER_ACK
//! PUBLISH_DEREGISTER → remove_provider ───→ PUBLISH_DEREGISTER_ACK
//! PUBLISH ───────────→ check_publish ─┬──→ create_notify → NOTIFY per consumer
//!                                      └──→ error PUBLISH back to the provider
//! ```
//!
//! A consumer whose NOTIFY cannot be delivered is removed from every source.

use crate::metrics::DispatchMetrics;
use crate::send::MessageSend;
use crate::stages::calculate_error_stage;
use mal_broker::BrokerHandler;
use mal_telemetry::log_interaction;
use mal_types::{
    Element, InteractionStage, InteractionType, MalError, MalResult, Message, MessageBody,
    MessageHeader,
};
use std::sync::Arc;
use tracing::{error, warn};

/// Broker strategy plus the reply logic around it.
pub struct BrokerBinding {
    handler: Arc<dyn BrokerHandler>,
    metrics: Arc<DispatchMetrics>,
}

impl BrokerBinding {
    pub fn new(handler: Arc<dyn BrokerHandler>, metrics: Arc<DispatchMetrics>) -> Self {
        Self { handler, metrics }
    }

    pub fn handler(&self) -> &Arc<dyn BrokerHandler> {
        &self.handler
    }

    /// Process one PUBSUB initiation received by the broker.
    ///
    /// Failures are answered with an error reply; the returned error is the
    /// one that caused it.
    pub async fn handle(&self, message: Message, sender: &MessageSend) -> MalResult<()> {
        let header = message.header;
        let body = message.body;

        if header.interaction_type != InteractionType::PubSub {
            return Err(MalError::UnroutableStage {
                interaction: "broker",
                stage: header.stage_name(),
            });
        }

        let outcome = match header.interaction_stage {
            Some(InteractionStage::REGISTER) => body
                .subscription(0)
                .and_then(|subscription| self.handler.add_consumer(&header, subscription))
                .map(|()| Some(InteractionStage::REGISTER_ACK)),
            Some(InteractionStage::DEREGISTER) => body.identifier_list(0).map(|ids| {
                self.handler.remove_consumer(&header, ids);
                Some(InteractionStage::DEREGISTER_ACK)
            }),
            Some(InteractionStage::PUBLISH_REGISTER) => body
                .entity_key_list(0)
                .and_then(|keys| self.handler.add_provider(&header, keys))
                .map(|()| Some(InteractionStage::PUBLISH_REGISTER_ACK)),
            Some(InteractionStage::PUBLISH_DEREGISTER) => {
                self.handler.remove_provider(&header);
                Ok(Some(InteractionStage::PUBLISH_DEREGISTER_ACK))
            }
            Some(InteractionStage::PUBLISH) => {
                return self.handle_publish(header, body, sender).await;
            }
            _ => Err(MalError::UnroutableStage {
                interaction: "PUBSUB",
                stage: header.stage_name(),
            }),
        };

        match outcome {
            Ok(Some(ack)) => sender.return_response(&header, ack, MessageBody::empty()).await,
            Ok(None) => Ok(()),
            Err(err) => {
                self.reply_error(&header, &err, sender).await;
                Err(err)
            }
        }
    }

    async fn handle_publish(
        &self,
        header: MessageHeader,
        body: MessageBody,
        sender: &MessageSend,
    ) -> MalResult<()> {
        let sets = match self.matched_sets(&header, &body) {
            Ok(sets) => sets,
            Err(err) => {
                self.metrics.record_publish_rejected(&err);
                log_interaction!(
                    warn,
                    "Publish rejected",
                    header.transaction_id,
                    header.uri_from,
                    header.stage_name(),
                    error = %err
                );
                self.reply_error(&header, &err, sender).await;
                return Err(err);
            }
        };

        for set in sets {
            let consumer = set.consumer.clone();
            if let Err(err) = sender.send_notify(set).await {
                warn!(uri = %consumer, error = %err, "NOTIFY failed, removing consumer");
                self.handler.remove_lost_consumer(&consumer);
                self.metrics.record_lost_consumer();
            }
        }
        Ok(())
    }

    fn matched_sets(
        &self,
        header: &MessageHeader,
        body: &MessageBody,
    ) -> MalResult<Vec<mal_broker::NotifyMessageSet>> {
        let update_headers = body.update_header_list(0)?;
        let value_lists = (1..body.len())
            .map(|i| body.list(i).cloned())
            .collect::<MalResult<Vec<Vec<Element>>>>()?;

        self.handler.check_publish(header, update_headers)?;
        self.handler.create_notify(header, update_headers, &value_lists)
    }

    async fn reply_error(&self, header: &MessageHeader, err: &MalError, sender: &MessageSend) {
        let Some(stage) = calculate_error_stage(header) else {
            error!(stage = header.stage_name(), "No error stage for broker reply");
            return;
        };
        if let Err(send_err) = sender.return_error(header, stage, err).await {
            warn!(uri = %header.uri_from, error = %send_err, "Could not return broker error");
        }
    }
}
