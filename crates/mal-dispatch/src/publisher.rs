//! Provider side of PUBLISH-SUBSCRIBE.
//!
//! A publisher registers its entity keys with the broker, then publishes
//! batches of updates. A rejected batch comes back as an error PUBLISH and is
//! handed to the listener given at registration.

use crate::details::InteractionDetails;
use crate::send::MessageSend;
use mal_interaction::{InteractionListener, InteractionPattern, PublishListeners};
use mal_types::{
    Element, EntityKey, InteractionStage, InteractionType, MalError, MalResult, MessageBody,
    Operation, TransactionId, UpdateHeader,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Publisher for one PUBSUB operation.
pub struct Publisher {
    details: InteractionDetails,
    operation: Operation,
    sender: Arc<MessageSend>,
    listeners: Arc<PublishListeners>,
    /// Transaction of the accepted PUBLISH_REGISTER; publishes reuse it.
    registration: Mutex<Option<TransactionId>>,
}

impl Publisher {
    pub fn new(
        details: InteractionDetails,
        operation: Operation,
        sender: Arc<MessageSend>,
        listeners: Arc<PublishListeners>,
    ) -> MalResult<Self> {
        if operation.interaction_type != InteractionType::PubSub {
            return Err(MalError::IncorrectState(format!(
                "{} is not a PUBSUB operation",
                operation.name
            )));
        }
        Ok(Self {
            details,
            operation,
            sender,
            listeners,
            registration: Mutex::new(None),
        })
    }

    pub fn is_registered(&self) -> bool {
        self.registration.lock().is_some()
    }

    /// PUBLISH_REGISTER and wait for the ack.
    pub async fn register(
        &self,
        entity_keys: Vec<EntityKey>,
        listener: Arc<dyn InteractionListener>,
    ) -> MalResult<()> {
        let header = self.details.header(&self.operation, None, None);
        self.listeners.register(self.sender.uri(), &header, listener);

        let result = self
            .sender
            .synchronous(
                &self.details,
                &self.operation,
                InteractionPattern::PublishRegister,
                MessageBody::single(Element::EntityKeyList(entity_keys)),
                None,
            )
            .await;

        match result {
            Ok(ack) => {
                *self.registration.lock() = ack.header.transaction_id;
                debug!(operation = self.operation.name, "Publisher registered");
                Ok(())
            }
            Err(err) => {
                self.listeners.remove(self.sender.uri(), &header);
                Err(err)
            }
        }
    }

    /// Send one PUBLISH batch.
    ///
    /// `value_lists` holds one list per value type, each with one entry per
    /// update header. Acceptance is not acknowledged; a rejection arrives at
    /// the registration listener.
    pub async fn publish(
        &self,
        update_headers: Vec<UpdateHeader>,
        value_lists: Vec<Vec<Element>>,
    ) -> MalResult<()> {
        let Some(transaction_id) = *self.registration.lock() else {
            return Err(MalError::IncorrectState(format!(
                "publish on {} before PUBLISH_REGISTER",
                self.operation.name
            )));
        };

        let mut elements = Vec::with_capacity(value_lists.len() + 1);
        elements.push(Element::UpdateHeaderList(update_headers));
        elements.extend(value_lists.into_iter().map(Element::List));

        let header = self.details.header(
            &self.operation,
            Some(InteractionStage::PUBLISH),
            Some(transaction_id),
        );
        self.sender.send_message(header, MessageBody::new(elements)).await
    }

    /// PUBLISH_DEREGISTER and wait for the ack.
    pub async fn deregister(&self) -> MalResult<()> {
        self.sender
            .synchronous(
                &self.details,
                &self.operation,
                InteractionPattern::PublishDeregister,
                MessageBody::empty(),
                None,
            )
            .await?;

        *self.registration.lock() = None;
        let header = self.details.header(&self.operation, None, None);
        self.listeners.remove(self.sender.uri(), &header);
        debug!(operation = self.operation.name, "Publisher deregistered");
        Ok(())
    }
}
