//! # Listener Routes
//!
//! NOTIFY and PUBLISH-error messages are not correlated by transaction id.
//! They are routed by who they are for: a consumer's subscription, or a
//! provider's publisher.
//!
//! A subscription id is only unique within the partition its REGISTER
//! addressed, so a NOTIFY route carries the whole partition. The broker
//! replies to that REGISTER with the same header fields, which is what
//! `deliver` matches on.

use crate::listener::{InteractionListener, ListenerCall, ListenerQueue};
use mal_types::{
    Domain, Element, Identifier, MalError, MalResult, Message, MessageBody, MessageHeader,
    SessionType, Uri,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A consumer's subscription within one broker partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotifyKey {
    pub consumer: Uri,
    pub domain: Domain,
    pub network_zone: Identifier,
    pub session: SessionType,
    pub session_name: Identifier,
    pub area: u16,
    pub service: u16,
    pub operation: u16,
    pub version: u8,
    pub subscription_id: Identifier,
}

impl NotifyKey {
    /// Key for a subscription registered by `consumer` with `header`.
    pub fn new(consumer: Uri, header: &MessageHeader, subscription_id: Identifier) -> Self {
        Self {
            consumer,
            domain: header.domain.clone(),
            network_zone: header.network_zone.clone(),
            session: header.session,
            session_name: header.session_name.clone(),
            area: header.service_area,
            service: header.service,
            operation: header.operation,
            version: header.area_version,
            subscription_id,
        }
    }

    fn for_notify(header: &MessageHeader, subscription_id: Identifier) -> Self {
        Self::new(header.uri_to.clone(), header, subscription_id)
    }

    /// Same consumer and partition, any subscription id.
    fn same_partition(&self, other: &NotifyKey) -> bool {
        self.consumer == other.consumer
            && self.domain == other.domain
            && self.network_zone == other.network_zone
            && self.session == other.session
            && self.session_name == other.session_name
            && self.area == other.area
            && self.service == other.service
            && self.operation == other.operation
            && self.version == other.version
    }
}

/// Consumer subscription listeners.
#[derive(Default)]
pub struct NotifyListeners {
    routes: RwLock<HashMap<NotifyKey, ListenerQueue>>,
}

impl NotifyListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the listener for a subscription, replacing any earlier one
    /// under the same key.
    pub fn register(&self, key: NotifyKey, listener: Arc<dyn InteractionListener>) {
        debug!(
            uri = %key.consumer,
            subscription_id = %key.subscription_id,
            operation = key.operation,
            "Notify listener registered"
        );
        let queue = ListenerQueue::spawn(listener);
        self.routes.write().insert(key, queue);
    }

    pub fn remove(&self, key: &NotifyKey) -> bool {
        self.routes.write().remove(key).is_some()
    }

    /// Drop every subscription listener of a consumer.
    pub fn remove_all(&self, consumer: &Uri) -> usize {
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|key, _| key.consumer != *consumer);
        before - routes.len()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Deliver a NOTIFY to the listeners of the subscriptions it carries.
    ///
    /// Each listener receives a NOTIFY holding only its own subscription's
    /// updates. An error NOTIFY goes to every listener of the consumer in
    /// the NOTIFY's partition. Returns the number of listener calls queued.
    pub fn deliver(&self, message: Message) -> MalResult<usize> {
        let header = &message.header;

        if header.is_error_message {
            let partition = NotifyKey::for_notify(header, Identifier::default());
            let routes = self.routes.read();
            let mut queued = 0;
            for (key, queue) in routes.iter() {
                if key.same_partition(&partition) {
                    queue.push(ListenerCall::NotifyError, message.clone());
                    queued += 1;
                }
            }
            return Ok(queued);
        }

        let updates = message.body.subscription_update_list(0)?;

        let routes = self.routes.read();
        let mut queued = 0;
        for update in updates {
            let key = NotifyKey::for_notify(header, update.subscription_id.clone());
            match routes.get(&key) {
                Some(queue) => {
                    let body = MessageBody::single(Element::SubscriptionUpdateList(vec![
                        update.clone(),
                    ]));
                    queue.push(ListenerCall::Notify, Message::new(header.clone(), body));
                    queued += 1;
                }
                None => warn!(
                    uri = %key.consumer,
                    subscription_id = %update.subscription_id,
                    operation = key.operation,
                    "NOTIFY for subscription with no listener"
                ),
            }
        }

        if queued == 0 && !updates.is_empty() {
            return Err(MalError::DestinationUnknown(header.uri_to.clone()));
        }
        Ok(queued)
    }
}

/// (provider URI, area, service, operation)
type PublishKey = (Uri, u16, u16, u16);

/// Provider publisher listeners, the target of PUBLISH error replies.
#[derive(Default)]
pub struct PublishListeners {
    routes: RwLock<HashMap<PublishKey, ListenerQueue>>,
}

impl PublishListeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(provider: &Uri, header: &MessageHeader) -> PublishKey {
        (
            provider.clone(),
            header.service_area,
            header.service,
            header.operation,
        )
    }

    /// Register for the operation addressed by `header`.
    pub fn register(&self, provider: &Uri, header: &MessageHeader, listener: Arc<dyn InteractionListener>) {
        let queue = ListenerQueue::spawn(listener);
        self.routes.write().insert(Self::key(provider, header), queue);
    }

    pub fn remove(&self, provider: &Uri, header: &MessageHeader) -> bool {
        self.routes
            .write()
            .remove(&Self::key(provider, header))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Hand a PUBLISH error to the publisher that sent the publish.
    pub fn deliver(&self, message: Message) -> MalResult<()> {
        let provider = message.header.uri_to.clone();
        let routes = self.routes.read();
        match routes.get(&Self::key(&provider, &message.header)) {
            Some(queue) => {
                queue.push(ListenerCall::PublishError, message);
                Ok(())
            }
            None => {
                warn!(uri = %provider, "PUBLISH error with no registered publisher");
                Err(MalError::DestinationUnknown(provider))
            }
        }
    }
}
