//! # Broker Engine
//!
//! Register/deregister lifecycle, publish-rights checks and NOTIFY fan-out.
//!
//! Updates are matched within one subscription source only: the exact
//! signature lookup happens first, wildcard matching after. Updates for one
//! operation never reach subscribers of another.

use crate::provider::ProviderDetails;
use crate::source::{NotifyMessageSet, ServiceKey, SourceSignature, SubscriptionSource};
use mal_types::{
    Element, EntityKey, Identifier, MalError, MalResult, MessageHeader, Subscription,
    UpdateHeader, Uri,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Broker strategy used by the runtime's broker binding.
pub trait BrokerHandler: Send + Sync {
    /// Install or replace one subscription of the consumer in `header.uri_from`.
    fn add_consumer(&self, header: &MessageHeader, subscription: &Subscription) -> MalResult<()>;

    /// Remove named subscriptions. Unknown ids are ignored.
    fn remove_consumer(&self, header: &MessageHeader, subscription_ids: &[Identifier]);

    /// Remove every subscription of a consumer under every source.
    /// Returns the number of subscriptions removed.
    fn remove_lost_consumer(&self, consumer: &Uri) -> usize;

    /// Install or replace the publish rights of the provider in `header.uri_from`.
    fn add_provider(&self, header: &MessageHeader, entity_keys: &[EntityKey]) -> MalResult<()>;

    /// Returns true if a registration existed.
    fn remove_provider(&self, header: &MessageHeader) -> bool;

    /// Validate a PUBLISH batch against the provider's registration.
    fn check_publish(&self, header: &MessageHeader, update_headers: &[UpdateHeader])
        -> MalResult<()>;

    /// Match a checked PUBLISH batch against subscriptions.
    fn create_notify(
        &self,
        header: &MessageHeader,
        update_headers: &[UpdateHeader],
        value_lists: &[Vec<Element>],
    ) -> MalResult<Vec<NotifyMessageSet>>;
}

/// In-process broker.
#[derive(Default)]
pub struct BrokerEngine {
    sources: Mutex<BTreeMap<SourceSignature, SubscriptionSource>>,
    providers: Mutex<BTreeMap<(ServiceKey, Uri), ProviderDetails>>,
}

impl BrokerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.lock().len()
    }

    /// Consumers across all sources, counted once per source.
    pub fn consumer_count(&self) -> usize {
        self.sources
            .lock()
            .values()
            .map(SubscriptionSource::consumer_count)
            .sum()
    }

    /// True if `consumer` has any subscription under any source.
    pub fn has_consumer(&self, consumer: &Uri) -> bool {
        self.sources
            .lock()
            .values()
            .any(|source| source.consumer(consumer).is_some())
    }

    pub fn has_source(&self, header: &MessageHeader) -> bool {
        self.sources
            .lock()
            .contains_key(&SourceSignature::from(header))
    }
}

impl BrokerHandler for BrokerEngine {
    fn add_consumer(&self, header: &MessageHeader, subscription: &Subscription) -> MalResult<()> {
        if subscription.subscription_id.as_str().is_empty() {
            return Err(MalError::BadEncoding("empty subscription id".to_string()));
        }

        let signature = SourceSignature::from(header);
        self.sources
            .lock()
            .entry(signature)
            .or_default()
            .add_consumer(header, subscription);

        debug!(
            uri = %header.uri_from,
            subscription_id = %subscription.subscription_id,
            domain = %header.domain,
            "Consumer subscription registered"
        );
        Ok(())
    }

    fn remove_consumer(&self, header: &MessageHeader, subscription_ids: &[Identifier]) {
        let signature = SourceSignature::from(header);
        let mut sources = self.sources.lock();

        let Some(source) = sources.get_mut(&signature) else {
            debug!(uri = %header.uri_from, "Deregister for unknown source");
            return;
        };

        let removed = source.remove_subscriptions(&header.uri_from, subscription_ids);
        if source.is_empty() {
            sources.remove(&signature);
            debug!(domain = %header.domain, "Subscription source removed");
        }

        debug!(uri = %header.uri_from, removed = removed, "Consumer subscriptions removed");
    }

    fn remove_lost_consumer(&self, consumer: &Uri) -> usize {
        let mut removed = 0;
        self.sources.lock().retain(|_, source| {
            removed += source.remove_consumer(consumer);
            !source.is_empty()
        });

        if removed > 0 {
            info!(uri = %consumer, removed = removed, "Removed lost consumer");
        }
        removed
    }

    fn add_provider(&self, header: &MessageHeader, entity_keys: &[EntityKey]) -> MalResult<()> {
        let details = ProviderDetails::new(
            header.uri_from.clone(),
            header.domain.clone(),
            header.qos_level,
            entity_keys,
        );
        self.providers
            .lock()
            .insert((ServiceKey::from(header), header.uri_from.clone()), details);

        debug!(
            uri = %header.uri_from,
            keys = entity_keys.len(),
            domain = %header.domain,
            "Provider registered"
        );
        Ok(())
    }

    fn remove_provider(&self, header: &MessageHeader) -> bool {
        let removed = self
            .providers
            .lock()
            .remove(&(ServiceKey::from(header), header.uri_from.clone()))
            .is_some();
        debug!(uri = %header.uri_from, removed = removed, "Provider deregistered");
        removed
    }

    fn check_publish(
        &self,
        header: &MessageHeader,
        update_headers: &[UpdateHeader],
    ) -> MalResult<()> {
        let providers = self.providers.lock();
        let Some(details) = providers.get(&(ServiceKey::from(header), header.uri_from.clone()))
        else {
            warn!(uri = %header.uri_from, "Publish without registration");
            return Err(MalError::IncorrectState(format!(
                "provider {} has not registered to publish",
                header.uri_from
            )));
        };
        details.check_publish(&header.domain, update_headers)
    }

    fn create_notify(
        &self,
        header: &MessageHeader,
        update_headers: &[UpdateHeader],
        value_lists: &[Vec<Element>],
    ) -> MalResult<Vec<NotifyMessageSet>> {
        if let Some(list) = value_lists.iter().find(|l| l.len() != update_headers.len()) {
            return Err(MalError::BadEncoding(format!(
                "value list has {} entries for {} updates",
                list.len(),
                update_headers.len()
            )));
        }

        let sets = self
            .sources
            .lock()
            .get(&SourceSignature::from(header))
            .map(|source| source.notify_sets(update_headers, value_lists))
            .unwrap_or_default();

        debug!(
            uri = %header.uri_from,
            updates = update_headers.len(),
            consumers = sets.len(),
            "Publish matched"
        );
        Ok(sets)
    }
}
