//! Subscription sources: consumers grouped by publish signature.

use crate::consumer::ConsumerDetails;
use crate::keys::SubscriptionKey;
use mal_types::{
    Domain, Element, Identifier, MessageHeader, SessionType, Subscription, SubscriptionUpdate,
    UpdateHeader, Uri,
};
use std::collections::{BTreeMap, BTreeSet};

/// The operation a publish or subscription addresses, without its domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub network_zone: Identifier,
    pub session: SessionType,
    pub session_name: Identifier,
    pub area: u16,
    pub service: u16,
    pub operation: u16,
    pub version: u8,
}

impl From<&MessageHeader> for ServiceKey {
    fn from(header: &MessageHeader) -> Self {
        Self {
            network_zone: header.network_zone.clone(),
            session: header.session,
            session_name: header.session_name.clone(),
            area: header.service_area,
            service: header.service,
            operation: header.operation,
            version: header.area_version,
        }
    }
}

/// Exact partition key of a subscription source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceSignature {
    pub domain: Domain,
    pub service: ServiceKey,
}

impl From<&MessageHeader> for SourceSignature {
    fn from(header: &MessageHeader) -> Self {
        Self {
            domain: header.domain.clone(),
            service: ServiceKey::from(header),
        }
    }
}

/// One consumer's matched updates for a publish batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyMessageSet {
    pub consumer: Uri,
    /// Header of the consumer's REGISTER.
    pub register_header: MessageHeader,
    pub updates: Vec<SubscriptionUpdate>,
}

/// All consumers subscribed under one signature.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSource {
    consumers: BTreeMap<Uri, ConsumerDetails>,
    required: BTreeSet<SubscriptionKey>,
}

impl SubscriptionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_consumer(&mut self, header: &MessageHeader, subscription: &Subscription) {
        self.consumers
            .entry(header.uri_from.clone())
            .or_insert_with(|| ConsumerDetails::new(header.uri_from.clone(), header.clone()))
            .add_subscription(header, subscription);
        self.recompute_required();
    }

    /// Remove subscriptions of one consumer; drops the consumer when it has
    /// none left. Returns the number of subscriptions removed.
    pub fn remove_subscriptions(&mut self, consumer: &Uri, ids: &[Identifier]) -> usize {
        let Some(details) = self.consumers.get_mut(consumer) else {
            return 0;
        };
        let removed = details.remove_subscriptions(ids);
        if details.is_empty() {
            self.consumers.remove(consumer);
        }
        if removed > 0 {
            self.recompute_required();
        }
        removed
    }

    /// Remove a consumer entirely. Returns its subscription count.
    pub fn remove_consumer(&mut self, consumer: &Uri) -> usize {
        let removed = self
            .consumers
            .remove(consumer)
            .map_or(0, |details| details.subscription_count());
        if removed > 0 {
            self.recompute_required();
        }
        removed
    }

    pub fn consumer(&self, uri: &Uri) -> Option<&ConsumerDetails> {
        self.consumers.get(uri)
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn required_keys(&self) -> &BTreeSet<SubscriptionKey> {
        &self.required
    }

    fn recompute_required(&mut self) {
        self.required = self
            .consumers
            .values()
            .flat_map(|c| c.required_keys().iter().cloned())
            .collect();
    }

    /// Build one notify set per consumer with at least one match.
    pub fn notify_sets(
        &self,
        update_headers: &[UpdateHeader],
        value_lists: &[Vec<Element>],
    ) -> Vec<NotifyMessageSet> {
        let any_required = update_headers
            .iter()
            .any(|u| self.required.iter().any(|k| k.matches_entity(&u.key)));
        if !any_required {
            return Vec::new();
        }

        self.consumers
            .values()
            .filter_map(|consumer| {
                let updates = consumer.matching_updates(update_headers, value_lists);
                (!updates.is_empty()).then(|| NotifyMessageSet {
                    consumer: consumer.uri().clone(),
                    register_header: consumer.register_header().clone(),
                    updates,
                })
            })
            .collect()
    }
}
