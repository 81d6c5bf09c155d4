//! Per-consumer subscription bookkeeping.

use crate::keys::SubscriptionKey;
use mal_types::{
    Element, Identifier, MessageHeader, Subscription, SubscriptionUpdate, UpdateHeader, Uri,
};
use std::collections::{BTreeMap, BTreeSet};

/// Key sets of one subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SubscriptionFilter {
    /// Match every update.
    on_all: BTreeSet<SubscriptionKey>,
    /// Match only updates whose type is a change.
    on_change: BTreeSet<SubscriptionKey>,
}

impl SubscriptionFilter {
    fn from_subscription(subscription: &Subscription) -> Self {
        let mut filter = Self::default();
        for request in &subscription.entities {
            let target = if request.only_on_change {
                &mut filter.on_change
            } else {
                &mut filter.on_all
            };
            target.extend(request.entity_keys.iter().map(SubscriptionKey::from));
        }
        filter
    }

    fn accepts(&self, update: &UpdateHeader) -> bool {
        self.on_all.iter().any(|k| k.matches_entity(&update.key))
            || (update.update_type.is_change()
                && self.on_change.iter().any(|k| k.matches_entity(&update.key)))
    }

    fn keys(&self) -> impl Iterator<Item = &SubscriptionKey> {
        self.on_all.iter().chain(self.on_change.iter())
    }
}

/// One consumer's subscriptions under a subscription source.
#[derive(Debug, Clone)]
pub struct ConsumerDetails {
    uri: Uri,
    /// Header of the latest REGISTER; NOTIFY messages answer it.
    register_header: MessageHeader,
    subscriptions: BTreeMap<Identifier, SubscriptionFilter>,
    required: BTreeSet<SubscriptionKey>,
}

impl ConsumerDetails {
    pub fn new(uri: Uri, register_header: MessageHeader) -> Self {
        Self {
            uri,
            register_header,
            subscriptions: BTreeMap::new(),
            required: BTreeSet::new(),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn register_header(&self) -> &MessageHeader {
        &self.register_header
    }

    /// Install or replace a subscription's key sets.
    pub fn add_subscription(&mut self, header: &MessageHeader, subscription: &Subscription) {
        self.register_header = header.clone();
        self.subscriptions.insert(
            subscription.subscription_id.clone(),
            SubscriptionFilter::from_subscription(subscription),
        );
        self.recompute_required();
    }

    /// Remove the named subscriptions. Returns how many existed.
    pub fn remove_subscriptions(&mut self, ids: &[Identifier]) -> usize {
        let removed = ids
            .iter()
            .filter(|id| self.subscriptions.remove(*id).is_some())
            .count();
        if removed > 0 {
            self.recompute_required();
        }
        removed
    }

    pub fn has_subscription(&self, id: &Identifier) -> bool {
        self.subscriptions.contains_key(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Union of every subscription's keys.
    pub fn required_keys(&self) -> &BTreeSet<SubscriptionKey> {
        &self.required
    }

    fn recompute_required(&mut self) {
        self.required = self
            .subscriptions
            .values()
            .flat_map(SubscriptionFilter::keys)
            .cloned()
            .collect();
    }

    /// Matched updates per subscription, omitting subscriptions with none.
    ///
    /// `value_lists[i][j]` belongs to `update_headers[j]`.
    pub fn matching_updates(
        &self,
        update_headers: &[UpdateHeader],
        value_lists: &[Vec<Element>],
    ) -> Vec<SubscriptionUpdate> {
        self.subscriptions
            .iter()
            .filter_map(|(id, filter)| {
                let matched: Vec<usize> = update_headers
                    .iter()
                    .enumerate()
                    .filter(|(_, update)| filter.accepts(update))
                    .map(|(j, _)| j)
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                Some(SubscriptionUpdate {
                    subscription_id: id.clone(),
                    update_headers: matched.iter().map(|&j| update_headers[j].clone()).collect(),
                    value_lists: value_lists
                        .iter()
                        .map(|list| matched.iter().filter_map(|&j| list.get(j).cloned()).collect())
                        .collect(),
                })
            })
            .collect()
    }
}
