//! # Subscription and Publisher Keys
//!
//! Immutable broker-side forms of an `EntityKey`.
//!
//! ## Matching
//!
//! Two keys match when every one of the four slots matches. A slot matches
//! when either side is the wildcard (`"*"` for the identifier slot, `0` for
//! the numeric slots) or both values are equal. The wildcard test comes
//! first; an absent value then only matches another absent value.
//!
//! ## Ordering
//!
//! `Ord` is lexicographic over the slots with absent values lowest. It only
//! gives maps a deterministic order and says nothing about matching.

use mal_types::{EntityKey, Identifier, WILDCARD_ID, WILDCARD_SUBKEY};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    first: Option<String>,
    second: Option<i64>,
    third: Option<i64>,
    fourth: Option<i64>,
}

fn id_slot_matches(a: Option<&str>, b: Option<&str>) -> bool {
    if a == Some(WILDCARD_ID) || b == Some(WILDCARD_ID) {
        return true;
    }
    a == b
}

fn num_slot_matches(a: Option<i64>, b: Option<i64>) -> bool {
    if a == Some(WILDCARD_SUBKEY) || b == Some(WILDCARD_SUBKEY) {
        return true;
    }
    a == b
}

impl SubscriptionKey {
    pub fn new(
        first: Option<&str>,
        second: Option<i64>,
        third: Option<i64>,
        fourth: Option<i64>,
    ) -> Self {
        Self {
            first: first.map(str::to_string),
            second,
            third,
            fourth,
        }
    }

    /// True if the two keys match slot by slot.
    pub fn matches(&self, other: &SubscriptionKey) -> bool {
        id_slot_matches(self.first.as_deref(), other.first.as_deref())
            && num_slot_matches(self.second, other.second)
            && num_slot_matches(self.third, other.third)
            && num_slot_matches(self.fourth, other.fourth)
    }

    /// Match against an entity key without converting it.
    pub fn matches_entity(&self, key: &EntityKey) -> bool {
        let first = key.first_sub_key.as_ref().map(Identifier::as_str);
        id_slot_matches(self.first.as_deref(), first)
            && num_slot_matches(self.second, key.second_sub_key)
            && num_slot_matches(self.third, key.third_sub_key)
            && num_slot_matches(self.fourth, key.fourth_sub_key)
    }

    pub fn to_entity_key(&self) -> EntityKey {
        EntityKey {
            first_sub_key: self.first.as_deref().map(Identifier::new),
            second_sub_key: self.second,
            third_sub_key: self.third,
            fourth_sub_key: self.fourth,
        }
    }
}

impl From<&EntityKey> for SubscriptionKey {
    fn from(key: &EntityKey) -> Self {
        Self {
            first: key.first_sub_key.as_ref().map(|id| id.as_str().to_string()),
            second: key.second_sub_key,
            third: key.third_sub_key,
            fourth: key.fourth_sub_key,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_entity_key().fmt(f)
    }
}

/// A key a provider is authorised to publish under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublisherKey(SubscriptionKey);

impl PublisherKey {
    /// True if this authorisation covers the published key.
    pub fn covers(&self, key: &EntityKey) -> bool {
        self.0.matches_entity(key)
    }

    pub fn as_subscription_key(&self) -> &SubscriptionKey {
        &self.0
    }
}

impl From<&EntityKey> for PublisherKey {
    fn from(key: &EntityKey) -> Self {
        Self(SubscriptionKey::from(key))
    }
}

impl fmt::Display for PublisherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
