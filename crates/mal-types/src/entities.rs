//! # Publish/Subscribe Entities
//!
//! Entity keys, subscriptions and update headers exchanged by the
//! PUBSUB interaction pattern.

use crate::body::Element;
use crate::identifiers::{Identifier, Uri};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildcard value for the first (identifier) sub-key.
pub const WILDCARD_ID: &str = "*";

/// Wildcard value for the numeric sub-keys.
pub const WILDCARD_SUBKEY: i64 = 0;

/// A 4-part hierarchical key classifying an update.
///
/// Any sub-key may be absent. An absent sub-key is distinct from the
/// wildcard: it only matches another absent sub-key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub first_sub_key: Option<Identifier>,
    pub second_sub_key: Option<i64>,
    pub third_sub_key: Option<i64>,
    pub fourth_sub_key: Option<i64>,
}

impl EntityKey {
    pub fn new(first: impl Into<Identifier>, second: i64, third: i64, fourth: i64) -> Self {
        Self {
            first_sub_key: Some(first.into()),
            second_sub_key: Some(second),
            third_sub_key: Some(third),
            fourth_sub_key: Some(fourth),
        }
    }

    /// `{*, *, *, *}`.
    pub fn wildcard() -> Self {
        Self::new(WILDCARD_ID, WILDCARD_SUBKEY, WILDCARD_SUBKEY, WILDCARD_SUBKEY)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "null".to_string(), ToString::to_string)
        }
        write!(
            f,
            "[{}.{}.{}.{}]",
            slot(&self.first_sub_key),
            slot(&self.second_sub_key),
            slot(&self.third_sub_key),
            slot(&self.fourth_sub_key)
        )
    }
}

/// Kind of change an update reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UpdateType {
    Creation = 1,
    Update = 2,
    Modification = 3,
    Deletion = 4,
}

impl UpdateType {
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Creation),
            2 => Some(Self::Update),
            3 => Some(Self::Modification),
            4 => Some(Self::Deletion),
            _ => None,
        }
    }

    /// Only a plain `Update` counts as unchanged.
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::Update)
    }
}

/// Header of one published update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateHeader {
    pub timestamp: u64,
    pub source_uri: Uri,
    pub update_type: UpdateType,
    pub key: EntityKey,
}

impl UpdateHeader {
    pub fn new(source_uri: Uri, update_type: UpdateType, key: EntityKey) -> Self {
        Self {
            timestamp: crate::header::MessageHeader::now_ms(),
            source_uri,
            update_type,
            key,
        }
    }
}

/// Set of entity keys a consumer wants, with its change filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRequest {
    /// Only deliver updates whose type is a change.
    pub only_on_change: bool,
    pub entity_keys: Vec<EntityKey>,
}

impl EntityRequest {
    pub fn new(only_on_change: bool, entity_keys: Vec<EntityKey>) -> Self {
        Self {
            only_on_change,
            entity_keys,
        }
    }
}

/// A consumer subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: Identifier,
    pub entities: Vec<EntityRequest>,
}

impl Subscription {
    pub fn new(subscription_id: impl Into<Identifier>, entities: Vec<EntityRequest>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            entities,
        }
    }
}

/// Updates matched for one subscription, carried in a NOTIFY.
///
/// `value_lists[i][j]` is the value of update `j` in published list `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    pub subscription_id: Identifier,
    pub update_headers: Vec<UpdateHeader>,
    pub value_lists: Vec<Vec<Element>>,
}

impl SubscriptionUpdate {
    pub fn is_empty(&self) -> bool {
        self.update_headers.is_empty()
    }
}
