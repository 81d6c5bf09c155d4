//! # Message Header
//!
//! The MAL message header and the enumerations it carries.
//!
//! ## Wire Fidelity
//!
//! The ordinals below are fixed by the MAL standard and must not change:
//! interaction type, interaction stage, QoS level and session type are all
//! transmitted as their numeric value.

use crate::identifiers::{Domain, Identifier, Uri};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Correlator linking every message of one interaction instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TransactionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// The six MAL interaction patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum InteractionType {
    Send = 1,
    Submit = 2,
    Request = 3,
    Invoke = 4,
    Progress = 5,
    PubSub = 6,
}

impl InteractionType {
    /// Wire ordinal.
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Decode a wire ordinal.
    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Send),
            2 => Some(Self::Submit),
            3 => Some(Self::Request),
            4 => Some(Self::Invoke),
            5 => Some(Self::Progress),
            6 => Some(Self::PubSub),
            _ => None,
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Send => "SEND",
            Self::Submit => "SUBMIT",
            Self::Request => "REQUEST",
            Self::Invoke => "INVOKE",
            Self::Progress => "PROGRESS",
            Self::PubSub => "PUBSUB",
        };
        f.write_str(name)
    }
}

/// A numbered step within an interaction pattern.
///
/// Stage numbers are only meaningful together with the interaction type:
/// SUBMIT, REQUEST, INVOKE and PROGRESS all start at stage 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionStage(u8);

impl InteractionStage {
    pub const SUBMIT: Self = Self(1);
    pub const SUBMIT_ACK: Self = Self(2);

    pub const REQUEST: Self = Self(1);
    pub const REQUEST_RESPONSE: Self = Self(2);

    pub const INVOKE: Self = Self(1);
    pub const INVOKE_ACK: Self = Self(2);
    pub const INVOKE_RESPONSE: Self = Self(3);

    pub const PROGRESS: Self = Self(1);
    pub const PROGRESS_ACK: Self = Self(2);
    pub const PROGRESS_UPDATE: Self = Self(3);
    pub const PROGRESS_RESPONSE: Self = Self(4);

    pub const REGISTER: Self = Self(1);
    pub const REGISTER_ACK: Self = Self(2);
    pub const PUBLISH_REGISTER: Self = Self(3);
    pub const PUBLISH_REGISTER_ACK: Self = Self(4);
    pub const PUBLISH: Self = Self(5);
    pub const NOTIFY: Self = Self(6);
    pub const DEREGISTER: Self = Self(7);
    pub const DEREGISTER_ACK: Self = Self(8);
    pub const PUBLISH_DEREGISTER: Self = Self(9);
    pub const PUBLISH_DEREGISTER_ACK: Self = Self(10);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Wire ordinal.
    pub const fn ordinal(self) -> u8 {
        self.0
    }

    /// Human-readable stage name for logs, e.g. `INVOKE_ACK`.
    pub fn name(interaction_type: InteractionType, stage: Option<Self>) -> &'static str {
        let Some(stage) = stage else {
            return if interaction_type == InteractionType::Send {
                "SEND"
            } else {
                "NONE"
            };
        };

        match (interaction_type, stage.0) {
            (InteractionType::Submit, 1) => "SUBMIT",
            (InteractionType::Submit, 2) => "SUBMIT_ACK",
            (InteractionType::Request, 1) => "REQUEST",
            (InteractionType::Request, 2) => "REQUEST_RESPONSE",
            (InteractionType::Invoke, 1) => "INVOKE",
            (InteractionType::Invoke, 2) => "INVOKE_ACK",
            (InteractionType::Invoke, 3) => "INVOKE_RESPONSE",
            (InteractionType::Progress, 1) => "PROGRESS",
            (InteractionType::Progress, 2) => "PROGRESS_ACK",
            (InteractionType::Progress, 3) => "PROGRESS_UPDATE",
            (InteractionType::Progress, 4) => "PROGRESS_RESPONSE",
            (InteractionType::PubSub, 1) => "REGISTER",
            (InteractionType::PubSub, 2) => "REGISTER_ACK",
            (InteractionType::PubSub, 3) => "PUBLISH_REGISTER",
            (InteractionType::PubSub, 4) => "PUBLISH_REGISTER_ACK",
            (InteractionType::PubSub, 5) => "PUBLISH",
            (InteractionType::PubSub, 6) => "NOTIFY",
            (InteractionType::PubSub, 7) => "DEREGISTER",
            (InteractionType::PubSub, 8) => "DEREGISTER_ACK",
            (InteractionType::PubSub, 9) => "PUBLISH_DEREGISTER",
            (InteractionType::PubSub, 10) => "PUBLISH_DEREGISTER_ACK",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for InteractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quality of service level requested for delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum QosLevel {
    #[default]
    BestEffort = 1,
    Assured = 2,
    Queued = 3,
    Timely = 4,
}

impl QosLevel {
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::BestEffort),
            2 => Some(Self::Assured),
            3 => Some(Self::Queued),
            4 => Some(Self::Timely),
            _ => None,
        }
    }
}

/// Session the message belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionType {
    #[default]
    Live = 1,
    Simulation = 2,
    Replay = 3,
}

impl SessionType {
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Live),
            2 => Some(Self::Simulation),
            3 => Some(Self::Replay),
            _ => None,
        }
    }
}

/// Immutable QoS property map.
///
/// Cloning shares the underlying map; `with` produces a new map and leaves
/// every existing clone untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QosProperties(Arc<BTreeMap<String, String>>);

impl QosProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(Arc::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Copy with one extra property.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = (*self.0).clone();
        map.insert(key.into(), value.into());
        Self(Arc::new(map))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Static description of a service operation, as emitted by generated stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    pub name: &'static str,
    pub area: u16,
    pub service: u16,
    pub area_version: u8,
    pub number: u16,
    pub interaction_type: InteractionType,
}

impl Operation {
    pub const fn new(
        name: &'static str,
        area: u16,
        service: u16,
        area_version: u8,
        number: u16,
        interaction_type: InteractionType,
    ) -> Self {
        Self {
            name,
            area,
            service,
            area_version,
            number,
            interaction_type,
        }
    }
}

/// The MAL message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    // =========================================================================
    // ADDRESSING
    // =========================================================================
    pub uri_from: Uri,
    pub authentication_id: Bytes,
    pub uri_to: Uri,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,

    // =========================================================================
    // DELIVERY
    // =========================================================================
    pub qos_level: QosLevel,
    pub priority: u32,
    pub domain: Domain,
    pub network_zone: Identifier,
    pub session: SessionType,
    pub session_name: Identifier,

    // =========================================================================
    // INTERACTION
    // =========================================================================
    pub interaction_type: InteractionType,
    /// Absent for SEND.
    pub interaction_stage: Option<InteractionStage>,
    pub transaction_id: Option<TransactionId>,

    // =========================================================================
    // SERVICE
    // =========================================================================
    pub service_area: u16,
    pub service: u16,
    pub operation: u16,
    pub area_version: u8,

    pub is_error_message: bool,

    pub qos_properties: QosProperties,
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self {
            uri_from: Uri::default(),
            authentication_id: Bytes::new(),
            uri_to: Uri::default(),
            timestamp: 0,
            qos_level: QosLevel::BestEffort,
            priority: 0,
            domain: Domain::default(),
            network_zone: Identifier::default(),
            session: SessionType::Live,
            session_name: Identifier::default(),
            interaction_type: InteractionType::Send,
            interaction_stage: None,
            transaction_id: None,
            service_area: 0,
            service: 0,
            operation: 0,
            area_version: 0,
            is_error_message: false,
            qos_properties: QosProperties::default(),
        }
    }
}

impl MessageHeader {
    /// Current time in milliseconds since the Unix epoch.
    pub fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    /// Name of this header's stage, for logging.
    pub fn stage_name(&self) -> &'static str {
        InteractionStage::name(self.interaction_type, self.interaction_stage)
    }

    /// Header of a reply to this message: addresses swapped, same
    /// transaction and operation, new stage and error flag.
    pub fn reply(&self, stage: InteractionStage, is_error: bool) -> Self {
        Self {
            uri_from: self.uri_to.clone(),
            uri_to: self.uri_from.clone(),
            timestamp: Self::now_ms(),
            interaction_stage: Some(stage),
            is_error_message: is_error,
            ..self.clone()
        }
    }

    /// True if both headers address the same operation of the same service.
    pub fn same_operation(&self, other: &MessageHeader) -> bool {
        self.service_area == other.service_area
            && self.service == other.service
            && self.operation == other.operation
            && self.area_version == other.area_version
    }
}
