//! # Message Body
//!
//! A body is an ordered sequence of typed elements. The runtime only looks
//! inside the elements it needs; everything else travels as an opaque
//! `Value`.

use crate::entities::{EntityKey, Subscription, SubscriptionUpdate, UpdateHeader};
use crate::errors::{MalError, MalResult, StandardError};
use crate::header::MessageHeader;
use crate::identifiers::Identifier;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One element of a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Null,
    Boolean(bool),
    Long(i64),
    UInteger(u32),
    String(String),
    Identifier(Identifier),
    Blob(Bytes),
    IdentifierList(Vec<Identifier>),
    EntityKeyList(Vec<EntityKey>),
    Subscription(Subscription),
    UpdateHeaderList(Vec<UpdateHeader>),
    SubscriptionUpdateList(Vec<SubscriptionUpdate>),
    List(Vec<Element>),
    /// Opaque application payload.
    Value(serde_json::Value),
}

impl Element {
    /// Short type name used in encoding diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::Long(_) => "Long",
            Self::UInteger(_) => "UInteger",
            Self::String(_) => "String",
            Self::Identifier(_) => "Identifier",
            Self::Blob(_) => "Blob",
            Self::IdentifierList(_) => "IdentifierList",
            Self::EntityKeyList(_) => "EntityKeyList",
            Self::Subscription(_) => "Subscription",
            Self::UpdateHeaderList(_) => "UpdateHeaderList",
            Self::SubscriptionUpdateList(_) => "SubscriptionUpdateList",
            Self::List(_) => "List",
            Self::Value(_) => "Value",
        }
    }
}

impl From<serde_json::Value> for Element {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<bool> for Element {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Ordered body elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    elements: Vec<Element>,
}

macro_rules! typed_accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self, index: usize) -> MalResult<&$ty> {
            match self.element(index)? {
                Element::$variant(v) => Ok(v),
                other => Err(MalError::BadEncoding(format!(
                    "element {} is {}, expected {}",
                    index,
                    other.type_name(),
                    stringify!($variant)
                ))),
            }
        }
    };
}

impl MessageBody {
    pub fn new(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Single-element body.
    pub fn single(element: impl Into<Element>) -> Self {
        Self::new(vec![element.into()])
    }

    /// Body of an error-flagged message: error number then extra information.
    pub fn error(err: &StandardError) -> Self {
        Self::new(vec![
            Element::UInteger(err.number),
            err.extra_information.clone(),
        ])
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Element at `index`, or `BadEncoding` if the body is too short.
    pub fn element(&self, index: usize) -> MalResult<&Element> {
        self.elements.get(index).ok_or_else(|| {
            MalError::BadEncoding(format!(
                "body has {} element(s), wanted index {}",
                self.elements.len(),
                index
            ))
        })
    }

    typed_accessor!(subscription, Subscription, Subscription);
    typed_accessor!(identifier_list, IdentifierList, Vec<Identifier>);
    typed_accessor!(entity_key_list, EntityKeyList, Vec<EntityKey>);
    typed_accessor!(update_header_list, UpdateHeaderList, Vec<UpdateHeader>);
    typed_accessor!(
        subscription_update_list,
        SubscriptionUpdateList,
        Vec<SubscriptionUpdate>
    );
    typed_accessor!(
        /// Nested list of elements, as used for PUBLISH value lists.
        list,
        List,
        Vec<Element>
    );
    typed_accessor!(value, Value, serde_json::Value);

    /// Decode the body of an error-flagged message.
    pub fn standard_error(&self) -> MalResult<StandardError> {
        let number = match self.element(0)? {
            Element::UInteger(n) => *n,
            Element::Long(n) => u32::try_from(*n)
                .map_err(|_| MalError::BadEncoding(format!("error number {} out of range", n)))?,
            other => {
                return Err(MalError::BadEncoding(format!(
                    "error number is {}",
                    other.type_name()
                )))
            }
        };
        let extra = self.get(1).cloned().unwrap_or(Element::Null);
        Ok(StandardError::new(number, extra))
    }
}

impl From<Vec<Element>> for MessageBody {
    fn from(elements: Vec<Element>) -> Self {
        Self::new(elements)
    }
}

/// A complete MAL message. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl Message {
    pub fn new(header: MessageHeader, body: MessageBody) -> Self {
        Self { header, body }
    }

    /// Remote error carried by this message, if it is error-flagged.
    ///
    /// A malformed error body still yields an error, as `BadEncoding`.
    pub fn as_error(&self) -> Option<MalError> {
        if !self.header.is_error_message {
            return None;
        }
        Some(match self.body.standard_error() {
            Ok(err) => MalError::Standard(err),
            Err(err) => err,
        })
    }
}
