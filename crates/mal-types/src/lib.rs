//! # MAL Types Crate
//!
//! Wire-level types for the Message Abstraction Layer runtime.
//!
//! ## Design Principles
//!
//! - **Header Fidelity**: every `MessageHeader` field crosses a transport
//!   unchanged. Ordinals for interaction types, stages, QoS levels and
//!   session types are fixed by the MAL standard.
//! - **Opaque Bodies**: a `MessageBody` is an ordered sequence of typed
//!   `Element`s. The runtime only inspects the elements it needs
//!   (subscriptions, entity keys, update headers, error bodies).
//! - **Immutable Messages**: a `Message` is cloned, never mutated, once sent.

pub mod body;
pub mod entities;
pub mod errors;
pub mod header;
pub mod identifiers;

pub use body::{Element, Message, MessageBody};
pub use entities::{
    EntityKey, EntityRequest, Subscription, SubscriptionUpdate, UpdateHeader, UpdateType,
    WILDCARD_ID, WILDCARD_SUBKEY,
};
pub use errors::{error_numbers, MalError, MalResult, StandardError};
pub use header::{
    InteractionStage, InteractionType, MessageHeader, Operation, QosLevel, QosProperties,
    SessionType, TransactionId,
};
pub use identifiers::{Domain, Identifier, Uri};
