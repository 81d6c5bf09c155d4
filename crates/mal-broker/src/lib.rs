//! # MAL Broker - Publish/Subscribe Matching
//!
//! ## Bookkeeping
//!
//! ```text
//! BrokerEngine
//! ├── sources:   SourceSignature ──→ SubscriptionSource
//! │                                   └── consumer URI ──→ ConsumerDetails
//! │                                                        └── subscription id ──→ key sets
//! └── providers: (ServiceKey, provider URI) ──→ ProviderDetails
//! ```
//!
//! - A subscription source is created on the first REGISTER for its
//!   signature and removed when its last consumer deregisters.
//! - Re-registering a subscription id replaces its key sets.
//! - A PUBLISH is checked as a unit: domain first, then publish rights.
//!
//! The runtime talks to the broker through the `BrokerHandler` trait, so a
//! different broker can be passed in at construction.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod consumer;
pub mod engine;
pub mod keys;
pub mod provider;
pub mod source;

pub use consumer::ConsumerDetails;
pub use engine::{BrokerEngine, BrokerHandler};
pub use keys::{PublisherKey, SubscriptionKey};
pub use provider::ProviderDetails;
pub use source::{NotifyMessageSet, ServiceKey, SourceSignature, SubscriptionSource};
