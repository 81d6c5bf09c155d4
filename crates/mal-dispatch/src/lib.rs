//! # MAL Dispatch
//!
//! Send and receive paths of a MAL node, plus the consumer, provider,
//! publisher and broker facades built on them.
//!
//! ## Message Flow
//!
//! ```text
//! Consumer / Publisher ──→ MessageSend ──→ Endpoint ══ transport ══╗
//!                              │                                   ║
//!                     TransactionRegistry                          ║
//!                              ▲                                   ║
//! Endpoint listener ──→ MessageReceive ◄═══════════════════════════╝
//!                         ├── ProviderHandler (initiations, own task)
//!                         ├── BrokerBinding   (PUBSUB to broker)
//!                         ├── NotifyListeners / PublishListeners
//!                         └── TransactionRegistry (every other stage)
//! ```
//!
//! `MalRuntime` wires all of the above to one endpoint.
//!
//! ## Configuration
//!
//! | Variable               | Default | Meaning                               |
//! |------------------------|---------|---------------------------------------|
//! | `MAL_SYNC_TIMEOUT`     | `30s`   | Bound on synchronous waits (`none`)   |
//! | `MAL_TRANSACTION_TTL`  | `300s`  | Age after which a transaction is purged |
//! | `MAL_CLEANUP_INTERVAL` | `30s`   | Purge period                          |
//! | `MAL_DEFAULT_QOS`      | `BESTEFFORT` | QoS level of new headers         |
//! | `MAL_DEFAULT_PRIORITY` | `0`     | Priority of new headers               |
//! | `MAL_CHANNEL_CAPACITY` | `1024`  | Endpoint buffer (`MalRuntime::bind`)  |

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod broker;
pub mod config;
pub mod consumer;
pub mod details;
pub mod metrics;
pub mod provider;
pub mod publisher;
pub mod receive;
pub mod runtime;
pub mod send;
pub mod stages;

pub use broker::BrokerBinding;
pub use config::{ConfigError, RuntimeConfig};
pub use consumer::Consumer;
pub use details::InteractionDetails;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use provider::{Interaction, ProviderHandler};
pub use publisher::Publisher;
pub use receive::{HandlerKey, MessageReceive, ReceiveListener};
pub use runtime::MalRuntime;
pub use send::MessageSend;
pub use stages::calculate_error_stage;
