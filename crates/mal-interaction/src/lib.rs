//! # MAL Interaction - Transaction Tracking
//!
//! Tracks in-flight interactions from initiation to their terminal stage.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | `TransactionRegistry` | id → pending interaction, result cells, provider-side sources |
//! | `InteractionState` | per-pattern progress and the single stage transition |
//! | `InteractionListener` | callbacks for stages no synchronous caller takes |
//! | `NotifyListeners` / `PublishListeners` | routes for NOTIFY and PUBLISH errors |
//!
//! ## Locking
//!
//! Each map has its own lock. No lock is held across an `.await`. Listener
//! callbacks are pushed to a `ListenerQueue` and run on its task, never on
//! the task that routed the stage.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod id;
pub mod listener;
pub mod registry;
pub mod routes;
pub mod state;

pub use id::{IdGenerator, SequentialIdGenerator};
pub use listener::{InteractionListener, ListenerCall, ListenerQueue};
pub use registry::{cleanup_task, RegistryStats, TransactionRegistry, TransactionSource};
pub use routes::{NotifyKey, NotifyListeners, PublishListeners};
pub use state::{InteractionPattern, InteractionState, Transition};
