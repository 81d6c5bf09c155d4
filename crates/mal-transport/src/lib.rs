//! # MAL Transport - Endpoint Ports
//!
//! The runtime never moves bytes itself. It consumes two capabilities:
//!
//! - **`Endpoint`**: a URI identity that can send a `Message` and hands every
//!   inbound message to one registered `MessageListener`.
//! - **`SecurityCheck`**: applied to every outbound and inbound message.
//!
//! ## In-Memory Transport
//!
//! ```text
//! ┌──────────────┐   send()    ┌──────────────────┐   on_message()   ┌──────────────┐
//! │ Endpoint A   │ ──────────→ │ InMemoryTransport│ ───────────────→ │ Endpoint B   │
//! │ malmem://a   │             │  URI → channel   │                  │ listener     │
//! └──────────────┘             └──────────────────┘                  └──────────────┘
//! ```
//!
//! Each endpoint owns a bounded channel and a receive task. Messages reach
//! the listener in arrival order.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod endpoint;
pub mod memory;
pub mod security;

pub use endpoint::{Endpoint, MessageListener};
pub use memory::{InMemoryEndpoint, InMemoryTransport};
pub use security::{NullSecurityCheck, SecurityCheck};

use mal_types::{MalError, Uri};
use thiserror::Error;

/// URI scheme used by the in-memory transport.
pub const MEMORY_SCHEME: &str = "malmem";

/// Messages buffered per endpoint before `send` waits for room.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Errors raised by an endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No endpoint is bound to the destination URI.
    #[error("Destination unknown: {0}")]
    DestinationUnknown(Uri),

    /// The destination existed but stopped receiving.
    #[error("Destination lost: {0}")]
    DestinationLost(Uri),

    /// This endpoint has been closed.
    #[error("Endpoint closed: {0}")]
    Closed(Uri),

    /// A URI is already bound on this transport.
    #[error("URI already bound: {0}")]
    AlreadyBound(Uri),
}

impl From<TransportError> for MalError {
    fn from(err: TransportError) -> Self {
        MalError::Transport(err.to_string())
    }
}
