//! # Error Types
//!
//! The runtime-wide `MalError` and the MAL standard error numbers used in
//! error replies.

use crate::body::Element;
use crate::entities::EntityKey;
use crate::header::TransactionId;
use crate::identifiers::{Domain, Uri};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// MAL standard error numbers.
pub mod error_numbers {
    // Delivery errors
    pub const DELIVERY_FAILED: u32 = 65536;
    pub const DELIVERY_TIMEDOUT: u32 = 65537;
    pub const DELIVERY_DELAYED: u32 = 65538;
    pub const DESTINATION_UNKNOWN: u32 = 65539;
    pub const DESTINATION_TRANSIENT: u32 = 65540;
    pub const DESTINATION_LOST: u32 = 65541;

    // Security errors
    pub const AUTHENTICATION_FAIL: u32 = 65542;
    pub const AUTHORISATION_FAIL: u32 = 65543;
    pub const ENCRYPTION_FAIL: u32 = 65544;

    // Support errors
    pub const UNSUPPORTED_AREA: u32 = 65545;
    pub const UNSUPPORTED_OPERATION: u32 = 65546;
    pub const UNSUPPORTED_VERSION: u32 = 65547;

    // Processing errors
    pub const BAD_ENCODING: u32 = 65548;
    pub const INTERNAL: u32 = 65549;
    pub const UNKNOWN: u32 = 65550;
    pub const INCORRECT_STATE: u32 = 65551;
    pub const TOO_MANY: u32 = 65552;
    pub const SHUTDOWN: u32 = 65553;

    /// Symbolic name of a standard error number.
    pub fn name(number: u32) -> Option<&'static str> {
        let name = match number {
            DELIVERY_FAILED => "DELIVERY_FAILED",
            DELIVERY_TIMEDOUT => "DELIVERY_TIMEDOUT",
            DELIVERY_DELAYED => "DELIVERY_DELAYED",
            DESTINATION_UNKNOWN => "DESTINATION_UNKNOWN",
            DESTINATION_TRANSIENT => "DESTINATION_TRANSIENT",
            DESTINATION_LOST => "DESTINATION_LOST",
            AUTHENTICATION_FAIL => "AUTHENTICATION_FAIL",
            AUTHORISATION_FAIL => "AUTHORISATION_FAIL",
            ENCRYPTION_FAIL => "ENCRYPTION_FAIL",
            UNSUPPORTED_AREA => "UNSUPPORTED_AREA",
            UNSUPPORTED_OPERATION => "UNSUPPORTED_OPERATION",
            UNSUPPORTED_VERSION => "UNSUPPORTED_VERSION",
            BAD_ENCODING => "BAD_ENCODING",
            INTERNAL => "INTERNAL",
            UNKNOWN => "UNKNOWN",
            INCORRECT_STATE => "INCORRECT_STATE",
            TOO_MANY => "TOO_MANY",
            SHUTDOWN => "SHUTDOWN",
            _ => return None,
        };
        Some(name)
    }
}

/// Error carried in the body of an error-flagged message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardError {
    pub number: u32,
    pub extra_information: Element,
}

impl StandardError {
    pub fn new(number: u32, extra_information: Element) -> Self {
        Self {
            number,
            extra_information,
        }
    }

    /// Error with a text explanation.
    pub fn with_text(number: u32, text: impl Into<String>) -> Self {
        Self::new(number, Element::String(text.into()))
    }
}

impl fmt::Display for StandardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match error_numbers::name(self.number) {
            Some(name) => write!(f, "{} ({})", name, self.number)?,
            None => write!(f, "{}", self.number)?,
        }
        match &self.extra_information {
            Element::Null => Ok(()),
            Element::String(text) => write!(f, ": {}", text),
            other => write!(f, ": {:?}", other),
        }
    }
}

/// Runtime-wide MAL error.
#[derive(Debug, Clone, Error)]
pub enum MalError {
    /// The remote party replied with an error message.
    #[error("Remote error: {0}")]
    Standard(StandardError),

    /// A stage arrived out of the pattern's order.
    #[error("Unexpected stage {stage} for transaction {transaction_id}")]
    UnexpectedStage {
        transaction_id: TransactionId,
        stage: &'static str,
    },

    /// A message carried an interaction type and stage with no route.
    #[error("Unroutable message: {interaction} stage {stage}")]
    UnroutableStage {
        interaction: &'static str,
        stage: &'static str,
    },

    /// No pending interaction with this id.
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TransactionId),

    /// Caller or provider violated the pattern sequencing.
    #[error("Incorrect state: {0}")]
    IncorrectState(String),

    /// Message body did not hold the expected element types.
    #[error("Bad encoding: {0}")]
    BadEncoding(String),

    /// Provider published keys it never registered.
    #[error("Publish rights violation: {} unregistered key(s)", keys.len())]
    PublishRightsViolation { keys: Vec<EntityKey> },

    /// Publish domain is outside the provider's registered domain.
    #[error("Domain violation: {domain} is not within {registered}")]
    DomainViolation { domain: Domain, registered: Domain },

    /// No handler or endpoint for the addressed URI.
    #[error("Destination unknown: {0}")]
    DestinationUnknown(Uri),

    /// Synchronous wait expired.
    #[error("Delivery timed out for transaction {0}")]
    DeliveryTimedOut(TransactionId),

    /// Local send failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Security check rejected the message.
    #[error("Security check failed: {0}")]
    Security(String),

    /// Invalid runtime configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The runtime is shutting down.
    #[error("Shutdown")]
    Shutdown,
}

impl MalError {
    /// Map onto the standard error carried in an error reply.
    pub fn to_standard(&self) -> StandardError {
        use error_numbers as n;

        match self {
            Self::Standard(err) => err.clone(),
            Self::UnexpectedStage { .. }
            | Self::UnknownTransaction(_)
            | Self::IncorrectState(_) => StandardError::with_text(n::INCORRECT_STATE, self.to_string()),
            Self::UnroutableStage { .. } => {
                StandardError::with_text(n::UNSUPPORTED_OPERATION, self.to_string())
            }
            Self::BadEncoding(_) => StandardError::with_text(n::BAD_ENCODING, self.to_string()),
            Self::PublishRightsViolation { keys } => {
                StandardError::new(n::UNKNOWN, Element::EntityKeyList(keys.clone()))
            }
            Self::DomainViolation { domain, .. } => {
                StandardError::new(n::UNKNOWN, Element::IdentifierList(domain.parts().to_vec()))
            }
            Self::DestinationUnknown(_) => {
                StandardError::with_text(n::DESTINATION_UNKNOWN, self.to_string())
            }
            Self::DeliveryTimedOut(_) => {
                StandardError::with_text(n::DELIVERY_TIMEDOUT, self.to_string())
            }
            Self::Transport(_) => StandardError::with_text(n::DELIVERY_FAILED, self.to_string()),
            Self::Security(_) => StandardError::with_text(n::AUTHORISATION_FAIL, self.to_string()),
            Self::Config(_) => StandardError::with_text(n::INTERNAL, self.to_string()),
            Self::Shutdown => StandardError::new(n::SHUTDOWN, Element::Null),
        }
    }

    /// Standard error number this error maps onto.
    pub fn number(&self) -> u32 {
        self.to_standard().number
    }
}

impl From<StandardError> for MalError {
    fn from(err: StandardError) -> Self {
        Self::Standard(err)
    }
}

/// Result alias used throughout the runtime.
pub type MalResult<T> = Result<T, MalError>;
