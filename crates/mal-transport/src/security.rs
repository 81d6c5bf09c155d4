//! # Security Check Port

use mal_types::{MalResult, Message};

/// Applied to every outbound and inbound message before further processing.
///
/// Returns the (possibly rewritten) message, or `MalError::Security`.
pub trait SecurityCheck: Send + Sync {
    fn check(&self, message: Message) -> MalResult<Message>;
}

/// Pass-through check.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSecurityCheck;

impl SecurityCheck for NullSecurityCheck {
    fn check(&self, message: Message) -> MalResult<Message> {
        Ok(message)
    }
}
