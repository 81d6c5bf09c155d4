//! Transaction id allocation.

use mal_types::TransactionId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates transaction ids for one registry.
pub trait IdGenerator: Send + Sync {
    /// Next id. Never repeats for the generator's lifetime.
    fn next_id(&self) -> TransactionId;
}

/// Monotonic counter starting at 1.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> TransactionId {
        TransactionId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
