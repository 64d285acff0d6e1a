//! ID allocation
//!
//! Region and peer ids come from a cluster-wide allocator that lives outside
//! the directory. The coordinator only needs the [`IdAllocator`] seam; the
//! in-memory [`LocalIdAllocator`] backs single-node deployments and tests.

use crate::common::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of globally unique, never reused ids
pub trait IdAllocator: Send + Sync {
    fn alloc(&self) -> Result<u64>;
}

/// Monotonic in-memory allocator over `[next, limit)`
#[derive(Debug)]
pub struct LocalIdAllocator {
    next: AtomicU64,
    limit: u64,
}

impl LocalIdAllocator {
    pub fn new(start: u64) -> Self {
        Self::with_limit(start, u64::MAX)
    }

    pub fn with_limit(start: u64, limit: u64) -> Self {
        Self {
            // 0 means "unset" on the wire
            next: AtomicU64::new(start.max(1)),
            limit,
        }
    }

    /// Next id that would be handed out
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for LocalIdAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdAllocator for LocalIdAllocator {
    fn alloc(&self) -> Result<u64> {
        let limit = self.limit;
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| (id < limit).then_some(id + 1))
            .map_err(|id| {
                Error::AllocationFailure(format!("id space exhausted at {} (limit {})", id, limit))
            })
    }
}
