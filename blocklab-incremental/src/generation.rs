//! Render generations
//!
//! A generation names the lifetime of one content snapshot. Everything
//! cached against a generation becomes unreachable once a newer one is
//! observed; nothing is invalidated entry by entry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one content snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation::ZERO
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Hands out strictly increasing generations
#[derive(Debug, Default)]
pub struct GenerationCounter(AtomicU64);

impl GenerationCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// The most recently allocated generation
    pub fn current(&self) -> Generation {
        Generation(self.0.load(Ordering::SeqCst))
    }

    /// Allocate and return the next generation
    pub fn bump(&self) -> Generation {
        Generation(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
