//! Progress reporting and cancellation hooks for migration batches

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::migration::Direction;

/// What happened to one migration in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed { affected_rows: u64 },
    /// The script was empty; nothing ran and the ledger was left alone
    Skipped,
}

/// Observer of a running batch
pub trait Progress: Send + Sync {
    fn begin(&self, _direction: Direction, _total: usize) {}

    fn step(&self, _id: &str, _outcome: &StepOutcome) {}

    fn finish(&self) {}
}

/// Reports nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Shared flag a batch checks before starting each migration.
///
/// A request applies to the batch that is running, or to the next one to
/// start, and is cleared when that batch returns.
#[derive(Debug, Default, Clone)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
