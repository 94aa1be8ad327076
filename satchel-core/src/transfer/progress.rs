use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::archive::ArchiveWarning;

/// Callbacks a caller receives while a transfer runs. Called from the
/// transfer's worker task, never from the caller's own thread.
pub trait TransferObserver: Send + Sync {
    fn on_progress(&self, processed: u64, total: u64);

    /// Called exactly once per operation.
    fn on_complete(&self, success: bool, message: &str);

    /// Non-fatal degradations, delivered just before `on_complete`.
    fn on_warnings(&self, _warnings: &[ArchiveWarning]) {}
}

pub const PROGRESS_TOTAL: u64 = 100;
// 100 is reserved for "done, including the import step"
const BYTES_CEILING: u64 = PROGRESS_TOTAL - 1;

const NOTHING_REPORTED: u64 = u64::MAX;

/// Turns byte counts into monotonic percentages for an observer.
#[derive(Clone)]
pub struct ProgressTracker {
    observer: Arc<dyn TransferObserver>,
    last: Arc<AtomicU64>,
}

impl ProgressTracker {
    pub fn new(observer: Arc<dyn TransferObserver>) -> Self {
        Self {
            observer,
            last: Arc::new(AtomicU64::new(NOTHING_REPORTED)),
        }
    }

    pub fn start(&self) {
        self.emit(0, true);
    }

    pub fn bytes(&self, done: u64, total: u64) {
        let pct = if total == 0 {
            BYTES_CEILING
        } else {
            ((done.min(total) as u128 * BYTES_CEILING as u128) / total as u128) as u64
        };
        self.emit(pct, false);
    }

    /// Terminal report: 100 on success, otherwise the last value again.
    pub fn finish(&self, success: bool) {
        if success {
            self.emit(PROGRESS_TOTAL, true);
        } else {
            let last = self.last();
            self.observer.on_progress(last, PROGRESS_TOTAL);
        }
    }

    pub fn last(&self) -> u64 {
        match self.last.load(Ordering::SeqCst) {
            NOTHING_REPORTED => 0,
            v => v,
        }
    }

    fn emit(&self, pct: u64, force: bool) {
        let prev = self.last.load(Ordering::SeqCst);
        let fresh = prev == NOTHING_REPORTED;
        if !fresh && pct < prev {
            return;
        }
        if !fresh && pct == prev && !force {
            return;
        }
        self.last.store(pct, Ordering::SeqCst);
        self.observer.on_progress(pct, PROGRESS_TOTAL);
    }
}
