//! Progress hooks for the fan-out.
//!
//! Every finished fetch (successful or not) advances the callback by one, so
//! a run over N projects counts up to 2N. The renderer is chosen by the
//! binary: an `indicatif` bar on a terminal, [`LogProgress`] under cron, or
//! [`NullProgress`] in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress updates from fetch tasks.
///
/// Called concurrently from spawned tasks, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Set the number of fetches that will be reported.
    fn set_total(&self, total: u64);

    /// Record `delta` more finished fetches.
    fn inc(&self, delta: u64);

    /// Replace the status message.
    fn set_message(&self, msg: String);

    /// Stop reporting, leaving `msg` as the final status.
    fn finish(&self, msg: String);

    /// Stop reporting and remove any on-screen indicator.
    fn finish_and_clear(&self);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Logs a line every `every` finished fetches and on completion.
///
/// Meant for non-interactive runs where a redrawn bar would only pollute
/// the captured output.
pub struct LogProgress {
    every: u64,
    total: AtomicU64,
    done: AtomicU64,
}

impl LogProgress {
    /// Creates a shared logger that reports every `every` fetches.
    #[must_use]
    pub fn shared(every: u64) -> Arc<dyn ProgressCallback> {
        Arc::new(Self {
            every: every.max(1),
            total: AtomicU64::new(0),
            done: AtomicU64::new(0),
        })
    }

    fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }
}

impl ProgressCallback for LogProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    fn inc(&self, delta: u64) {
        let before = self.done.fetch_add(delta, Ordering::Relaxed);
        let after = before + delta;
        if after / self.every > before / self.every {
            log::info!(
                "Collected {after}/{} reports",
                self.total.load(Ordering::Relaxed)
            );
        }
    }

    fn set_message(&self, msg: String) {
        log::debug!("{msg}");
    }

    fn finish(&self, msg: String) {
        log::info!("{msg} ({} reports)", self.done());
    }

    fn finish_and_clear(&self) {}
}
