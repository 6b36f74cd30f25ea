#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the harvest binary.
//!
//! [`init_logger`] installs `pretty_env_logger` behind
//! `indicatif-log-bridge`, so log lines printed during collection do not
//! tear the progress bar. [`collection_progress`] picks the progress
//! renderer for the run.

use std::io::IsTerminal as _;
use std::sync::Arc;
use std::time::Duration;

use health_harvest_collector::progress::{LogProgress, ProgressCallback, null_progress};
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// How many finished fetches between log lines when not on a terminal.
const LOG_EVERY: u64 = 10;

/// An `indicatif` bar counting finished fetches.
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    /// Adds a fetch-counting bar to `multi`. The length is set once the
    /// dispatcher knows how many fetches it spawned.
    #[must_use]
    pub fn fetches_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new(0));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {msg} {wide_bar:.cyan/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_message(message.to_string());

        Arc::new(Self { bar })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Chooses the progress renderer for a run.
///
/// `quiet` disables progress entirely. Otherwise a bar is drawn when stderr
/// is a terminal, and periodic log lines are written when it is not (cron,
/// CI, redirected output).
#[must_use]
pub fn collection_progress(multi: &MultiProgress, quiet: bool) -> Arc<dyn ProgressCallback> {
    if quiet {
        null_progress()
    } else if std::io::stderr().is_terminal() {
        IndicatifProgress::fetches_bar(multi, "Collecting reports")
    } else {
        LogProgress::shared(LOG_EVERY)
    }
}

/// Log filter used when `RUST_LOG` is unset or empty.
const DEFAULT_LOG_FILTER: &str = "info";

fn log_filters(env: Option<String>) -> String {
    env.filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// Filters come from `RUST_LOG`. When it is unset, `info` and above are
/// shown so each run reports its summary.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_timed_builder()
        .parse_filters(&log_filters(std::env::var("RUST_LOG").ok()))
        .build();
    let level = logger.filter();

    // A logger may already be installed (tests, embedding).
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
