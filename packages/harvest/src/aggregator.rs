//! Fan-in of fetch outcomes.
//!
//! Receives from both dispatch channels in arrival order until every
//! project has one quality and one build outcome, then sorts the failures
//! according to the configured [`FailurePolicy`]. The whole receive loop
//! runs against a single deadline; when it passes, the outstanding fetch
//! tasks are aborted and nothing is written.

use std::collections::BTreeSet;
use std::time::Duration;

use health_harvest_collector::Dispatch;
use health_harvest_models::{
    FailurePolicy, FetchFailure, ProjectSource, RawBuildReport, RawQualityReport, ReportOutcome,
    Service,
};

/// Errors that end a run during fan-in.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error(
        "Run deadline of {timeout:?} exceeded: received {quality}/{expected} quality and {builds}/{expected} build reports"
    )]
    Timeout {
        timeout: Duration,
        quality: usize,
        builds: usize,
        expected: usize,
    },

    #[error("{service} channel closed after {received} of {expected} reports")]
    ChannelClosed {
        service: Service,
        received: usize,
        expected: usize,
    },

    #[error("{service} report for unknown project '{project_key}'")]
    UnknownProject {
        service: Service,
        project_key: String,
    },

    #[error("Duplicate {service} report for project '{project_key}'")]
    DuplicateReport {
        service: Service,
        project_key: String,
    },

    /// A fetch failed under [`FailurePolicy::Abort`].
    #[error("[{project_key}] {failure}")]
    FetchFailed {
        project_key: String,
        failure: FetchFailure,
    },
}

/// A fetch failure kept for flagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFailure {
    pub project_key: String,
    pub failure: FetchFailure,
}

/// Everything received for one run.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    /// Successful quality reports, in arrival order.
    pub projects: Vec<RawQualityReport>,
    /// Successful build reports, in arrival order.
    pub jobs: Vec<RawBuildReport>,
    /// Failures to flag. Empty unless the policy is [`FailurePolicy::Flag`].
    pub failures: Vec<CollectionFailure>,
    /// Number of failure outcomes received, whatever the policy.
    pub failed_fetches: usize,
}

/// Per-channel bookkeeping for the receive loop.
struct Intake<'a, T> {
    service: Service,
    known: &'a BTreeSet<&'a str>,
    seen: BTreeSet<String>,
    reports: Vec<T>,
    failures: Vec<CollectionFailure>,
}

impl<'a, T> Intake<'a, T> {
    fn new(service: Service, known: &'a BTreeSet<&'a str>, expected: usize) -> Self {
        Self {
            service,
            known,
            seen: BTreeSet::new(),
            reports: Vec::with_capacity(expected),
            failures: Vec::new(),
        }
    }

    fn received(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    fn accept(
        &mut self,
        outcome: ReportOutcome<T>,
        policy: FailurePolicy,
    ) -> Result<(), AggregateError> {
        let ReportOutcome {
            project_key,
            result,
        } = outcome;

        if !self.known.contains(project_key.as_str()) {
            return Err(AggregateError::UnknownProject {
                service: self.service,
                project_key,
            });
        }
        if !self.seen.insert(project_key.clone()) {
            return Err(AggregateError::DuplicateReport {
                service: self.service,
                project_key,
            });
        }

        match result {
            Ok(report) => self.reports.push(report),
            Err(failure) => {
                if policy == FailurePolicy::Abort {
                    return Err(AggregateError::FetchFailed {
                        project_key,
                        failure,
                    });
                }
                self.failures.push(CollectionFailure {
                    project_key,
                    failure,
                });
            }
        }

        Ok(())
    }
}

/// Collects exactly one quality and one build outcome per project.
///
/// # Errors
///
/// * [`AggregateError::Timeout`] if `run_timeout` passes first. Outstanding
///   fetches are aborted.
/// * [`AggregateError::ChannelClosed`] if a channel closes early.
/// * [`AggregateError::UnknownProject`] or
///   [`AggregateError::DuplicateReport`] if an outcome does not line up with
///   `sources`.
/// * [`AggregateError::FetchFailed`] on the first failure when `policy` is
///   [`FailurePolicy::Abort`].
pub async fn aggregate(
    dispatch: Dispatch,
    sources: &[ProjectSource],
    policy: FailurePolicy,
    run_timeout: Duration,
) -> Result<Aggregate, AggregateError> {
    let Dispatch {
        quality: mut quality_rx,
        builds: mut build_rx,
        mut tasks,
        expected,
    } = dispatch;

    let known: BTreeSet<&str> = sources.iter().map(|s| s.key.as_str()).collect();
    let mut quality = Intake::new(Service::Quality, &known, expected);
    let mut builds = Intake::new(Service::Build, &known, expected);

    // Saturates on very large durations.
    let received = tokio::time::timeout(run_timeout, async {
        while quality.received() < expected || builds.received() < expected {
            tokio::select! {
                outcome = quality_rx.recv(), if quality.received() < expected => {
                    let Some(outcome) = outcome else {
                        return Err(AggregateError::ChannelClosed {
                            service: Service::Quality,
                            received: quality.received(),
                            expected,
                        });
                    };
                    quality.accept(outcome, policy)?;
                }
                outcome = build_rx.recv(), if builds.received() < expected => {
                    let Some(outcome) = outcome else {
                        return Err(AggregateError::ChannelClosed {
                            service: Service::Build,
                            received: builds.received(),
                            expected,
                        });
                    };
                    builds.accept(outcome, policy)?;
                }
            }
        }
        Ok::<(), AggregateError>(())
    })
    .await;

    match received {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tasks.abort_all();
            return Err(e);
        }
        Err(_) => {
            tasks.abort_all();
            return Err(AggregateError::Timeout {
                timeout: run_timeout,
                quality: quality.received(),
                builds: builds.received(),
                expected,
            });
        }
    }

    let failed_fetches = quality.failures.len() + builds.failures.len();
    let mut failures = quality.failures;
    failures.extend(builds.failures);

    if policy == FailurePolicy::Skip {
        if failed_fetches > 0 {
            log::warn!("Skipping {failed_fetches} failed fetch(es)");
        }
        failures.clear();
    }

    log::debug!(
        "Fan-in complete: {} quality report(s), {} build report(s), {failed_fetches} failure(s)",
        quality.reports.len(),
        builds.reports.len()
    );

    Ok(Aggregate {
        projects: quality.reports,
        jobs: builds.reports,
        failures,
        failed_fetches,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use health_harvest_collector::progress::null_progress;
    use health_harvest_collector::{FetchError, ReportFetcher, dispatch};
    use health_harvest_models::Measure;
    use tokio::sync::mpsc;
    use tokio::task::JoinSet;

    use super::*;

    enum Mode {
        Ok,
        FailBuild(&'static str),
        Hang(&'static str),
    }

    struct ScriptedFetcher {
        mode: Mode,
    }

    #[async_trait]
    impl ReportFetcher for ScriptedFetcher {
        async fn fetch_quality(
            &self,
            source: &ProjectSource,
        ) -> Result<RawQualityReport, FetchError> {
            Ok(RawQualityReport {
                component_key: source.quality_query_key.clone(),
                component_name: source.key.clone(),
                component_type: source.component_type.clone(),
                measures: vec![Measure::new("coverage", "70.0")],
            })
        }

        async fn fetch_build(&self, source: &ProjectSource) -> Result<RawBuildReport, FetchError> {
            match self.mode {
                Mode::FailBuild(key) if key == source.key => Err(FetchError::Status {
                    url: source.build_endpoint.clone(),
                    status: 404,
                    body: "Not Found".to_string(),
                }),
                Mode::Hang(key) if key == source.key => std::future::pending().await,
                _ => Ok(RawBuildReport {
                    project_key: source.key.clone(),
                    result: "SUCCESS".to_string(),
                    timestamp_millis: 0,
                    url: format!("{}/7/", source.build_endpoint),
                }),
            }
        }
    }

    fn sources(keys: &[&str]) -> Vec<ProjectSource> {
        keys.iter()
            .map(|k| ProjectSource {
                key: (*k).to_string(),
                component_type: "backend".to_string(),
                quality_query_key: (*k).to_string(),
                build_endpoint: format!("http://ci/job/{k}"),
            })
            .collect()
    }

    async fn run(
        mode: Mode,
        keys: &[&str],
        policy: FailurePolicy,
        timeout: Duration,
    ) -> Result<Aggregate, AggregateError> {
        let fetcher: Arc<dyn ReportFetcher> = Arc::new(ScriptedFetcher { mode });
        let projects = sources(keys);
        let d = dispatch(&fetcher, &projects, 4, &null_progress());
        aggregate(d, &projects, policy, timeout).await
    }

    #[tokio::test]
    async fn collects_one_report_of_each_kind_per_project() {
        let agg = run(
            Mode::Ok,
            &["a", "b", "c"],
            FailurePolicy::Flag,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(agg.projects.len(), 3);
        assert_eq!(agg.jobs.len(), 3);
        assert!(agg.failures.is_empty());
        assert_eq!(agg.failed_fetches, 0);
    }

    #[tokio::test]
    async fn flag_keeps_failure_and_other_projects() {
        let agg = run(
            Mode::FailBuild("b"),
            &["a", "b", "c"],
            FailurePolicy::Flag,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(agg.projects.len(), 3);
        assert_eq!(agg.jobs.len(), 2);
        assert!(agg.jobs.iter().all(|j| j.project_key != "b"));
        assert_eq!(agg.failed_fetches, 1);
        assert_eq!(agg.failures.len(), 1);
        assert_eq!(agg.failures[0].project_key, "b");
        assert_eq!(agg.failures[0].failure.service, Service::Build);
    }

    #[tokio::test]
    async fn skip_drops_failure() {
        let agg = run(
            Mode::FailBuild("b"),
            &["a", "b"],
            FailurePolicy::Skip,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(agg.jobs.len(), 1);
        assert!(agg.failures.is_empty());
        assert_eq!(agg.failed_fetches, 1);
    }

    #[tokio::test]
    async fn abort_fails_on_first_failure() {
        let err = run(
            Mode::FailBuild("b"),
            &["a", "b"],
            FailurePolicy::Abort,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        match err {
            AggregateError::FetchFailed {
                project_key,
                failure,
            } => {
                assert_eq!(project_key, "b");
                assert_eq!(failure.service, Service::Build);
                assert!(failure.reason.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn deadline_aborts_hanging_fetches() {
        let err = run(
            Mode::Hang("b"),
            &["a", "b"],
            FailurePolicy::Flag,
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

        match err {
            AggregateError::Timeout {
                quality,
                builds,
                expected,
                ..
            } => {
                assert_eq!(expected, 2);
                assert_eq!(quality, 2);
                assert_eq!(builds, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn huge_deadline_does_not_overflow() {
        let agg = run(
            Mode::Ok,
            &["a", "b"],
            FailurePolicy::Flag,
            Duration::from_secs(u64::MAX),
        )
        .await
        .unwrap();

        assert_eq!(agg.projects.len(), 2);
        assert_eq!(agg.jobs.len(), 2);
    }

    #[tokio::test]
    async fn no_projects_is_an_empty_aggregate() {
        let agg = run(Mode::Ok, &[], FailurePolicy::Flag, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(agg.projects.is_empty());
        assert!(agg.jobs.is_empty());
    }

    fn manual_dispatch(
        expected: usize,
    ) -> (
        Dispatch,
        mpsc::Sender<health_harvest_models::QualityOutcome>,
        mpsc::Sender<health_harvest_models::BuildOutcome>,
    ) {
        let (quality_tx, quality) = mpsc::channel(8);
        let (build_tx, builds) = mpsc::channel(8);
        let d = Dispatch {
            quality,
            builds,
            tasks: JoinSet::new(),
            expected,
        };
        (d, quality_tx, build_tx)
    }

    fn quality_report(key: &str) -> RawQualityReport {
        RawQualityReport {
            component_key: key.to_string(),
            component_name: key.to_string(),
            component_type: String::new(),
            measures: Vec::new(),
        }
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (d, quality_tx, build_tx) = manual_dispatch(1);
        quality_tx
            .send(ReportOutcome::success("a", quality_report("a")))
            .await
            .unwrap();
        drop(quality_tx);
        drop(build_tx);

        let err = aggregate(d, &sources(&["a"]), FailurePolicy::Flag, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AggregateError::ChannelClosed {
                service: Service::Build,
                received: 0,
                expected: 1,
            }
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_and_duplicate_keys() {
        let (d, quality_tx, _build_tx) = manual_dispatch(2);
        quality_tx
            .send(ReportOutcome::success("zzz", quality_report("zzz")))
            .await
            .unwrap();
        let err = aggregate(d, &sources(&["a", "b"]), FailurePolicy::Flag, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::UnknownProject { .. }));

        let (d, quality_tx, _build_tx) = manual_dispatch(2);
        for _ in 0..2 {
            quality_tx
                .send(ReportOutcome::success("a", quality_report("a")))
                .await
                .unwrap();
        }
        let err = aggregate(d, &sources(&["a", "b"]), FailurePolicy::Flag, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::DuplicateReport {
                service: Service::Quality,
                ..
            }
        ));
    }
}
