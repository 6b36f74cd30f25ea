#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Project health harvester.
//!
//! One run fans out a quality fetch and a build fetch for every configured
//! project, waits for all of them (bounded by the run deadline), normalizes
//! what came back and commits it to the time-series store as a single
//! batch.
//!
//! ```text
//! projects ──► dispatch (2N fetches) ──► aggregate ──► assemble ──► write_batch
//! ```

pub mod aggregator;
pub mod batch;
pub mod normalize;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use health_harvest_collector::progress::ProgressCallback;
use health_harvest_collector::{ReportFetcher, dispatch};
use health_harvest_config::HarvestConfig;
use health_harvest_models::HarvestSummary;
use health_harvest_store::{StoreError, TimeSeriesStore};

pub use aggregator::{Aggregate, AggregateError, CollectionFailure};

/// Errors that can fail a harvest run.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("Batch write failed: {0}")]
    Store(#[from] StoreError),
}

/// Runs one harvest: collect, normalize, write.
///
/// Nothing is written unless fan-in completes. Exactly one
/// [`TimeSeriesStore::write_batch`] call is made on success, including
/// when there is nothing to write.
///
/// # Errors
///
/// * [`HarvestError::Aggregate`] if fan-in times out, loses a channel or
///   hits a failure under the `abort` policy.
/// * [`HarvestError::Store`] if the batch write fails.
pub async fn run_harvest(
    config: &HarvestConfig,
    fetcher: Arc<dyn ReportFetcher>,
    store: &dyn TimeSeriesStore,
    progress: Arc<dyn ProgressCallback>,
) -> Result<HarvestSummary, HarvestError> {
    let start = Instant::now();
    let projects = &config.projects;

    if projects.is_empty() {
        log::warn!("No projects configured; writing an empty batch");
    }

    let pending = dispatch(&fetcher, projects, config.concurrency, &progress);
    let aggregate = match aggregator::aggregate(
        pending,
        projects,
        config.failure_policy,
        config.run_timeout,
    )
    .await
    {
        Ok(aggregate) => {
            progress.finish(format!(
                "Collected {} quality and {} build report(s)",
                aggregate.projects.len(),
                aggregate.jobs.len()
            ));
            aggregate
        }
        Err(e) => {
            progress.finish_and_clear();
            return Err(e.into());
        }
    };

    let request = batch::assemble(&config.store.database, &aggregate, Utc::now());
    log::debug!(
        "Assembled {} sample(s) for database '{}'",
        request.len(),
        request.database
    );

    let samples = store.write_batch(request).await?;

    let summary = HarvestSummary {
        projects: projects.len(),
        samples,
        failed_fetches: aggregate.failed_fetches,
        duration: start.elapsed(),
    };

    log::info!(
        "Harvested {} project(s): {} sample(s) written, {} failed fetch(es) in {:.2}s",
        summary.projects,
        summary.samples,
        summary.failed_fetches,
        summary.duration.as_secs_f64()
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use health_harvest_collector::FetchError;
    use health_harvest_collector::progress::null_progress;
    use health_harvest_models::{
        BatchWriteRequest, FailurePolicy, Measure, ProjectSource, RawBuildReport,
        RawQualityReport,
    };

    use super::*;
    use crate::batch::COLLECTION_FAILED_MEASUREMENT;

    const CONFIG: &str = r#"
        run_timeout_secs = 5

        [quality]
        base_url = "https://sonar.example.com"
        token = "abc123"
        metric_keys = ["alert_status", "coverage"]

        [build]
        user = "ci-bot"
        token = "s3cret"

        [store]
        url = "http://localhost:8086"
        database = "project_health"
    "#;

    struct FakeFetcher {
        failing_quality: BTreeSet<String>,
        hanging_builds: BTreeSet<String>,
    }

    impl FakeFetcher {
        fn healthy() -> Self {
            Self {
                failing_quality: BTreeSet::new(),
                hanging_builds: BTreeSet::new(),
            }
        }
    }

    #[async_trait]
    impl ReportFetcher for FakeFetcher {
        async fn fetch_quality(
            &self,
            source: &ProjectSource,
        ) -> Result<RawQualityReport, FetchError> {
            if self.failing_quality.contains(&source.key) {
                return Err(FetchError::Status {
                    url: "https://sonar.example.com/api/measures/component".to_string(),
                    status: 500,
                    body: String::new(),
                });
            }
            Ok(RawQualityReport {
                component_key: source.quality_query_key.clone(),
                component_name: source.key.clone(),
                component_type: source.component_type.clone(),
                measures: vec![
                    Measure::new("alert_status", "OK"),
                    Measure::new("coverage", "81.3"),
                ],
            })
        }

        async fn fetch_build(&self, source: &ProjectSource) -> Result<RawBuildReport, FetchError> {
            if self.hanging_builds.contains(&source.key) {
                return std::future::pending().await;
            }
            Ok(RawBuildReport {
                project_key: source.key.clone(),
                result: "SUCCESS".to_string(),
                timestamp_millis: Utc::now().timestamp_millis(),
                url: format!("{}/1/", source.build_endpoint),
            })
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        writes: Mutex<Vec<BatchWriteRequest>>,
    }

    impl RecordingStore {
        fn writes(&self) -> Vec<BatchWriteRequest> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TimeSeriesStore for RecordingStore {
        async fn write_batch(&self, request: BatchWriteRequest) -> Result<usize, StoreError> {
            let n = request.len();
            self.writes.lock().unwrap().push(request);
            Ok(n)
        }
    }

    struct RejectingStore;

    #[async_trait]
    impl TimeSeriesStore for RejectingStore {
        async fn write_batch(&self, _request: BatchWriteRequest) -> Result<usize, StoreError> {
            Err(StoreError::Rejected {
                status: 400,
                body: "partial write: field type conflict".to_string(),
            })
        }
    }

    fn config(n: usize, policy: FailurePolicy) -> HarvestConfig {
        let mut config = HarvestConfig::from_toml_str(CONFIG).unwrap();
        config.failure_policy = policy;
        config.with_projects(
            (0..n)
                .map(|i| ProjectSource {
                    key: format!("project-{i}"),
                    component_type: "backend".to_string(),
                    quality_query_key: format!("project-{i}"),
                    build_endpoint: format!("http://ci/job/project-{i}"),
                })
                .collect(),
        )
    }

    async fn harvest(
        config: &HarvestConfig,
        fetcher: FakeFetcher,
        store: &dyn TimeSeriesStore,
    ) -> Result<HarvestSummary, HarvestError> {
        run_harvest(config, Arc::new(fetcher), store, null_progress()).await
    }

    #[tokio::test]
    async fn one_write_regardless_of_project_count() {
        for n in [0, 1, 25] {
            let store = RecordingStore::default();
            let summary = harvest(
                &config(n, FailurePolicy::Flag),
                FakeFetcher::healthy(),
                &store,
            )
            .await
            .unwrap();

            let writes = store.writes();
            assert_eq!(writes.len(), 1, "{n} project(s)");
            assert_eq!(writes[0].len(), n * 5);
            assert_eq!(writes[0].database, "project_health");
            assert_eq!(summary.projects, n);
            assert_eq!(summary.samples, n * 5);
            assert_eq!(summary.failed_fetches, 0);
        }
    }

    #[tokio::test]
    async fn flag_policy_writes_marker_and_keeps_other_projects() {
        let store = RecordingStore::default();
        let fetcher = FakeFetcher {
            failing_quality: BTreeSet::from(["project-1".to_string()]),
            hanging_builds: BTreeSet::new(),
        };
        let summary = harvest(&config(3, FailurePolicy::Flag), fetcher, &store)
            .await
            .unwrap();

        let writes = store.writes();
        let samples = &writes[0].samples;
        // 2 healthy quality reports, 3 builds, 1 marker.
        assert_eq!(samples.len(), 2 * 2 + 3 * 3 + 1);
        assert_eq!(summary.failed_fetches, 1);

        let markers: Vec<_> = samples
            .iter()
            .filter(|s| s.measurement == COLLECTION_FAILED_MEASUREMENT)
            .collect();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].project_key(), Some("project-1"));
    }

    #[tokio::test]
    async fn skip_policy_writes_no_marker() {
        let store = RecordingStore::default();
        let fetcher = FakeFetcher {
            failing_quality: BTreeSet::from(["project-0".to_string()]),
            hanging_builds: BTreeSet::new(),
        };
        let summary = harvest(&config(2, FailurePolicy::Skip), fetcher, &store)
            .await
            .unwrap();

        let writes = store.writes();
        assert_eq!(writes[0].len(), 2 + 2 * 3);
        assert_eq!(summary.failed_fetches, 1);
        assert!(
            writes[0]
                .samples
                .iter()
                .all(|s| s.measurement != COLLECTION_FAILED_MEASUREMENT)
        );
    }

    #[tokio::test]
    async fn abort_policy_writes_nothing() {
        let store = RecordingStore::default();
        let fetcher = FakeFetcher {
            failing_quality: BTreeSet::from(["project-2".to_string()]),
            hanging_builds: BTreeSet::new(),
        };
        let err = harvest(&config(4, FailurePolicy::Abort), fetcher, &store)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HarvestError::Aggregate(AggregateError::FetchFailed { .. })
        ));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn run_deadline_writes_nothing() {
        let store = RecordingStore::default();
        let fetcher = FakeFetcher {
            failing_quality: BTreeSet::new(),
            hanging_builds: BTreeSet::from(["project-0".to_string()]),
        };
        let mut config = config(2, FailurePolicy::Flag);
        config.run_timeout = Duration::from_millis(100);

        let err = harvest(&config, fetcher, &store).await.unwrap_err();

        assert!(matches!(
            err,
            HarvestError::Aggregate(AggregateError::Timeout { builds: 1, .. })
        ));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn unbounded_run_timeout_from_config_completes() {
        let text = CONFIG.replace("run_timeout_secs = 5", "run_timeout_secs = 9223372036854775807");
        let config = HarvestConfig::from_toml_str(&text).unwrap().with_projects(
            config(2, FailurePolicy::Flag).projects,
        );
        let store = RecordingStore::default();

        let summary = harvest(&config, FakeFetcher::healthy(), &store)
            .await
            .unwrap();

        assert_eq!(summary.samples, 10);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn store_rejection_fails_the_run() {
        let err = harvest(
            &config(1, FailurePolicy::Flag),
            FakeFetcher::healthy(),
            &RejectingStore,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            HarvestError::Store(StoreError::Rejected { status: 400, .. })
        ));
    }
}
