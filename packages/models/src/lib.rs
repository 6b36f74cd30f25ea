#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model for the health harvester.
//!
//! A run starts from a list of [`ProjectSource`]s, collects one
//! [`RawQualityReport`] and one [`RawBuildReport`] per project (each wrapped
//! in a [`ReportOutcome`] so failed fetches stay distinguishable from real
//! values), and ends with a single [`BatchWriteRequest`] of
//! [`NormalizedSample`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Tag key carried by every sample.
pub const PROJECT_KEY_TAG: &str = "project_key";

/// Tag key carried by quality samples.
pub const COMPONENT_TYPE_TAG: &str = "component_type";

/// Tag key carried by `collection_failed` samples.
pub const SERVICE_TAG: &str = "service";

/// A tracked project, resolved from configuration and immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSource {
    /// Project identifier, used as the `project_key` tag on build samples.
    pub key: String,
    /// Free-form component label (e.g. `"backend"`, `"library"`).
    pub component_type: String,
    /// Component key sent to the quality service.
    pub quality_query_key: String,
    /// Base URL of the project's CI job.
    pub build_endpoint: String,
}

/// One `(metric, value)` pair from the quality service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    /// Metric name (e.g. `"coverage"`, `"alert_status"`).
    pub metric: String,
    /// Raw value as returned by the service. Numbers arrive as strings.
    #[serde(default)]
    pub value: String,
}

impl Measure {
    #[must_use]
    pub fn new(metric: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value: value.into(),
        }
    }
}

/// Per-project snapshot from the code-quality service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQualityReport {
    /// Component key echoed back by the service.
    pub component_key: String,
    /// Human-readable component name.
    pub component_name: String,
    /// Component type copied from the [`ProjectSource`], not the service.
    pub component_type: String,
    /// Measures in the order the service returned them.
    pub measures: Vec<Measure>,
}

/// Last-build outcome from the CI service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBuildReport {
    /// Key of the [`ProjectSource`] this build belongs to.
    pub project_key: String,
    /// Build result (`SUCCESS`, `UNSTABLE`, ...). Empty while a build is
    /// still running.
    pub result: String,
    /// Build start time in epoch milliseconds.
    pub timestamp_millis: i64,
    /// Link to the build page.
    pub url: String,
}

/// Which external service a report came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Service {
    /// Code-quality metrics service.
    Quality,
    /// Build/CI status service.
    Build,
}

/// Why a single fetch produced no report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    /// Service the failed request was sent to.
    pub service: Service,
    /// Rendered error message.
    pub reason: String,
}

impl FetchFailure {
    #[must_use]
    pub fn new(service: Service, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fetch failed: {}", self.service, self.reason)
    }
}

/// Result of one fetch task, keyed by the project it was dispatched for.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOutcome<T> {
    /// Key of the [`ProjectSource`] the request was made for.
    pub project_key: String,
    /// The decoded report, or why there is none.
    pub result: Result<T, FetchFailure>,
}

impl<T> ReportOutcome<T> {
    #[must_use]
    pub fn success(project_key: impl Into<String>, report: T) -> Self {
        Self {
            project_key: project_key.into(),
            result: Ok(report),
        }
    }

    #[must_use]
    pub fn failure(project_key: impl Into<String>, failure: FetchFailure) -> Self {
        Self {
            project_key: project_key.into(),
            result: Err(failure),
        }
    }
}

/// Outcome of a quality-service fetch.
pub type QualityOutcome = ReportOutcome<RawQualityReport>;

/// Outcome of a build-service fetch.
pub type BuildOutcome = ReportOutcome<RawBuildReport>;

/// What to do with a project whose fetch failed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the failed report and keep going.
    Skip,
    /// Drop the failed report and write a `collection_failed` sample in its
    /// place.
    #[default]
    Flag,
    /// Fail the whole run before anything is written.
    Abort,
}

/// Payload of a sample. Almost always numeric; the build URL is text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SampleValue {
    Numeric(f64),
    Text(String),
}

impl SampleValue {
    /// Returns the numeric payload, or `None` for text samples.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    /// Returns the text payload, or `None` for numeric samples.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Numeric(_) => None,
            Self::Text(value) => Some(value),
        }
    }
}

/// One time-series point ready for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSample {
    /// Measurement (series) name.
    pub measurement: String,
    /// Tag set. Always contains [`PROJECT_KEY_TAG`].
    pub tags: BTreeMap<String, String>,
    /// Field value, stored under the `val` field.
    pub value: SampleValue,
    /// Write timestamp shared by every sample of a run.
    pub timestamp: DateTime<Utc>,
}

impl NormalizedSample {
    /// Creates a sample tagged with `project_key` only.
    #[must_use]
    pub fn new(
        measurement: impl Into<String>,
        project_key: impl Into<String>,
        value: SampleValue,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(PROJECT_KEY_TAG.to_string(), project_key.into());

        Self {
            measurement: measurement.into(),
            tags,
            value,
            timestamp,
        }
    }

    /// Adds (or replaces) a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Returns the `project_key` tag.
    #[must_use]
    pub fn project_key(&self) -> Option<&str> {
        self.tags.get(PROJECT_KEY_TAG).map(String::as_str)
    }
}

/// Timestamp precision understood by the store.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Precision {
    #[default]
    #[strum(serialize = "n")]
    #[serde(rename = "n")]
    Nanoseconds,
    #[strum(serialize = "u")]
    #[serde(rename = "u")]
    Microseconds,
    #[strum(serialize = "ms")]
    #[serde(rename = "ms")]
    Milliseconds,
    #[strum(serialize = "s")]
    #[serde(rename = "s")]
    Seconds,
}

impl Precision {
    /// Converts a timestamp to an integer in this precision.
    ///
    /// Nanosecond timestamps outside the range representable by `i64`
    /// (roughly years 1677..2262) saturate.
    #[must_use]
    pub fn timestamp(self, at: &DateTime<Utc>) -> i64 {
        match self {
            Self::Nanoseconds => at.timestamp_nanos_opt().unwrap_or_else(|| {
                if at.timestamp() < 0 {
                    i64::MIN
                } else {
                    i64::MAX
                }
            }),
            Self::Microseconds => at.timestamp_micros(),
            Self::Milliseconds => at.timestamp_millis(),
            Self::Seconds => at.timestamp(),
        }
    }
}

/// Everything one run writes, committed in a single call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteRequest {
    /// Target database name.
    pub database: String,
    /// Timestamp precision for the write.
    pub precision: Precision,
    /// Samples in assembly order.
    pub samples: Vec<NormalizedSample>,
}

impl BatchWriteRequest {
    #[must_use]
    pub fn new(database: impl Into<String>, samples: Vec<NormalizedSample>) -> Self {
        Self {
            database: database.into(),
            precision: Precision::default(),
            samples,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Result of a completed harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestSummary {
    /// Number of configured projects.
    pub projects: usize,
    /// Number of samples committed (or rendered, for a dry run).
    pub samples: usize,
    /// Number of fetches that produced a failure outcome.
    pub failed_fetches: usize,
    /// Wall-clock time of the whole run.
    pub duration: Duration,
}
