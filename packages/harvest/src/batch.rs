//! Batch assembly.

use chrono::{DateTime, Utc};
use health_harvest_models::{
    BatchWriteRequest, COMPONENT_TYPE_TAG, NormalizedSample, RawBuildReport, RawQualityReport,
    SERVICE_TAG, SampleValue,
};

use crate::aggregator::{Aggregate, CollectionFailure};
use crate::normalize::{BUILD_STATUS_METRIC, hours_between, to_numeric};

/// Normalized result of the last build.
pub const BUILD_STATUS_MEASUREMENT: &str = "jenkins_status";

/// Link to the last build page.
pub const BUILD_URL_MEASUREMENT: &str = "jenkins_url";

/// Hours since the last build started.
pub const BUILD_AGE_MEASUREMENT: &str = "jenkins_since";

/// Marker written for each flagged fetch failure.
pub const COLLECTION_FAILED_MEASUREMENT: &str = "collection_failed";

/// One sample per measure, tagged with the component key and type.
#[must_use]
pub fn quality_samples(report: &RawQualityReport, at: DateTime<Utc>) -> Vec<NormalizedSample> {
    report
        .measures
        .iter()
        .map(|m| {
            NormalizedSample::new(
                &m.metric,
                &report.component_key,
                SampleValue::Numeric(to_numeric(&m.metric, &m.value)),
                at,
            )
            .with_tag(COMPONENT_TYPE_TAG, &report.component_type)
        })
        .collect()
}

/// Status, URL and age samples for one build.
#[must_use]
pub fn build_samples(report: &RawBuildReport, at: DateTime<Utc>) -> Vec<NormalizedSample> {
    let key = &report.project_key;
    vec![
        NormalizedSample::new(
            BUILD_STATUS_MEASUREMENT,
            key,
            SampleValue::Numeric(to_numeric(BUILD_STATUS_METRIC, &report.result)),
            at,
        ),
        NormalizedSample::new(
            BUILD_URL_MEASUREMENT,
            key,
            SampleValue::Text(report.url.clone()),
            at,
        ),
        NormalizedSample::new(
            BUILD_AGE_MEASUREMENT,
            key,
            SampleValue::Numeric(hours_between(report.timestamp_millis, at)),
            at,
        ),
    ]
}

#[must_use]
pub fn failure_sample(failure: &CollectionFailure, at: DateTime<Utc>) -> NormalizedSample {
    NormalizedSample::new(
        COLLECTION_FAILED_MEASUREMENT,
        &failure.project_key,
        SampleValue::Numeric(1.0),
        at,
    )
    .with_tag(SERVICE_TAG, failure.failure.service.to_string())
}

/// Builds the single write request for a run.
///
/// Every sample shares the timestamp `now`, which is also the reference
/// point for build age. Quality samples come first, then builds, then
/// flagged failures.
#[must_use]
pub fn assemble(database: &str, aggregate: &Aggregate, now: DateTime<Utc>) -> BatchWriteRequest {
    let mut samples = Vec::with_capacity(
        aggregate
            .projects
            .iter()
            .map(|p| p.measures.len())
            .sum::<usize>()
            + aggregate.jobs.len() * 3
            + aggregate.failures.len(),
    );

    for report in &aggregate.projects {
        samples.extend(quality_samples(report, now));
    }
    for report in &aggregate.jobs {
        samples.extend(build_samples(report, now));
    }
    for failure in &aggregate.failures {
        samples.push(failure_sample(failure, now));
    }

    BatchWriteRequest::new(database, samples)
}
