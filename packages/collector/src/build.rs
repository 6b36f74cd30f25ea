//! Build service (Jenkins JSON API).
//!
//! `GET {job}/lastBuild/api/json?tree=result,timestamp,url` answers with
//! `{"result": "SUCCESS", "timestamp": 1700000000000, "url": "..."}`.
//! `result` is `null` while the build is still running.

use health_harvest_models::RawBuildReport;
use serde::Deserialize;

use crate::FetchError;

/// Fields requested through the `tree` query parameter.
pub const TREE: &str = "result,timestamp,url";

#[derive(Debug, Deserialize)]
struct LastBuildResponse {
    result: Option<String>,
    timestamp: i64,
    #[serde(default)]
    url: String,
}

/// Returns the last-build endpoint for a job URL.
#[must_use]
pub fn last_build_url(job_url: &str) -> String {
    format!("{}/lastBuild/api/json", job_url.trim_end_matches('/'))
}

/// Decodes a last-build response and tags it with `project_key`.
///
/// # Errors
///
/// Returns [`FetchError::Decode`] if the body is not JSON or has no
/// `timestamp`.
pub fn parse_response(body: &str, project_key: &str) -> Result<RawBuildReport, FetchError> {
    let response: LastBuildResponse = serde_json::from_str(body)?;

    Ok(RawBuildReport {
        project_key: project_key.to_string(),
        result: response.result.unwrap_or_default(),
        timestamp_millis: response.timestamp,
        url: response.url,
    })
}
