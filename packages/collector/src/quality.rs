//! Code-quality service (`SonarQube` measures API).
//!
//! `GET {base}/api/measures/component?component={key}&metricKeys={csv}`
//! answers with
//!
//! ```json
//! {"component": {"key": "...", "name": "...", "measures": [{"metric": "coverage", "value": "81.3"}]}}
//! ```
//!
//! Metric values are always strings, including numbers. Measures that only
//! carry period values (the `new_*` metrics) have no `value` at all and
//! decode to an empty string.

use health_harvest_models::{Measure, RawQualityReport};
use serde::Deserialize;

use crate::FetchError;

#[derive(Debug, Deserialize)]
struct MeasuresResponse {
    component: Component,
}

#[derive(Debug, Deserialize)]
struct Component {
    key: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    measures: Vec<Measure>,
}

/// Returns the measures endpoint for a service base URL.
#[must_use]
pub fn measures_url(base_url: &str) -> String {
    format!("{}/api/measures/component", base_url.trim_end_matches('/'))
}

/// Decodes a measures response and tags it with `component_type`.
///
/// # Errors
///
/// Returns [`FetchError::Decode`] if the body is not JSON or lacks the
/// `component.key` field.
pub fn parse_response(body: &str, component_type: &str) -> Result<RawQualityReport, FetchError> {
    let response: MeasuresResponse = serde_json::from_str(body)?;

    Ok(RawQualityReport {
        component_key: response.component.key,
        component_name: response.component.name,
        component_type: component_type.to_string(),
        measures: response.component.measures,
    })
}
