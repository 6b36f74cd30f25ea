//! InfluxDB line protocol encoding.
//!
//! Each sample becomes one line:
//!
//! ```text
//! coverage,component_type=backend,project_key=billing val=81.3 1700000000000000000
//! jenkins_url,project_key=billing val="http://ci/job/42" 1700000000000000000
//! ```
//!
//! Tags are written in key order (the tag map is a `BTreeMap`), which is
//! also the order the store prefers. Tags with empty values are left out
//! because the store rejects them.

use std::fmt::Write as _;

use health_harvest_models::{BatchWriteRequest, NormalizedSample, Precision, SampleValue};

use crate::StoreError;

/// Field key every sample's value is stored under.
pub const FIELD_KEY: &str = "val";

/// Encodes every sample of a batch, one line each.
///
/// # Errors
///
/// Returns [`StoreError::Encode`] if any sample cannot be represented.
pub fn encode_batch(request: &BatchWriteRequest) -> Result<String, StoreError> {
    let mut out = String::new();
    for sample in &request.samples {
        encode_sample(&mut out, sample, request.precision)?;
        out.push('\n');
    }
    Ok(out)
}

/// Appends one sample (without the trailing newline) to `out`.
///
/// # Errors
///
/// Returns [`StoreError::Encode`] if the measurement name is empty or the
/// value is not a finite number.
pub fn encode_sample(
    out: &mut String,
    sample: &NormalizedSample,
    precision: Precision,
) -> Result<(), StoreError> {
    if sample.measurement.is_empty() {
        return Err(StoreError::encode("sample with an empty measurement name"));
    }

    escape_into(out, &sample.measurement, &[',', ' ']);

    for (key, value) in &sample.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        out.push(',');
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        escape_into(out, value, &[',', '=', ' ']);
    }

    out.push(' ');
    out.push_str(FIELD_KEY);
    out.push('=');

    match &sample.value {
        SampleValue::Numeric(value) => {
            if !value.is_finite() {
                return Err(StoreError::encode(format!(
                    "{} has non-finite value {value}",
                    sample.measurement
                )));
            }
            write!(out, "{value}").ok();
        }
        SampleValue::Text(value) => {
            out.push('"');
            for c in value.chars() {
                if matches!(c, '"' | '\\') {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }

    write!(out, " {}", precision.timestamp(&sample.timestamp)).ok();

    Ok(())
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}
