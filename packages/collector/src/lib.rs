#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report collection for the health harvester.
//!
//! A [`ReportFetcher`] knows how to fetch one quality report and one build
//! report for a project. [`dispatch::dispatch`] fans those fetches out as
//! one task per request, gated by a semaphore, and streams every result
//! back as an explicit success-or-failure outcome.

pub mod build;
pub mod dispatch;
pub mod http;
pub mod progress;
pub mod quality;

use async_trait::async_trait;
use health_harvest_models::{ProjectSource, RawBuildReport, RawQualityReport};

pub use dispatch::{Dispatch, dispatch};
pub use http::HttpFetcher;

/// Errors that can occur while fetching a report.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network failure, TLS failure, or request timeout.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// The body was not the JSON shape we expected.
    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fetches the two reports that make up one project's health snapshot.
#[async_trait]
pub trait ReportFetcher: Send + Sync {
    /// Fetches the project's measures from the code-quality service.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails or the body cannot be
    /// decoded.
    async fn fetch_quality(&self, source: &ProjectSource) -> Result<RawQualityReport, FetchError>;

    /// Fetches the project's last build from the CI service.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails or the body cannot be
    /// decoded.
    async fn fetch_build(&self, source: &ProjectSource) -> Result<RawBuildReport, FetchError>;
}
