//! `reqwest`-backed [`ReportFetcher`].
//!
//! Requests are sent once. There is no retry layer here: a failure becomes
//! a failure outcome and the aggregator decides what happens to it.

use async_trait::async_trait;
use health_harvest_config::HarvestConfig;
use health_harvest_models::{ProjectSource, RawBuildReport, RawQualityReport};

use crate::{FetchError, ReportFetcher, build, quality};

/// Maximum length of the response body kept in a [`FetchError::Status`].
const BODY_PREVIEW_LEN: usize = 200;

/// User agent sent to both services.
const USER_AGENT: &str = concat!("health-harvest/", env!("CARGO_PKG_VERSION"));

/// Fetches reports over HTTP using the run's configuration.
pub struct HttpFetcher {
    client: reqwest::Client,
    quality_base_url: String,
    metric_keys: String,
    quality_auth: String,
    build_auth: String,
}

impl HttpFetcher {
    /// Builds a fetcher whose client enforces the configured per-request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &HarvestConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            quality_base_url: config.quality.base_url.clone(),
            metric_keys: config.quality.metric_keys_csv(),
            quality_auth: config.quality.auth.header_value().to_string(),
            build_auth: config.build.auth.header_value().to_string(),
        })
    }
}

#[async_trait]
impl ReportFetcher for HttpFetcher {
    async fn fetch_quality(&self, source: &ProjectSource) -> Result<RawQualityReport, FetchError> {
        let request = self
            .client
            .get(quality::measures_url(&self.quality_base_url))
            .query(&[
                ("component", source.quality_query_key.as_str()),
                ("metricKeys", self.metric_keys.as_str()),
            ])
            .header(reqwest::header::AUTHORIZATION, &self.quality_auth);

        let body = send_checked(request).await?;
        quality::parse_response(&body, &source.component_type)
    }

    async fn fetch_build(&self, source: &ProjectSource) -> Result<RawBuildReport, FetchError> {
        let request = self
            .client
            .get(build::last_build_url(&source.build_endpoint))
            .query(&[("tree", build::TREE)])
            .header(reqwest::header::AUTHORIZATION, &self.build_auth);

        let body = send_checked(request).await?;
        build::parse_response(&body, &source.key)
    }
}

/// Sends `request` and returns the body of a 2xx response.
async fn send_checked(request: reqwest::RequestBuilder) -> Result<String, FetchError> {
    let response = request.send().await?;
    let url = response.url().to_string();
    let status = response.status();
    let text = response.text().await?;

    log::debug!("GET {url} -> {status} ({} bytes)", text.len());

    if !status.is_success() {
        return Err(FetchError::Status {
            url,
            status: status.as_u16(),
            body: preview(&text),
        });
    }

    Ok(text)
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > BODY_PREVIEW_LEN {
        let head: String = trimmed.chars().take(BODY_PREVIEW_LEN).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}
