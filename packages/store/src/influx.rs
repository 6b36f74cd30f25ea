//! InfluxDB 1.x HTTP writer.

use async_trait::async_trait;
use health_harvest_config::StoreConfig;
use health_harvest_models::BatchWriteRequest;

use crate::line_protocol::encode_batch;
use crate::{StoreError, TimeSeriesStore};

/// Writes batches to `{url}/write?db=...&precision=...`.
pub struct InfluxStore {
    client: reqwest::Client,
    write_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxStore {
    /// Creates a store client whose requests time out after
    /// `config.timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            write_url: write_url(&config.url),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

fn write_url(base_url: &str) -> String {
    format!("{}/write", base_url.trim_end_matches('/'))
}

#[async_trait]
impl TimeSeriesStore for InfluxStore {
    async fn write_batch(&self, request: BatchWriteRequest) -> Result<usize, StoreError> {
        let count = request.len();
        let body = encode_batch(&request)?;

        log::info!(
            "Writing {count} sample(s) to database '{}' ({} bytes)",
            request.database,
            body.len()
        );

        let mut builder = self
            .client
            .post(&self.write_url)
            .query(&[
                ("db", request.database.as_str()),
                ("precision", request.precision.as_ref()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);

        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_deref());
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        log::debug!("Store answered {status}");

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_write_url() {
        assert_eq!(write_url("http://localhost:8086/"), "http://localhost:8086/write");
        assert_eq!(write_url("http://influx:8086"), "http://influx:8086/write");
    }
}
