#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Time-series store client.
//!
//! A harvest run commits all of its samples through one
//! [`TimeSeriesStore::write_batch`] call. [`InfluxStore`] sends them to an
//! InfluxDB 1.x `/write` endpoint as line protocol; [`LineProtocolPrinter`]
//! renders the same body to a writer for dry runs.

pub mod influx;
pub mod line_protocol;
pub mod printer;

use async_trait::async_trait;
use health_harvest_models::BatchWriteRequest;

pub use influx::InfluxStore;
pub use printer::LineProtocolPrinter;

/// Errors that can occur while writing a batch.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached, or the request timed out.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store rejected the write.
    #[error("Store rejected write with HTTP {status}: {body}")]
    Rejected {
        /// Response status code.
        status: u16,
        /// Response body (the store's error message).
        body: String,
    },

    /// A sample cannot be represented in the wire format.
    #[error("Encode error: {message}")]
    Encode {
        /// Description of what went wrong.
        message: String,
    },

    /// Writing a dry-run rendering failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }
}

/// A store that accepts one atomic batch per run.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Commits every sample of `request` in a single call.
    ///
    /// Returns the number of samples written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the batch cannot be encoded or the store
    /// does not accept it. Nothing is retried.
    async fn write_batch(&self, request: BatchWriteRequest) -> Result<usize, StoreError>;
}
