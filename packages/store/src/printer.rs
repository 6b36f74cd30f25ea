//! Dry-run store that prints line protocol instead of sending it.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use health_harvest_models::BatchWriteRequest;

use crate::line_protocol::encode_batch;
use crate::{StoreError, TimeSeriesStore};

/// Renders each batch to a writer.
pub struct LineProtocolPrinter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineProtocolPrinter<W> {
    #[must_use]
    pub const fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Returns the writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl LineProtocolPrinter<std::io::Stdout> {
    /// Prints to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> TimeSeriesStore for LineProtocolPrinter<W> {
    async fn write_batch(&self, request: BatchWriteRequest) -> Result<usize, StoreError> {
        let body = encode_batch(&request)?;
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        out.write_all(body.as_bytes())?;
        out.flush()?;
        Ok(request.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use health_harvest_models::{NormalizedSample, SampleValue};

    use super::*;

    #[tokio::test]
    async fn prints_batch_body() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let request = BatchWriteRequest::new(
            "project_health",
            vec![NormalizedSample::new(
                "jenkins_status",
                "billing",
                SampleValue::Numeric(0.5),
                at,
            )],
        );

        let printer = LineProtocolPrinter::new(Vec::new());
        let written = printer.write_batch(request).await.unwrap();
        let out = String::from_utf8(printer.into_inner()).unwrap();

        assert_eq!(written, 1);
        assert_eq!(
            out,
            "jenkins_status,project_key=billing val=0.5 1700000000000000000\n"
        );
    }
}
