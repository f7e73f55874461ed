//! Pushes metric batches to the server

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::metric::{Metric, MetricRecord};
use crate::retry::{Retrier, RetryError, Transient};

/// Failure of one report attempt
#[derive(Debug)]
pub enum ReportError {
    /// The request could not be sent or timed out
    Request(reqwest::Error),

    /// The server answered with a non-success status
    Status(StatusCode),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Request(err) => write!(f, "request failed: {}", err),
            ReportError::Status(status) => write!(f, "server answered {}", status),
        }
    }
}

impl std::error::Error for ReportError {}

impl Transient for ReportError {
    fn is_transient(&self) -> bool {
        match self {
            ReportError::Request(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            ReportError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// HTTP client for the `/updates/` endpoint
pub struct Reporter {
    client: reqwest::Client,
    url: String,
    retrier: Retrier,
}

impl Reporter {
    pub fn new(server_url: &str, retrier: Retrier) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/updates/", server_url.trim_end_matches('/')),
            retrier,
        })
    }

    async fn send_once(&self, records: &[MetricRecord]) -> Result<(), ReportError> {
        let response = self
            .client
            .post(&self.url)
            .json(records)
            .send()
            .await
            .map_err(ReportError::Request)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::Status(status))
        }
    }

    /// Send one batch, retrying transient failures
    #[instrument(skip_all, fields(count = metrics.len()))]
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        metrics: &[Metric],
    ) -> Result<(), RetryError<ReportError>> {
        if metrics.is_empty() {
            return Ok(());
        }

        let records: Vec<MetricRecord> = metrics.iter().map(MetricRecord::from).collect();
        self.retrier
            .run(cancel, || self.send_once(&records))
            .await?;

        debug!("reported {} metrics", records.len());
        Ok(())
    }
}
