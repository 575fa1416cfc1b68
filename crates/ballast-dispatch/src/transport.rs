//! Job transport — delivers one job message to a worker and waits for
//! its result.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use ballast_core::wire::{JobMessage, JobResponse};

/// Submission retries for transport-level connection failures.
const SUBMIT_RETRIES: u32 = 10;

/// Ceiling on waiting for a job result.
const RESULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Transport-level failures. Detail stays in the logs; tenants only
/// ever see the dispatcher's generic messages.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("worker unreachable: {0}")]
    Unreachable(String),

    #[error("timed out waiting for job result")]
    Timeout,
}

/// Delivers job messages to workers.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Submit a job to the worker at `host` and block until its result
    /// arrives or the transport gives up.
    async fn submit_job(
        &self,
        host: &str,
        message: &JobMessage,
    ) -> Result<JobResponse, TransportError>;
}

/// HTTP transport posting jobs to the worker's job endpoint.
pub struct HttpJobTransport {
    client: reqwest::Client,
    submit_retries: u32,
    result_timeout: Duration,
}

impl HttpJobTransport {
    pub fn new() -> Self {
        Self::with_limits(SUBMIT_RETRIES, RESULT_TIMEOUT)
    }

    /// Override retry and timeout limits (for testing).
    pub fn with_limits(submit_retries: u32, result_timeout: Duration) -> Self {
        Self {
            // Workers live on the internal network; never route job
            // traffic through an egress proxy.
            client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .expect("failed to build HTTP client"),
            submit_retries,
            result_timeout,
        }
    }

    async fn submit_with_retries(
        &self,
        url: &str,
        message: &JobMessage,
    ) -> Result<JobResponse, TransportError> {
        let mut last_error = String::new();
        for attempt in 1..=self.submit_retries {
            match self.client.post(url).json(message).send().await {
                Ok(response) => {
                    let response = response
                        .error_for_status()
                        .map_err(|e| TransportError::Unreachable(e.to_string()))?;
                    return response
                        .json::<JobResponse>()
                        .await
                        .map_err(|e| TransportError::Unreachable(e.to_string()));
                }
                Err(e) if e.is_connect() => {
                    debug!(attempt, url, error = %e, "job submission failed, retrying");
                    last_error = e.to_string();
                }
                Err(e) if e.is_timeout() => return Err(TransportError::Timeout),
                Err(e) => return Err(TransportError::Unreachable(e.to_string())),
            }
        }
        Err(TransportError::Unreachable(last_error))
    }
}

impl Default for HttpJobTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobTransport for HttpJobTransport {
    async fn submit_job(
        &self,
        host: &str,
        message: &JobMessage,
    ) -> Result<JobResponse, TransportError> {
        let url = format!("http://{host}/v1/jobs");
        match tokio::time::timeout(self.result_timeout, self.submit_with_retries(&url, message))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
