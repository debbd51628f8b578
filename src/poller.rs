use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::error::{FluxError, Result};
use crate::extract::{interpret_with, next_polling_url};
use crate::http;
use crate::types::{ApiKey, Completion, JobHandle, PollOutcome, ProgressUpdate};

/// Suspends the poll loop between status checks.
///
/// The default [`TokioSleeper`] uses `tokio::time::sleep`; tests and hosts
/// with their own scheduler can supply another implementation.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Polls a submitted job until it is ready, fails, or is cancelled.
///
/// # Example
/// ```no_run
/// use flux_task::{ApiKey, Completion, JobHandle, PollConfig, ResultPoller};
///
/// # async fn example() -> flux_task::Result<()> {
/// let poller = ResultPoller::new(PollConfig::default());
/// let handle = JobHandle::new("task-id", "https://api.bfl.ai/v1/get_result?id=task-id");
/// let key = ApiKey::new("your-key");
/// match poller.wait(&handle, &key, None, |p| println!("{}", p)).await? {
///     Completion::Ready(locator) => println!("image at {}", locator.as_str()),
///     Completion::Cancelled => println!("cancelled"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResultPoller {
    http: Client,
    config: PollConfig,
    sleeper: Arc<dyn Sleeper>,
    request_timeout: Duration,
}

impl std::fmt::Debug for ResultPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultPoller")
            .field("config", &self.config)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ResultPoller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            sleeper: Arc::new(TokioSleeper),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Use a custom `reqwest::Client`.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Replace the timer used between status checks.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Per-request timeout for each status GET.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Fetch and classify a single status response.
    pub async fn check(&self, url: &str, key: &ApiKey) -> Result<(PollOutcome, Value)> {
        let request = http::authorized(self.http.get(url), key).timeout(self.request_timeout);
        let resp = http::send(request, "Failed to fetch FLUX job status").await?;

        if !resp.status().is_success() {
            let (status, message) = http::failure(resp).await;
            return Err(FluxError::PollingTransport { status, message });
        }

        let body = http::json_body(resp, "status").await?;
        Ok((interpret_with(&body, &self.config.failure_statuses), body))
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// `cancel` is checked before every status request and after every wait;
    /// a raised flag ends the loop with [`Completion::Cancelled`] and no
    /// further requests. `on_progress` is called for each pending response.
    pub async fn wait<F>(
        &self,
        handle: &JobHandle,
        key: &ApiKey,
        cancel: Option<&AtomicBool>,
        mut on_progress: F,
    ) -> Result<Completion>
    where
        F: FnMut(&ProgressUpdate),
    {
        let cancelled = || cancel.is_some_and(|c| c.load(Ordering::Relaxed));
        let start = Instant::now();
        let mut url = handle.polling_url().to_string();
        let mut polls: u32 = 0;

        loop {
            if cancelled() {
                info!(task_id = handle.task_id(), polls, "polling cancelled");
                return Ok(Completion::Cancelled);
            }
            self.check_budget(start, polls)?;

            polls += 1;
            let (outcome, body) = match self.check(&url, key).await {
                Ok(checked) => checked,
                Err(e) => {
                    warn!(task_id = handle.task_id(), polls, error = %e, "status check failed");
                    return Err(e);
                }
            };

            match outcome {
                PollOutcome::Ready(locator) => {
                    info!(task_id = handle.task_id(), polls, "job ready");
                    return Ok(Completion::Ready(locator));
                }
                PollOutcome::Unlocatable => {
                    warn!(task_id = handle.task_id(), %body, "ready response without an image");
                    return Err(FluxError::TerminalExtraction);
                }
                PollOutcome::Failed(reason) => {
                    warn!(task_id = handle.task_id(), %reason, "job failed");
                    return Err(FluxError::RemoteJobFailure(reason));
                }
                PollOutcome::Pending(progress) => {
                    debug!(task_id = handle.task_id(), polls, status = %progress, "job pending");
                    on_progress(&progress);
                    if let Some(next) = next_polling_url(&body) {
                        if next != url {
                            info!(task_id = handle.task_id(), from = %url, to = %next, "polling URL relocated");
                            url = next.to_string();
                        }
                    }
                }
            }

            if cancelled() {
                info!(task_id = handle.task_id(), polls, "polling cancelled");
                return Ok(Completion::Cancelled);
            }
            self.sleeper.sleep(self.config.interval).await;
        }
    }

    fn check_budget(&self, start: Instant, polls: u32) -> Result<()> {
        let elapsed = start.elapsed();
        let out_of_time = self.config.max_wait.is_some_and(|max| elapsed >= max);
        let out_of_polls = self.config.max_polls.is_some_and(|max| polls >= max);
        if out_of_time || out_of_polls {
            return Err(FluxError::Timeout { elapsed, polls });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_by_polls() {
        let poller = ResultPoller::new(
            PollConfig::builder()
                .with_max_wait(None)
                .with_max_polls(Some(3))
                .build(),
        );
        let start = Instant::now();
        assert!(poller.check_budget(start, 2).is_ok());
        assert!(matches!(
            poller.check_budget(start, 3),
            Err(FluxError::Timeout { polls: 3, .. })
        ));
    }

    #[test]
    fn test_budget_by_time() {
        let poller = ResultPoller::new(
            PollConfig::builder()
                .with_max_wait(Some(Duration::ZERO))
                .build(),
        );
        assert!(poller.check_budget(Instant::now(), 0).is_err());
    }

    #[test]
    fn test_unbounded_budget() {
        let poller = ResultPoller::new(
            PollConfig::builder()
                .with_max_wait(None)
                .with_max_polls(None)
                .build(),
        );
        assert!(poller.check_budget(Instant::now(), u32::MAX).is_ok());
    }

    #[test]
    fn test_debug_omits_internals() {
        let poller = ResultPoller::new(PollConfig::default());
        let rendered = format!("{:?}", poller);
        assert!(rendered.contains("ResultPoller"));
        assert!(rendered.contains("interval"));
    }
}
