use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::encoder;
use crate::error::{FluxError, Result};
use crate::poller::ResultPoller;
use crate::submit::{self, TaskSubmitter};
use crate::types::{ApiKey, Completion, GenerationParams, ImageLocator, JobRequest};

/// Receives the finished image, e.g. to place it into a host document.
#[async_trait]
pub trait ImageConsumer: Send + Sync {
    async fn accept(&self, locator: &ImageLocator) -> Result<()>;
}

/// Pipeline stage a progress update or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configure,
    Encode,
    Submit,
    Poll,
    Deliver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Configure => "configure",
            Stage::Encode => "encode",
            Stage::Submit => "submit",
            Stage::Poll => "poll",
            Stage::Deliver => "deliver",
        })
    }
}

/// A single status line for the host to display.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub stage: Stage,
    pub message: String,
    pub percent: Option<f32>,
}

/// A failed generation: the stage that failed and why.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct GenerateError {
    pub stage: Stage,
    #[source]
    pub source: FluxError,
}

impl GenerateError {
    fn at(stage: Stage) -> impl FnOnce(FluxError) -> Self {
        move |source| Self { stage, source }
    }

    /// HTTP status of the failing response, if there was one.
    pub fn http_status(&self) -> Option<u16> {
        self.source.http_status()
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match (&self.stage, &self.source) {
            (_, FluxError::Busy) => "A generation is already running.".to_string(),
            (Stage::Configure, e) => format!("Check your settings: {}", e),
            (Stage::Submit, FluxError::Submission { status, message }) => {
                format!("The job was rejected (HTTP {}): {}", status, message)
            }
            (Stage::Poll, FluxError::RemoteJobFailure(reason)) => {
                format!("The generation failed: {}", reason)
            }
            (Stage::Poll, FluxError::TerminalExtraction) => {
                "The job finished but no image was returned.".to_string()
            }
            (Stage::Poll, FluxError::Timeout { elapsed, .. }) => format!(
                "Gave up waiting for the result after {}s.",
                elapsed.as_secs()
            ),
            (Stage::Poll, FluxError::PollingTransport { status, message }) => format!(
                "Lost contact with the job (HTTP {}): {}. Try generating again.",
                status, message
            ),
            (Stage::Deliver, e) => format!("The image could not be imported: {}", e),
            (stage, e) => format!("Failed to {}: {}", stage, e),
        }
    }
}

/// What the caller wants generated.
#[derive(Debug, Clone, Default)]
pub struct GenerateInput {
    /// Raw image bytes exported by the host. `None` for text-to-image.
    pub image: Option<Vec<u8>>,
    pub prompt: String,
    /// Model key; falls back to [`Settings::model`].
    pub model: Option<String>,
    /// Overrides [`Settings::params`] for this call.
    pub params: Option<GenerationParams>,
}

impl GenerateInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = Some(params);
        self
    }
}

/// Marks a job as running. Dropping it clears the cancel flag, so a cancel
/// raised before or during a job applies to that job and never leaks into the
/// next one.
struct InFlight<'a> {
    running: &'a AtomicBool,
    cancel: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(running: &'a AtomicBool, cancel: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight { running, cancel })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cancel.store(false, Ordering::Relaxed);
        self.running.store(false, Ordering::Release);
    }
}

/// Runs encode → submit → poll → deliver for one job at a time.
///
/// A second [`generate`](Self::generate) while one is running fails with
/// [`FluxError::Busy`] at the configure stage.
///
/// # Example
/// ```no_run
/// use flux_task::{FluxError, GenerateInput, ImageConsumer, ImageLocator, Orchestrator, Settings};
///
/// struct PrintConsumer;
///
/// #[async_trait::async_trait]
/// impl ImageConsumer for PrintConsumer {
///     async fn accept(&self, locator: &ImageLocator) -> Result<(), FluxError> {
///         println!("result: {}", locator.as_str());
///         Ok(())
///     }
/// }
///
/// # async fn example() {
/// let orchestrator = Orchestrator::new(Settings::from_env(), PrintConsumer);
/// let input = GenerateInput::new("a red bicycle").model("pro");
/// match orchestrator.generate(input, |p| println!("[{}] {}", p.stage, p.message)).await {
///     Ok(done) => println!("{:?}", done),
///     Err(e) => eprintln!("{}", e.user_message()),
/// }
/// # }
/// ```
pub struct Orchestrator<C: ImageConsumer> {
    settings: Arc<Settings>,
    submitter: TaskSubmitter,
    poller: ResultPoller,
    consumer: C,
    in_flight: AtomicBool,
    cancel: Arc<AtomicBool>,
}

impl<C: ImageConsumer> fmt::Debug for Orchestrator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("submitter", &self.submitter)
            .field("poller", &self.poller)
            .field("in_flight", &self.is_running())
            .finish()
    }
}

impl<C: ImageConsumer> Orchestrator<C> {
    pub fn new(settings: Settings, consumer: C) -> Self {
        let submitter = TaskSubmitter::new(&settings.base_url);
        let poller = ResultPoller::new(settings.poll.clone());
        Self {
            settings: Arc::new(settings),
            submitter,
            poller,
            consumer,
            in_flight: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share one `reqwest::Client` between submission and polling.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.submitter = self.submitter.with_http_client(client.clone());
        self.poller = self.poller.with_http_client(client);
        self
    }

    pub fn with_submitter(mut self, submitter: TaskSubmitter) -> Self {
        self.submitter = submitter;
        self
    }

    pub fn with_poller(mut self, poller: ResultPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Flag observed by the running job. Raising it ends the job with
    /// [`Completion::Cancelled`]; it is cleared when the job ends.
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Cancel the running job. A cancel raised while no job has started yet
    /// applies to the next [`generate`](Self::generate) call.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Run one generation end to end.
    ///
    /// No stage starts unless the previous one succeeded. Cancellation before
    /// submission makes no network calls at all, including a cancel raised
    /// before this call was first polled.
    pub async fn generate<F>(
        &self,
        input: GenerateInput,
        mut on_progress: F,
    ) -> std::result::Result<Completion, GenerateError>
    where
        F: FnMut(&Progress),
    {
        let _guard = InFlight::acquire(&self.in_flight, &self.cancel).ok_or(GenerateError {
            stage: Stage::Configure,
            source: FluxError::Busy,
        })?;

        let mut report = |stage: Stage, message: String, percent: Option<f32>| {
            on_progress(&Progress {
                stage,
                message,
                percent,
            })
        };

        report(Stage::Configure, "Checking settings".into(), None);
        let (key, request) = self.prepare(input).map_err(GenerateError::at(Stage::Configure))?;

        report(Stage::Encode, "Encoding image".into(), None);
        let image_b64 = request.image.as_deref().map(encoder::encode);

        if self.is_cancelled() {
            info!("generation cancelled before submission");
            return Ok(Completion::Cancelled);
        }

        report(Stage::Submit, "Submitting job".into(), None);
        let handle = self
            .submitter
            .submit_encoded(&request, image_b64, Some(key))
            .await
            .map_err(GenerateError::at(Stage::Submit))?;
        drop(request);

        report(Stage::Poll, format!("Waiting for job {}", handle.task_id()), None);
        let completion = self
            .poller
            .wait(&handle, key, Some(&*self.cancel), |p| {
                report(Stage::Poll, p.status.clone(), p.percent)
            })
            .await
            .map_err(GenerateError::at(Stage::Poll))?;

        let locator = match completion {
            Completion::Ready(locator) => locator,
            Completion::Cancelled => {
                report(Stage::Poll, "Cancelled".into(), None);
                return Ok(Completion::Cancelled);
            }
        };

        report(Stage::Deliver, "Importing result".into(), None);
        if let Err(e) = self.consumer.accept(&locator).await {
            warn!(task_id = handle.task_id(), error = %e, "image consumer failed");
            return Err(GenerateError::at(Stage::Deliver)(e));
        }

        report(Stage::Deliver, "Done".into(), Some(100.0));
        Ok(Completion::Ready(locator))
    }

    fn prepare(&self, input: GenerateInput) -> Result<(&ApiKey, JobRequest)> {
        let key = self
            .settings
            .api_key
            .as_ref()
            .filter(|k| !k.is_blank())
            .ok_or_else(|| FluxError::Configuration("missing API key".into()))?;

        let model = input
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.settings.model.clone());
        let endpoint = self.submitter.registry().resolve(&model)?;

        let request = JobRequest {
            image: input.image.filter(|b| !b.is_empty()),
            prompt: input.prompt,
            params: input.params.unwrap_or_else(|| self.settings.params.clone()),
            model,
        };
        submit::validate(&request, endpoint.family)?;
        Ok((key, request))
    }
}
