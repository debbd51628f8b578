//! # flux-task
//!
//! Async Rust client for FLUX image-generation jobs — submit a job, poll it
//! to completion, and extract the result image.
//!
//! The FLUX API family answers with loosely specified, heterogeneous response
//! shapes. This crate hides that behind one contract:
//!
//! - **Encoding** of raw image bytes to chunked, unwrapped Base64
//! - **Submission** to fill-style or Kontext-style endpoints selected by a
//!   model key (`"fill"`, `"pro"`, `"max"`)
//! - **Polling** with cancellation, a wait budget, mid-flight polling-URL
//!   relocation, and tolerance for unknown intermediate statuses
//! - **Extraction** of the image locator through an ordered chain of
//!   response-shape extractors
//! - **Orchestration** of the whole sequence with stage-tagged errors and a
//!   single progress line for the host UI
//!
//! ## Quick Start
//!
//! ```no_run
//! use flux_task::{ApiKey, Completion, JobRequest, PollConfig, ResultPoller, TaskSubmitter};
//!
//! # async fn example() -> flux_task::Result<()> {
//! let key = ApiKey::new("your-key");
//! let submitter = TaskSubmitter::new("https://api.bfl.ai/v1");
//! let poller = ResultPoller::new(PollConfig::default());
//!
//! let request = JobRequest::new("pro", "a koi pond in the rain");
//! let handle = submitter.submit(&request, Some(&key)).await?;
//!
//! let outcome = poller
//!     .wait(&handle, &key, None, |p| println!("{}", p))
//!     .await?;
//!
//! if let Completion::Ready(locator) = outcome {
//!     println!("image: {}", locator.as_str());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod download;
pub mod encoder;
pub mod error;
pub mod extract;
mod http;
pub mod models;
pub mod orchestrator;
pub mod poller;
pub mod submit;
pub mod types;

pub use config::{PollConfig, Settings};
pub use download::fetch_image;
pub use error::{FluxError, Result};
pub use models::{ModelEndpoint, ModelRegistry};
pub use orchestrator::{GenerateError, GenerateInput, ImageConsumer, Orchestrator, Progress, Stage};
pub use poller::{ResultPoller, Sleeper, TokioSleeper};
pub use submit::TaskSubmitter;
pub use types::{
    ApiKey, Completion, GenerationParams, ImageLocator, JobHandle, JobRequest, ModelFamily,
    PollOutcome, ProgressUpdate,
};
