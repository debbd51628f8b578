use std::time::Duration;
use thiserror::Error;

/// Errors returned by FLUX job operations.
#[derive(Error, Debug)]
pub enum FluxError {
    /// Missing credential, unknown model, or an invalid request. Raised before
    /// any network call is made.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The submit endpoint returned a non-success HTTP status.
    #[error("Submission rejected with HTTP {status}: {message}")]
    Submission { status: u16, message: String },

    /// A status check returned a non-success HTTP status.
    #[error("Status check failed with HTTP {status}: {message}")]
    PollingTransport { status: u16, message: String },

    /// The job reported ready but no image could be located in the response.
    #[error("Job finished but no image was found in the response")]
    TerminalExtraction,

    /// The API declared the job failed.
    #[error("Generation failed: {0}")]
    RemoteJobFailure(String),

    /// The configured wait budget ran out before the job finished.
    #[error("Timed out after {polls} status checks ({elapsed:?})")]
    Timeout { elapsed: Duration, polls: u32 },

    /// Downloading the result image returned a non-success HTTP status.
    #[error("Image download failed with HTTP {status}: {message}")]
    Download { status: u16, message: String },

    /// The image consumer could not take the result.
    #[error("Could not deliver image: {0}")]
    Delivery(String),

    /// A generation is already in flight on this orchestrator.
    #[error("A generation is already running")]
    Busy,

    /// The response from the API was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// Inline image data was not valid Base64.
    #[error("Invalid Base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FluxError {
    /// HTTP status attached to this error, if the failure came from a response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FluxError::Submission { status, .. }
            | FluxError::PollingTransport { status, .. }
            | FluxError::Download { status, .. } => Some(*status),
            FluxError::Network { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, FluxError>;
