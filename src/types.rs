use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque API credential sent as the `x-key` header.
///
/// `Debug` is redacted so the key never reaches logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Request body family accepted by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Inpainting-style endpoint; an input image is mandatory.
    Fill,
    /// Image editing or text-to-image; the input image is optional.
    Kontext,
}

/// Generation tunables shared by both request families.
///
/// Fill endpoints use `steps` and `guidance`; Kontext endpoints use `seed`
/// and `aspect_ratio`. Unused fields are ignored by the wire encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub steps: u32,
    pub guidance: f64,
    pub prompt_upsampling: bool,
    pub safety_tolerance: u8,
    pub seed: Option<u64>,
    pub aspect_ratio: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            steps: 30,
            guidance: 60.0,
            prompt_upsampling: false,
            safety_tolerance: 2,
            seed: None,
            aspect_ratio: None,
        }
    }
}

/// One generation job, consumed by a single submission.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Raw input image bytes. `None` for text-only generation.
    pub image: Option<Vec<u8>>,
    pub prompt: String,
    pub params: GenerationParams,
    /// Model key looked up in the [`ModelRegistry`](crate::ModelRegistry).
    pub model: String,
}

impl JobRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            image: None,
            prompt: prompt.into(),
            params: GenerationParams::default(),
            model: model.into(),
        }
    }

    pub fn image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

/// Handle to a submitted remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    task_id: String,
    polling_url: String,
}

impl JobHandle {
    pub fn new(task_id: impl Into<String>, polling_url: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            polling_url: polling_url.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn polling_url(&self) -> &str {
        &self.polling_url
    }
}

/// Reference to a generated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageLocator {
    /// A signed, usually short-lived, download URL.
    Url(String),
    /// The image itself, Base64 encoded.
    Base64(String),
}

impl ImageLocator {
    /// Classify a raw locator string. `data:` URIs are reduced to their
    /// payload and strings drawn from the Base64 alphabet are inline data.
    /// Anything else is a URL only if it carries a scheme; bare paths such as
    /// `/files/x.png` cannot be fetched and yield `None`.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(ImageLocator::Url(raw.to_string()));
        }
        if lower.starts_with("data:") {
            let (_, payload) = raw.split_once(',')?;
            let payload = payload.trim();
            return (!payload.is_empty()).then(|| ImageLocator::Base64(payload.to_string()));
        }
        if is_base64(raw) {
            return Some(ImageLocator::Base64(raw.to_string()));
        }
        raw.contains("://").then(|| ImageLocator::Url(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ImageLocator::Url(s) | ImageLocator::Base64(s) => s,
        }
    }
}

fn is_base64(s: &str) -> bool {
    s.chars()
        .filter(|c| !c.is_ascii_whitespace())
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
}

/// Progress reported by a pending status check.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Raw status discriminator, e.g. `"Pending"`.
    pub status: String,
    /// Completion percentage in `0.0..=100.0`, when the API supplies one.
    pub percent: Option<f32>,
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent {
            Some(p) => write!(f, "{} ({:.0}%)", self.status, p),
            None => f.write_str(&self.status),
        }
    }
}

/// Interpretation of a single status response.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Pending(ProgressUpdate),
    Ready(ImageLocator),
    /// Ready status, but no image could be located in the body.
    Unlocatable,
    Failed(String),
}

/// How a wait for a job ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Ready(ImageLocator),
    /// The caller's cancellation flag was raised.
    Cancelled,
}
