use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::encoder;
use crate::error::{FluxError, Result};
use crate::http::{self, normalize};
use crate::models::{ModelEndpoint, ModelRegistry};
use crate::types::{ApiKey, GenerationParams, JobHandle, JobRequest, ModelFamily};

const OUTPUT_FORMAT: &str = "png";

/// Posts generation jobs to the FLUX API.
///
/// Submissions are never retried: each accepted POST is a separate billable
/// job on the remote side.
///
/// # Example
/// ```no_run
/// use flux_task::{ApiKey, JobRequest, TaskSubmitter};
///
/// # async fn example() -> flux_task::Result<()> {
/// let submitter = TaskSubmitter::new("https://api.bfl.ai/v1");
/// let key = ApiKey::new("your-key");
/// let handle = submitter
///     .submit(&JobRequest::new("pro", "a lighthouse at dusk"), Some(&key))
///     .await?;
/// println!("submitted {}", handle.task_id());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TaskSubmitter {
    http: Client,
    base_url: String,
    registry: ModelRegistry,
    timeout: Duration,
}

impl TaskSubmitter {
    /// Create a submitter for the given API base URL with the default models.
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            http: Client::new(),
            base_url: normalize(base_url.as_ref()),
            registry: ModelRegistry::default(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Replace the model registry.
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Per-request timeout for the submit POST.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Submit a job and return its handle.
    ///
    /// All validation happens before the network call; a missing credential,
    /// unknown model or malformed request fails with
    /// [`FluxError::Configuration`] without contacting the API.
    pub async fn submit(&self, request: &JobRequest, key: Option<&ApiKey>) -> Result<JobHandle> {
        let key = require_key(key)?;
        let endpoint = self.registry.resolve(&request.model)?;
        validate(request, endpoint.family)?;

        let image = request.image.as_deref().map(encoder::encode);
        let body = request_body(endpoint.family, request, image);
        self.post(endpoint, &body, key).await
    }

    /// Submit a job whose image is already Base64 encoded.
    pub async fn submit_encoded(
        &self,
        request: &JobRequest,
        image_b64: Option<String>,
        key: Option<&ApiKey>,
    ) -> Result<JobHandle> {
        let key = require_key(key)?;
        let endpoint = self.registry.resolve(&request.model)?;
        let has_image = image_b64.as_deref().is_some_and(|s| !s.is_empty());
        validate_shape(request, endpoint.family, has_image)?;

        let body = request_body(endpoint.family, request, image_b64);
        self.post(endpoint, &body, key).await
    }

    async fn post(&self, endpoint: &ModelEndpoint, body: &Value, key: &ApiKey) -> Result<JobHandle> {
        let url = format!("{}{}", self.base_url, endpoint.path);
        let request = http::authorized(self.http.post(&url), key)
            .timeout(self.timeout)
            .json(body);
        let resp = http::send(request, format!("Cannot reach FLUX API at {}", url)).await?;

        if !resp.status().is_success() {
            let (status, message) = http::failure(resp).await;
            warn!(status, %message, endpoint = %endpoint.path, "submission rejected");
            return Err(FluxError::Submission { status, message });
        }

        let json = http::json_body(resp, "submit").await?;

        let handle = self.handle_from_response(&json)?;
        info!(
            task_id = handle.task_id(),
            endpoint = %endpoint.path,
            "job submitted"
        );
        Ok(handle)
    }

    /// Build a handle from a submit response. Endpoints without an explicit
    /// `polling_url` are polled through `get_result?id=`.
    pub fn handle_from_response(&self, json: &Value) -> Result<JobHandle> {
        let task_id = json
            .get("id")
            .and_then(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FluxError::InvalidResponse("Submit response missing id".into()))?;

        let polling_url = json
            .get("polling_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.result_url(&task_id));

        Ok(JobHandle::new(task_id, polling_url))
    }

    /// Status URL for a task id, for endpoints that do not return one.
    pub fn result_url(&self, task_id: &str) -> String {
        let base = format!("{}/get_result", self.base_url);
        reqwest::Url::parse_with_params(&base, &[("id", task_id)])
            .map(String::from)
            .unwrap_or_else(|_| format!("{}?id={}", base, task_id))
    }
}

fn require_key(key: Option<&ApiKey>) -> Result<&ApiKey> {
    key.filter(|k| !k.is_blank())
        .ok_or_else(|| FluxError::Configuration("missing API key".into()))
}

/// Check a request against the rules of its family.
pub fn validate(request: &JobRequest, family: ModelFamily) -> Result<()> {
    let has_image = request.image.as_ref().is_some_and(|b| !b.is_empty());
    validate_shape(request, family, has_image)
}

fn validate_shape(request: &JobRequest, family: ModelFamily, has_image: bool) -> Result<()> {
    let has_prompt = !request.prompt.trim().is_empty();
    match family {
        ModelFamily::Fill if !has_image => {
            return Err(FluxError::Configuration(
                "fill models require an input image".into(),
            ))
        }
        ModelFamily::Kontext if !has_image && !has_prompt => {
            return Err(FluxError::Configuration(
                "a prompt is required for text-to-image generation".into(),
            ))
        }
        _ => {}
    }
    validate_params(&request.params)
}

fn validate_params(params: &GenerationParams) -> Result<()> {
    if !(1..=50).contains(&params.steps) {
        return Err(FluxError::Configuration(format!(
            "steps must be between 1 and 50, got {}",
            params.steps
        )));
    }
    if params.safety_tolerance > 6 {
        return Err(FluxError::Configuration(format!(
            "safety_tolerance must be between 0 and 6, got {}",
            params.safety_tolerance
        )));
    }
    if !params.guidance.is_finite() {
        return Err(FluxError::Configuration("guidance must be a finite number".into()));
    }
    Ok(())
}

/// Wire body for a request family.
pub fn request_body(family: ModelFamily, request: &JobRequest, image_b64: Option<String>) -> Value {
    let params = &request.params;
    match family {
        ModelFamily::Fill => json!({
            "image": image_b64,
            "prompt": request.prompt,
            "steps": params.steps,
            "prompt_upsampling": params.prompt_upsampling,
            "guidance": params.guidance,
            "output_format": OUTPUT_FORMAT,
            "safety_tolerance": params.safety_tolerance,
        }),
        ModelFamily::Kontext => json!({
            "prompt": request.prompt,
            "input_image": image_b64,
            "seed": params.seed,
            "aspect_ratio": params.aspect_ratio,
            "output_format": OUTPUT_FORMAT,
            "prompt_upsampling": params.prompt_upsampling,
            "safety_tolerance": params.safety_tolerance,
        }),
    }
}
