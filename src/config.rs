use serde::Deserialize;
use std::time::Duration;

use crate::error::{FluxError, Result};
use crate::types::{ApiKey, GenerationParams};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.bfl.ai/v1";

/// Default model key.
pub const DEFAULT_MODEL: &str = "pro";

/// Polling policy for [`ResultPoller`](crate::ResultPoller).
///
/// Use [`PollConfig::builder()`] for ergonomic construction, or
/// [`PollConfig::default()`] for a 5 second interval capped at 10 minutes.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay between consecutive status checks.
    pub interval: Duration,

    /// Maximum wall-clock time to wait for a job. `None` = unbounded.
    pub max_wait: Option<Duration>,

    /// Maximum number of status checks. `None` = unbounded.
    pub max_polls: Option<u32>,

    /// Extra status values that end a job as failed, e.g. `"Content Moderated"`.
    /// Empty by default, so only `Error`/`failed` are terminal failures.
    pub failure_statuses: Vec<String>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: Some(Duration::from_secs(600)),
            max_polls: None,
            failure_statuses: Vec::new(),
        }
    }
}

impl PollConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> PollConfigBuilder {
        PollConfigBuilder::default()
    }
}

/// Builder for [`PollConfig`].
#[derive(Default)]
pub struct PollConfigBuilder {
    config: PollConfig,
}

impl PollConfigBuilder {
    /// Set the delay between status checks.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Cap the total wait, or pass `None` to wait indefinitely.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.config.max_wait = max_wait;
        self
    }

    /// Cap the number of status checks, or pass `None` for no cap.
    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.config.max_polls = max_polls;
        self
    }

    /// Treat these status values as terminal failures instead of pending.
    pub fn with_failure_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.failure_statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    /// Build the final [`PollConfig`].
    pub fn build(self) -> PollConfig {
        self.config
    }
}

/// Fully-resolved settings snapshot for one or more generations.
///
/// The host owns persistence; this crate only reads the value it is handed.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<ApiKey>,
    pub base_url: String,
    /// Model key used when a request does not name one.
    pub model: String,
    pub params: GenerationParams,
    pub poll: PollConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            params: GenerationParams::default(),
            poll: PollConfig::default(),
        }
    }
}

/// On-disk shape of [`Settings`] as hosts typically persist it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    api_key: Option<ApiKey>,
    base_url: Option<String>,
    model: Option<String>,
    params: Option<GenerationParams>,
    poll_interval_secs: Option<f64>,
    max_wait_secs: Option<f64>,
    max_polls: Option<u32>,
    failure_statuses: Option<Vec<String>>,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secs(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        FluxError::Configuration(format!(
            "{} must be a non-negative number of seconds, got {}",
            field, value
        ))
    })
}

impl Settings {
    /// Start building settings with the builder pattern.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Parse settings persisted as JSON. Absent fields keep their defaults;
    /// a `max_wait_secs` of `0` disables the wait cap. Negative durations and
    /// a non-positive `poll_interval_secs` are configuration errors.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: SettingsFile = serde_json::from_str(text)?;
        let mut settings = Settings::default();
        settings.api_key = file.api_key.filter(|k| !k.is_blank());
        if let Some(base_url) = file.base_url {
            settings.base_url = base_url;
        }
        if let Some(model) = file.model {
            settings.model = model;
        }
        if let Some(params) = file.params {
            settings.params = params;
        }
        if let Some(interval) = file.poll_interval_secs {
            let interval = secs("poll_interval_secs", interval)?;
            if interval.is_zero() {
                return Err(FluxError::Configuration(
                    "poll_interval_secs must be greater than zero".into(),
                ));
            }
            settings.poll.interval = interval;
        }
        if let Some(max_wait) = file.max_wait_secs {
            let max_wait = secs("max_wait_secs", max_wait)?;
            settings.poll.max_wait = (!max_wait.is_zero()).then_some(max_wait);
        }
        if file.max_polls.is_some() {
            settings.poll.max_polls = file.max_polls;
        }
        if let Some(statuses) = file.failure_statuses {
            settings.poll.failure_statuses = statuses;
        }
        Ok(settings)
    }

    /// Defaults overlaid with `BFL_API_KEY` (or `FLUX_API_KEY`),
    /// `FLUX_BASE_URL` and `FLUX_MODEL`.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        settings.api_key = non_empty_env("BFL_API_KEY")
            .or_else(|| non_empty_env("FLUX_API_KEY"))
            .map(ApiKey::new);
        if let Some(base_url) = non_empty_env("FLUX_BASE_URL") {
            settings.base_url = base_url;
        }
        if let Some(model) = non_empty_env("FLUX_MODEL") {
            settings.model = model;
        }
        settings
    }
}

/// Builder for [`Settings`].
#[derive(Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.settings.api_key = Some(ApiKey::new(key));
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.settings.model = model.into();
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.settings.params = params;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.settings.poll = poll;
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.max_wait, Some(Duration::from_secs(600)));
        assert_eq!(config.max_polls, None);
    }

    #[test]
    fn test_poll_builder() {
        let config = PollConfig::builder()
            .with_interval(Duration::from_millis(250))
            .with_max_wait(None)
            .with_max_polls(Some(10))
            .with_failure_statuses(["Request Moderated"])
            .build();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.max_wait, None);
        assert_eq!(config.max_polls, Some(10));
        assert_eq!(config.failure_statuses, vec!["Request Moderated"]);
    }

    #[test]
    fn test_settings_from_json() {
        let settings = Settings::from_json(
            r#"{
                "api_key": "k",
                "model": "max",
                "params": {"steps": 40, "prompt_upsampling": true},
                "poll_interval_secs": 2.5,
                "max_wait_secs": 0
            }"#,
        )
        .unwrap();
        assert_eq!(settings.api_key.as_ref().map(ApiKey::expose), Some("k"));
        assert_eq!(settings.model, "max");
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.params.steps, 40);
        assert!(settings.params.prompt_upsampling);
        assert_eq!(settings.poll.interval, Duration::from_millis(2500));
        assert_eq!(settings.poll.max_wait, None);
    }

    #[test]
    fn test_invalid_durations_are_rejected() {
        for text in [
            r#"{"max_wait_secs": -5}"#,
            r#"{"poll_interval_secs": -1}"#,
            r#"{"poll_interval_secs": 0}"#,
        ] {
            let err = Settings::from_json(text).unwrap_err();
            assert!(matches!(err, FluxError::Configuration(_)), "{}", text);
        }
    }

    #[test]
    fn test_failure_statuses_from_json() {
        let settings =
            Settings::from_json(r#"{"failure_statuses": ["Content Moderated"]}"#).unwrap();
        assert_eq!(settings.poll.failure_statuses, vec!["Content Moderated"]);
        assert!(Settings::default().poll.failure_statuses.is_empty());
    }

    #[test]
    fn test_blank_key_is_treated_as_missing() {
        let settings = Settings::from_json(r#"{"api_key": "  "}"#).unwrap();
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_settings_builder() {
        let settings = Settings::builder()
            .with_api_key("abc")
            .with_base_url("http://localhost:9000")
            .with_model("fill")
            .build();
        assert_eq!(settings.base_url, "http://localhost:9000");
        assert_eq!(settings.model, "fill");
        assert!(format!("{:?}", settings).contains("<redacted>"));
    }
}
