use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::network::{RetryPolicy, Transport};
use crate::summarize::{
    GeminiSummarizer, Summarizer, TemplateSummarizer, DEFAULT_GEMINI_MODEL,
    DEFAULT_GEMINI_TEMPERATURE,
};

pub const DEFAULT_NPI_API_URL: &str = "https://npiregistry.cms.hhs.gov/api/";
pub const DEFAULT_NABP_API_URL: &str = "https://api.nabp.pharmacy/v2/Individual/eprofile/validate";
pub const DEFAULT_PROPELUS_API_URL: &str = "https://api.propelus.com/v1/license/verify";

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_BACKOFF: f64 = 0.3;
const DEFAULT_REPORTS_DIR: &str = "./reports";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL in {name}: {detail}")]
    InvalidUrl { name: &'static str, detail: String },

    #[error("{name} is out of range: {detail}")]
    OutOfRange { name: &'static str, detail: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime configuration, read once at startup and passed explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_temperature: f32,
    /// Disabled by `--no-llm`; forces the template summarizer.
    pub use_llm: bool,

    pub nabp_api_key: Option<String>,
    pub nabp_api_url: String,
    pub propelus_api_key: Option<String>,
    pub propelus_api_url: String,
    pub npi_api_url: String,

    pub max_retries: u32,
    pub api_timeout: Duration,
    pub retry_backoff: f64,

    pub reports_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_temperature: DEFAULT_GEMINI_TEMPERATURE,
            use_llm: true,
            nabp_api_key: None,
            nabp_api_url: DEFAULT_NABP_API_URL.to_string(),
            propelus_api_key: None,
            propelus_api_url: DEFAULT_PROPELUS_API_URL.to_string(),
            npi_api_url: DEFAULT_NPI_API_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
        }
    }
}

impl AppConfig {
    /// Reads configuration from the process environment. Unset or blank
    /// variables keep their defaults.
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self::from_lookup(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Same as `from_env` but with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.gemini_api_key = non_blank(lookup("GEMINI_API_KEY"));
        if let Some(model) = non_blank(lookup("GEMINI_MODEL")) {
            config.gemini_model = model;
        }
        if let Some(temperature) = parse_var(lookup("GEMINI_TEMPERATURE")) {
            config.gemini_temperature = temperature;
        }

        config.nabp_api_key = non_blank(lookup("NABP_API_KEY"));
        if let Some(url) = non_blank(lookup("NABP_API_URL")) {
            config.nabp_api_url = url;
        }
        config.propelus_api_key = non_blank(lookup("PROPELUS_API_KEY"));
        if let Some(url) = non_blank(lookup("PROPELUS_API_URL")) {
            config.propelus_api_url = url;
        }
        if let Some(url) = non_blank(lookup("NPI_API_URL")) {
            config.npi_api_url = url;
        }

        if let Some(retries) = parse_var(lookup("MAX_RETRIES")) {
            config.max_retries = retries;
        }
        if let Some(seconds) = parse_var::<u64>(lookup("API_TIMEOUT")) {
            config.api_timeout = Duration::from_secs(seconds);
        }
        if let Some(backoff) = parse_var(lookup("RETRY_BACKOFF")) {
            config.retry_backoff = backoff;
        }
        if let Some(dir) = non_blank(lookup("REPORTS_DIR")) {
            config.reports_dir = PathBuf::from(dir);
        }

        config
    }

    /// Checks value ranges and warns about missing optional credentials.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("NPI_API_URL", &self.npi_api_url),
            ("NABP_API_URL", &self.nabp_api_url),
            ("PROPELUS_API_URL", &self.propelus_api_url),
        ] {
            let parsed = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
                name,
                detail: e.to_string(),
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidUrl {
                    name,
                    detail: format!("unsupported scheme {}", parsed.scheme()),
                });
            }
        }

        if self.max_retries == 0 {
            return Err(ConfigError::OutOfRange {
                name: "MAX_RETRIES",
                detail: "must be at least 1".to_string(),
            });
        }
        if self.api_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                name: "API_TIMEOUT",
                detail: "must be at least 1 second".to_string(),
            });
        }
        if self.retry_backoff < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "RETRY_BACKOFF",
                detail: "must not be negative".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.gemini_temperature) {
            return Err(ConfigError::OutOfRange {
                name: "GEMINI_TEMPERATURE",
                detail: "must be between 0.0 and 2.0".to_string(),
            });
        }

        if self.nabp_api_key.is_none() {
            warn!("NABP_API_KEY not set; NABP requests will be unauthenticated");
        }
        if self.propelus_api_key.is_none() {
            warn!("PROPELUS_API_KEY not set; Propelus checks will fail fast");
        }
        if self.use_llm && self.gemini_api_key.is_none() {
            warn!("GEMINI_API_KEY not set; falling back to the template summarizer");
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_attempts(self.max_retries, self.retry_backoff)
    }

    /// Chooses the summarizer: Gemini when a key is configured and LLM use
    /// is enabled, otherwise the deterministic template.
    pub fn summarizer(&self, transport: Arc<dyn Transport>) -> Box<dyn Summarizer> {
        if !self.use_llm {
            return Box::new(TemplateSummarizer::new());
        }
        match &self.gemini_api_key {
            Some(key) => Box::new(GeminiSummarizer::new(
                transport,
                key.clone(),
                &self.gemini_model,
                self.gemini_temperature,
            )),
            None => Box::new(TemplateSummarizer::new()),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    non_blank(value).and_then(|v| v.parse().ok())
}
