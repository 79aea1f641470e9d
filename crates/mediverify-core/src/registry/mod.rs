mod nabp;
mod npi;
mod propelus;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use nabp::NabpClient;
pub use npi::{is_valid_npi_format, NpiClient, NpiQuery};
pub use propelus::PropelusClient;

/// External registries this service can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrySource {
    Npi,
    Nabp,
    Propelus,
}

impl RegistrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npi => "npi",
            Self::Nabp => "nabp",
            Self::Propelus => "propelus",
        }
    }

    /// Name used in user-facing error strings and report headings.
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Npi => "NPI Registry",
            Self::Nabp => "NABP",
            Self::Propelus => "Propelus",
        }
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RegistrySource {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "npi" => Ok(Self::Npi),
            "nabp" => Ok(Self::Nabp),
            "propelus" => Ok(Self::Propelus),
            _ => Err(crate::error::Error::InvalidSource(s.to_string())),
        }
    }
}

/// How a registry check failed, when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The registry has no record of the provider.
    NotFound,
    /// Found, but the registry does not consider the credential active.
    NotVerified,
    Timeout,
    /// Missing or rejected credentials for the registry itself.
    AuthConfig,
    RateLimited,
    /// Input rejected locally before any network call.
    Validation,
    /// Non-auth, non-rate-limit HTTP error status.
    Http,
    /// Response body could not be interpreted.
    Parse,
    Connection,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotVerified => "not_verified",
            Self::Timeout => "timeout",
            Self::AuthConfig => "auth_config",
            Self::RateLimited => "rate_limited",
            Self::Validation => "validation",
            Self::Http => "http",
            Self::Parse => "parse",
            Self::Connection => "connection",
            Self::Unexpected => "unexpected",
        }
    }

    /// Transient conditions that may clear on a later run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Http | Self::Connection
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a registry client learned about a provider.
///
/// Clients always return one of these. Failures are data: they are carried
/// in `error` and `raw_message` rather than raised, so later stages can
/// weigh them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: RegistrySource,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    pub raw_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl SourceResult {
    pub fn found(
        source: RegistrySource,
        fields: BTreeMap<String, String>,
        raw_message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            verified: true,
            fields,
            raw_message: raw_message.into(),
            error: None,
        }
    }

    pub fn failed(source: RegistrySource, kind: ErrorKind, raw_message: impl Into<String>) -> Self {
        Self {
            source,
            verified: false,
            fields: BTreeMap::new(),
            raw_message: raw_message.into(),
            error: Some(kind),
        }
    }

    /// Attach extracted fields to a failure result. Used when the registry
    /// located the provider but the credential is not in good standing.
    #[must_use]
    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_not_found(&self) -> bool {
        self.error == Some(ErrorKind::NotFound)
    }
}

/// Uniform error string for registry failures. Later stages and reports
/// match on the `ERROR:` prefix, so every client funnels failures through
/// here.
pub fn format_api_error(source: RegistrySource, detail: &str, status: Option<u16>) -> String {
    match status {
        Some(code) => format!(
            "ERROR: {} API returned HTTP {code}: {detail}",
            source.api_name()
        ),
        None => format!("ERROR: {} API error: {detail}", source.api_name()),
    }
}

/// Folds a transport failure into a `SourceResult` with the matching kind.
pub(crate) fn transport_failure(
    source: RegistrySource,
    error: &crate::network::TransportError,
) -> SourceResult {
    use crate::network::TransportError;

    let (kind, detail) = match error {
        TransportError::Timeout { seconds } => (
            ErrorKind::Timeout,
            format!("request timed out after {seconds}s"),
        ),
        TransportError::Connect(detail) => {
            (ErrorKind::Connection, format!("connection failed: {detail}"))
        }
        TransportError::InvalidUrl(detail) => {
            (ErrorKind::Unexpected, format!("invalid URL: {detail}"))
        }
        TransportError::Http(detail) => (ErrorKind::Unexpected, detail.clone()),
    };
    SourceResult::failed(source, kind, format_api_error(source, &detail, None))
}
