use serde::{Deserialize, Serialize};

/// A provider as submitted for verification.
///
/// The display name is decomposed once at construction; registry payloads
/// are built from the decomposed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub provider_name: String,
    pub first_name: String,
    pub last_name: String,
    pub state: String,
    pub license_number: Option<String>,
}

impl ProviderIdentity {
    pub fn new(provider_name: impl Into<String>, state: impl Into<String>) -> Self {
        let provider_name = provider_name.into().trim().to_string();
        let (first_name, last_name) = split_name(&provider_name);
        Self {
            provider_name,
            first_name,
            last_name,
            state: state.into().trim().to_string(),
            license_number: None,
        }
    }

    /// Attach a license number; blank input is treated as absent.
    #[must_use]
    pub fn with_license_number(mut self, license_number: impl Into<String>) -> Self {
        let trimmed = license_number.into().trim().to_string();
        self.license_number = if trimmed.is_empty() { None } else { Some(trimmed) };
        self
    }

    /// License number usable for license verification (three or more
    /// characters). Shorter values are treated as absent.
    pub fn usable_license(&self) -> Option<&str> {
        self.license_number.as_deref().filter(|l| l.len() >= 3)
    }
}

/// First whitespace token and final whitespace token. A single-token name
/// leaves the last name empty.
fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.last().unwrap_or_default().to_string();
    (first, last)
}
