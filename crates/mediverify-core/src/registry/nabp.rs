use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use super::{format_api_error, transport_failure, ErrorKind, RegistrySource, SourceResult};
use crate::identity::ProviderIdentity;
use crate::network::{ApiRequest, HttpSession, Transport};

pub const NABP_TIMEOUT: Duration = Duration::from_secs(25);

/// Body-level markers the e-Profile service uses for a validated license.
const VALID_STATUSES: [&str; 3] = ["VALIDATED", "VALID", "Active"];

/// Client for the NABP e-Profile validation service.
///
/// The service authenticates with a bearer key, but the request is still
/// sent without one when no key is configured; the resulting 401 surfaces
/// as an `AuthConfig` failure.
pub struct NabpClient {
    session: HttpSession,
    base_url: String,
    api_key: Option<String>,
}

impl NabpClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            session: HttpSession::new(transport),
            base_url: base_url.into(),
            api_key,
        }
    }

    pub async fn verify(&self, identity: &ProviderIdentity) -> SourceResult {
        let license = identity.license_number.as_deref().unwrap_or("");

        if identity.first_name.is_empty() && identity.last_name.is_empty() && license.is_empty() {
            return SourceResult::failed(
                RegistrySource::Nabp,
                ErrorKind::Validation,
                format_api_error(
                    RegistrySource::Nabp,
                    "at least one of first name, last name, or license number is required",
                    None,
                ),
            );
        }

        let payload = json!({
            "firstName": identity.first_name,
            "lastName": identity.last_name,
            "licenseNumber": license,
            "state": identity.state.to_uppercase(),
        });

        debug!(state = %identity.state, "querying NABP e-Profile");
        let mut request = ApiRequest::post(&self.base_url)
            .with_json(payload)
            .with_timeout(NABP_TIMEOUT);
        if let Some(key) = &self.api_key {
            request = request.with_bearer(key.clone());
        }

        let response = match self.session.execute(request).await {
            Ok(response) => response,
            Err(error) => return transport_failure(RegistrySource::Nabp, &error),
        };

        match response.status {
            401 => {
                return SourceResult::failed(
                    RegistrySource::Nabp,
                    ErrorKind::AuthConfig,
                    format_api_error(
                        RegistrySource::Nabp,
                        "invalid or missing API key",
                        Some(401),
                    ),
                )
            }
            404 => {
                return SourceResult::failed(
                    RegistrySource::Nabp,
                    ErrorKind::NotFound,
                    "Provider not registered with NABP e-Profile".to_string(),
                )
            }
            status if !(200..300).contains(&status) => {
                return SourceResult::failed(
                    RegistrySource::Nabp,
                    ErrorKind::Http,
                    format_api_error(RegistrySource::Nabp, "request failed", Some(status)),
                )
            }
            _ => {}
        }

        let data = match response.json() {
            Ok(data) => data,
            Err(error) => {
                return SourceResult::failed(
                    RegistrySource::Nabp,
                    ErrorKind::Parse,
                    format_api_error(
                        RegistrySource::Nabp,
                        &format!("invalid response body: {error}"),
                        None,
                    ),
                )
            }
        };

        interpret_response(&data)
    }
}

fn interpret_response(data: &Value) -> SourceResult {
    if !is_validated(data) {
        return SourceResult::failed(
            RegistrySource::Nabp,
            ErrorKind::NotVerified,
            "NABP e-Profile did not validate the license".to_string(),
        );
    }

    let fields = extract_fields(data);
    let status = fields
        .get("license_status")
        .cloned()
        .unwrap_or_else(|| "Active".to_string());
    SourceResult::found(
        RegistrySource::Nabp,
        fields,
        format!("NABP e-Profile validated the license (status {status})"),
    )
}

fn is_validated(data: &Value) -> bool {
    if data["valid"].as_bool() == Some(true) || data["is_valid"].as_bool() == Some(true) {
        return true;
    }
    data["status"]
        .as_str()
        .is_some_and(|s| VALID_STATUSES.contains(&s))
}

/// The service has shipped several field spellings; accept each.
fn extract_fields(data: &Value) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    let status = data["license"]["status"]
        .as_str()
        .or_else(|| data["licenseStatus"].as_str())
        .or_else(|| data["license_status"].as_str())
        .unwrap_or("Active");
    fields.insert("license_status".to_string(), status.to_string());

    if let Some(expiration) = data["license"]["expiration_date"]
        .as_str()
        .or_else(|| data["expirationDate"].as_str())
    {
        fields.insert("expiration".to_string(), expiration.to_string());
    }

    if let Some(profile_id) = data["profile"]["e_profile_id"]
        .as_str()
        .or_else(|| data["eProfileId"].as_str())
    {
        fields.insert("e_profile_id".to_string(), profile_id.to_string());
    }

    fields
}
