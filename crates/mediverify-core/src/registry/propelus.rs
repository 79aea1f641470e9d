use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use super::{format_api_error, transport_failure, ErrorKind, RegistrySource, SourceResult};
use crate::identity::ProviderIdentity;
use crate::network::{ApiRequest, HttpSession, RetryPolicy, Transport};
use crate::states;

pub const DEFAULT_PROPELUS_TIMEOUT: Duration = Duration::from_secs(30);

const MIN_NAME_LEN: usize = 2;
const MIN_LICENSE_LEN: usize = 3;

/// Client for the Propelus license-verification API.
///
/// Propelus bills per call, so input is validated locally and the client
/// refuses to call at all without an API key. Requests go through the
/// retrying session since the service sheds load with 5xx statuses.
pub struct PropelusClient {
    session: HttpSession,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl PropelusClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            session: HttpSession::with_retries(transport, policy),
            base_url: base_url.into(),
            api_key,
            timeout,
        }
    }

    pub async fn verify(&self, identity: &ProviderIdentity) -> SourceResult {
        if let Err(detail) = validate_inputs(identity) {
            return SourceResult::failed(
                RegistrySource::Propelus,
                ErrorKind::Validation,
                format_api_error(RegistrySource::Propelus, &detail, None),
            );
        }

        let Some(key) = &self.api_key else {
            return SourceResult::failed(
                RegistrySource::Propelus,
                ErrorKind::AuthConfig,
                format_api_error(
                    RegistrySource::Propelus,
                    "API key not configured; set PROPELUS_API_KEY",
                    None,
                ),
            );
        };

        let license = identity.license_number.as_deref().unwrap_or("");
        let payload = json!({
            "first_name": identity.first_name,
            "last_name": identity.last_name,
            "state": identity.state.to_uppercase(),
            "license_number": license,
        });

        debug!(state = %identity.state, "querying Propelus");
        let request = ApiRequest::post(&self.base_url)
            .with_json(payload)
            .with_bearer(key.clone())
            .with_timeout(self.timeout);

        let response = match self.session.execute(request).await {
            Ok(response) => response,
            Err(error) => return transport_failure(RegistrySource::Propelus, &error),
        };

        match response.status {
            401 => {
                return SourceResult::failed(
                    RegistrySource::Propelus,
                    ErrorKind::AuthConfig,
                    format_api_error(
                        RegistrySource::Propelus,
                        "invalid or missing API key",
                        Some(401),
                    ),
                )
            }
            404 => {
                return SourceResult::failed(
                    RegistrySource::Propelus,
                    ErrorKind::NotFound,
                    "License not found in Propelus database".to_string(),
                )
            }
            429 => {
                return SourceResult::failed(
                    RegistrySource::Propelus,
                    ErrorKind::RateLimited,
                    format_api_error(
                        RegistrySource::Propelus,
                        "too many requests, try again later",
                        Some(429),
                    ),
                )
            }
            status if !(200..300).contains(&status) => {
                return SourceResult::failed(
                    RegistrySource::Propelus,
                    ErrorKind::Http,
                    format_api_error(RegistrySource::Propelus, "request failed", Some(status)),
                )
            }
            _ => {}
        }

        let data = match response.json() {
            Ok(data) => data,
            Err(error) => {
                return SourceResult::failed(
                    RegistrySource::Propelus,
                    ErrorKind::Parse,
                    format_api_error(
                        RegistrySource::Propelus,
                        &format!("invalid response body: {error}"),
                        None,
                    ),
                )
            }
        };

        interpret_response(&data)
    }
}

fn validate_inputs(identity: &ProviderIdentity) -> Result<(), String> {
    let license = identity.license_number.as_deref().unwrap_or("");

    if identity.first_name.is_empty()
        || identity.last_name.is_empty()
        || identity.state.is_empty()
        || license.is_empty()
    {
        return Err(
            "first name, last name, state, and license number are all required".to_string(),
        );
    }
    if !states::is_valid(&identity.state) {
        return Err(format!(
            "invalid state code: {}. Use a two-letter jurisdiction code",
            identity.state
        ));
    }
    if identity.first_name.len() < MIN_NAME_LEN || identity.last_name.len() < MIN_NAME_LEN {
        return Err(format!(
            "first and last name must be at least {MIN_NAME_LEN} characters"
        ));
    }
    if license.len() < MIN_LICENSE_LEN {
        return Err(format!(
            "license number must be at least {MIN_LICENSE_LEN} characters"
        ));
    }
    Ok(())
}

fn interpret_response(data: &Value) -> SourceResult {
    let fields = extract_fields(data);

    if data["verified"].as_bool() == Some(true) {
        let status = fields
            .get("status")
            .cloned()
            .unwrap_or_else(|| "Active".to_string());
        return SourceResult::found(
            RegistrySource::Propelus,
            fields,
            format!("Propelus verified the license (status {status})"),
        );
    }

    SourceResult::failed(
        RegistrySource::Propelus,
        ErrorKind::NotVerified,
        "Propelus could not verify the license".to_string(),
    )
    .with_fields(fields)
}

fn extract_fields(data: &Value) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for key in ["status", "board", "issue_date", "expiration_date"] {
        if let Some(value) = data[key].as_str() {
            fields.insert(key.to_string(), value.to_string());
        }
    }

    if let Some(actions) = data["disciplinary_actions"].as_array() {
        fields.insert(
            "disciplinary_actions".to_string(),
            actions.len().to_string(),
        );
        if !actions.is_empty() {
            let detail = actions
                .iter()
                .map(|a| match a.as_str() {
                    Some(s) => s.to_string(),
                    None => a.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            fields.insert("disciplinary_detail".to_string(), detail);
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::FakeTransport;

    fn make_client(transport: &Arc<FakeTransport>, api_key: Option<&str>) -> PropelusClient {
        PropelusClient::new(
            transport.clone(),
            "https://api.propelus.com/v1/license/verify",
            api_key.map(String::from),
            DEFAULT_PROPELUS_TIMEOUT,
            RetryPolicy::default(),
        )
    }

    fn make_identity() -> ProviderIdentity {
        ProviderIdentity::new("Jane Smith", "NY").with_license_number("RX12345")
    }

    fn verified_body() -> Value {
        json!({
            "verified": true,
            "status": "Active",
            "board": "New York Board of Pharmacy",
            "issue_date": "2015-03-12",
            "expiration_date": "2027-06-30",
            "disciplinary_actions": [],
        })
    }

    #[tokio::test]
    async fn missing_inputs_fail_without_network() {
        let transport = Arc::new(FakeTransport::new());
        let client = make_client(&transport, Some("key"));

        let result = client.verify(&ProviderIdentity::new("Jane Smith", "NY")).await;

        assert_eq!(result.error, Some(ErrorKind::Validation));
        assert!(result.raw_message.contains("required"));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn invalid_state_fails_without_network() {
        let transport = Arc::new(FakeTransport::new());
        let client = make_client(&transport, Some("key"));

        let identity = ProviderIdentity::new("Jane Smith", "XX").with_license_number("RX12345");
        let result = client.verify(&identity).await;

        assert_eq!(result.error, Some(ErrorKind::Validation));
        assert!(result.raw_message.contains("invalid state code"));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn single_letter_name_fails_without_network() {
        let transport = Arc::new(FakeTransport::new());
        let client = make_client(&transport, Some("key"));

        let identity = ProviderIdentity::new("J Smith", "NY").with_license_number("RX12345");
        let result = client.verify(&identity).await;

        assert_eq!(result.error, Some(ErrorKind::Validation));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn short_license_fails_without_network() {
        let transport = Arc::new(FakeTransport::new());
        let client = make_client(&transport, Some("key"));

        let identity = ProviderIdentity::new("Jane Smith", "NY").with_license_number("RX");
        let result = client.verify(&identity).await;

        assert_eq!(result.error, Some(ErrorKind::Validation));
        assert!(result.raw_message.contains("at least 3 characters"));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_network() {
        let transport = Arc::new(FakeTransport::new());
        let client = make_client(&transport, None);

        let result = client.verify(&make_identity()).await;

        assert_eq!(result.error, Some(ErrorKind::AuthConfig));
        assert!(result.raw_message.contains("PROPELUS_API_KEY"));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn payload_is_snake_case_with_bearer() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_json(200, &verified_body());
        let client = make_client(&transport, Some("prop-key"));

        client.verify(&make_identity()).await;

        let requests = transport.requests();
        let body = requests[0].json_body.as_ref().unwrap();
        assert_eq!(body["first_name"], "Jane");
        assert_eq!(body["last_name"], "Smith");
        assert_eq!(body["state"], "NY");
        assert_eq!(body["license_number"], "RX12345");
        assert_eq!(requests[0].bearer.as_deref(), Some("prop-key"));
    }

    #[tokio::test]
    async fn verified_response_extracts_license_fields() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_json(200, &verified_body());
        let client = make_client(&transport, Some("key"));

        let result = client.verify(&make_identity()).await;

        assert!(result.verified);
        assert_eq!(result.field("status"), Some("Active"));
        assert_eq!(result.field("board"), Some("New York Board of Pharmacy"));
        assert_eq!(result.field("expiration_date"), Some("2027-06-30"));
        assert_eq!(result.field("disciplinary_actions"), Some("0"));
    }

    #[tokio::test]
    async fn disciplinary_actions_are_counted_and_listed() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_json(
            200,
            &json!({
                "verified": true,
                "status": "Probation",
                "disciplinary_actions": ["2021 suspension", "2023 fine"],
            }),
        );
        let client = make_client(&transport, Some("key"));

        let result = client.verify(&make_identity()).await;

        assert_eq!(result.field("disciplinary_actions"), Some("2"));
        assert_eq!(
            result.field("disciplinary_detail"),
            Some("2021 suspension; 2023 fine")
        );
    }

    #[tokio::test]
    async fn unverified_response_keeps_fields() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_json(200, &json!({ "verified": false, "status": "Expired" }));
        let client = make_client(&transport, Some("key"));

        let result = client.verify(&make_identity()).await;

        assert!(!result.verified);
        assert_eq!(result.error, Some(ErrorKind::NotVerified));
        assert_eq!(result.field("status"), Some("Expired"));
    }

    #[tokio::test]
    async fn unauthorized_and_rate_limited_statuses() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_response(401, "no");
        let client = make_client(&transport, Some("key"));
        let result = client.verify(&make_identity()).await;
        assert_eq!(result.error, Some(ErrorKind::AuthConfig));

        let transport = Arc::new(FakeTransport::new());
        transport.push_response(429, "slow down");
        let client = make_client(&transport, Some("key"));
        let result = client.verify(&make_identity()).await;
        assert_eq!(result.error, Some(ErrorKind::RateLimited));
        assert_eq!(
            result.raw_message,
            "ERROR: Propelus API returned HTTP 429: too many requests, try again later"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried_before_succeeding() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_response(503, "busy");
        transport.push_response(503, "busy");
        transport.push_json(200, &verified_body());
        let client = make_client(&transport, Some("key"));

        let result = client.verify(&make_identity()).await;

        assert!(result.verified);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_final_status() {
        let transport = Arc::new(FakeTransport::new());
        for _ in 0..3 {
            transport.push_response(503, "busy");
        }
        let client = make_client(&transport, Some("key"));

        let result = client.verify(&make_identity()).await;

        assert_eq!(result.error, Some(ErrorKind::Http));
        assert_eq!(
            result.raw_message,
            "ERROR: Propelus API returned HTTP 503: request failed"
        );
        assert_eq!(transport.request_count(), 3);
    }
}
