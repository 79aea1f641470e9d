use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::{format_api_error, transport_failure, ErrorKind, RegistrySource, SourceResult};
use crate::identity::ProviderIdentity;
use crate::network::{ApiRequest, HttpSession, Transport};

/// NPPES API protocol version pinned by the upstream service.
const API_VERSION: &str = "2.1";
/// Cap on matches for name searches.
const SEARCH_LIMIT: &str = "5";
/// `basic.status` value for an active record.
const ACTIVE_STATUS: &str = "A";

pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(20);
/// Existence checks (web quick-validate, `mdv lookup`, bulk rows) get a
/// tighter budget.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// A well-formed NPI is exactly ten ASCII digits.
pub fn is_valid_npi_format(npi: &str) -> bool {
    npi.len() == 10 && npi.bytes().all(|b| b.is_ascii_digit())
}

/// How to ask the registry about a provider.
#[derive(Debug, Clone)]
pub enum NpiQuery {
    Number(String),
    Name {
        first: String,
        last: String,
        state: String,
    },
}

impl NpiQuery {
    pub fn for_identity(identity: &ProviderIdentity) -> Self {
        Self::Name {
            first: identity.first_name.clone(),
            last: identity.last_name.clone(),
            state: identity.state.clone(),
        }
    }
}

/// Client for the public NPI registry (NPPES).
pub struct NpiClient {
    session: HttpSession,
    base_url: String,
}

impl NpiClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            session: HttpSession::new(transport),
            base_url: base_url.into(),
        }
    }

    /// Full search used by the pipeline. Never fails outward: every
    /// failure becomes a `SourceResult` carrying an `ErrorKind`.
    pub async fn verify(&self, query: &NpiQuery) -> SourceResult {
        self.run(query, SEARCH_TIMEOUT).await
    }

    /// Quick existence check for a single NPI number.
    pub async fn quick_check(&self, npi: &str) -> SourceResult {
        self.run(&NpiQuery::Number(npi.to_string()), LOOKUP_TIMEOUT)
            .await
    }

    async fn run(&self, query: &NpiQuery, timeout: Duration) -> SourceResult {
        if let NpiQuery::Number(npi) = query {
            if !is_valid_npi_format(npi) {
                return SourceResult::failed(
                    RegistrySource::Npi,
                    ErrorKind::Validation,
                    format!("Invalid NPI format: {npi}. An NPI is exactly 10 digits."),
                );
            }
        }

        debug!(query = ?query, "querying NPI registry");
        let response = match self.session.execute(self.build_request(query, timeout)).await {
            Ok(response) => response,
            Err(error) => return transport_failure(RegistrySource::Npi, &error),
        };

        if !response.is_success() {
            return SourceResult::failed(
                RegistrySource::Npi,
                ErrorKind::Http,
                format_api_error(RegistrySource::Npi, "request failed", Some(response.status)),
            );
        }

        let data = match response.json() {
            Ok(data) => data,
            Err(error) => {
                return SourceResult::failed(
                    RegistrySource::Npi,
                    ErrorKind::Parse,
                    format_api_error(
                        RegistrySource::Npi,
                        &format!("invalid response body: {error}"),
                        None,
                    ),
                )
            }
        };

        interpret_response(&data, query)
    }

    fn build_request(&self, query: &NpiQuery, timeout: Duration) -> ApiRequest {
        let request = ApiRequest::get(&self.base_url)
            .with_query("version", API_VERSION)
            .with_timeout(timeout);

        match query {
            NpiQuery::Number(npi) => request.with_query("number", npi),
            NpiQuery::Name { first, last, state } => request
                .with_query("first_name", first)
                .with_query("last_name", last)
                .with_query("state", state)
                .with_query("limit", SEARCH_LIMIT),
        }
    }
}

fn interpret_response(data: &Value, query: &NpiQuery) -> SourceResult {
    let count = data["result_count"].as_u64().unwrap_or(0);
    if count == 0 {
        let detail = match query {
            NpiQuery::Number(npi) => format!("No provider found in NPI Registry for NPI {npi}"),
            NpiQuery::Name { first, last, state } => {
                format!("No provider found in NPI Registry for {first} {last} in {state}")
            }
        };
        return SourceResult::failed(RegistrySource::Npi, ErrorKind::NotFound, detail);
    }

    let Some(results) = data["results"].as_array().filter(|r| !r.is_empty()) else {
        return SourceResult::failed(
            RegistrySource::Npi,
            ErrorKind::Parse,
            format_api_error(
                RegistrySource::Npi,
                "result_count was non-zero but no results were returned",
                None,
            ),
        );
    };

    let first = &results[0];
    let fields = extract_fields(first, count);
    let raw_message = format_matches(results, count);

    if let Some(status) = first["basic"]["status"].as_str() {
        if status != ACTIVE_STATUS {
            return SourceResult::failed(
                RegistrySource::Npi,
                ErrorKind::NotVerified,
                format!("Provider NPI is inactive (status {status})"),
            )
            .with_fields(fields);
        }
    }

    SourceResult::found(RegistrySource::Npi, fields, raw_message)
}

fn extract_fields(result: &Value, matches: u64) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    if let Some(npi) = number_field(result) {
        fields.insert("npi".to_string(), npi);
    }
    fields.insert("name".to_string(), display_name(result));
    if let Some(status) = result["basic"]["status"].as_str() {
        fields.insert("status".to_string(), status.to_string());
    }
    if let Some(specialty) = result["taxonomies"][0]["desc"].as_str() {
        fields.insert("specialty".to_string(), specialty.to_string());
    }
    if let Some(address) = preferred_address(result) {
        fields.insert("address".to_string(), address);
    }
    fields.insert("matches".to_string(), matches.to_string());

    fields
}

/// NPPES serializes the NPI as a JSON number on some endpoints and a
/// string on others.
fn number_field(result: &Value) -> Option<String> {
    match &result["number"] {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn display_name(result: &Value) -> String {
    let basic = &result["basic"];
    let first = basic["first_name"].as_str().unwrap_or("");
    let last = basic["last_name"].as_str().unwrap_or("");
    let full = format!("{first} {last}").trim().to_string();
    if full.is_empty() {
        basic["organization_name"]
            .as_str()
            .unwrap_or("Unknown")
            .to_string()
    } else {
        full
    }
}

/// The PRIMARY practice address when present, otherwise the first listed.
fn preferred_address(result: &Value) -> Option<String> {
    let addresses = result["addresses"].as_array()?;
    let chosen = addresses
        .iter()
        .find(|a| a["address_purpose"].as_str() == Some("PRIMARY"))
        .or_else(|| addresses.first())?;

    let line = chosen["address_1"].as_str().unwrap_or("");
    let city = chosen["city"].as_str().unwrap_or("");
    let state = chosen["state"].as_str().unwrap_or("");
    let postal = chosen["postal_code"].as_str().unwrap_or("");
    Some(format!("{line}, {city}, {state} {postal}").trim().to_string())
}

fn format_matches(results: &[Value], count: u64) -> String {
    let mut message = format!("Found {count} provider(s) in NPI Registry:\n");
    for result in results {
        let npi = number_field(result).unwrap_or_else(|| "unknown".to_string());
        let name = display_name(result);
        let specialty = result["taxonomies"][0]["desc"].as_str().unwrap_or("N/A");
        let address = preferred_address(result).unwrap_or_else(|| "N/A".to_string());
        let status = result["basic"]["status"].as_str().unwrap_or("N/A");
        let _ = writeln!(
            message,
            "- NPI {npi}: {name} | {specialty} | {address} | status {status}"
        );
    }
    message.trim_end().to_string()
}
