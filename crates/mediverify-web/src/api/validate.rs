use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use mediverify_core::{
    states, ErrorKind, NpiClient, ProviderIdentity, ReportEmitter, RunOutcome, RunStatus,
    ValidationPipeline,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/validate", post(check_npi))
        .route("/validate_provider", post(validate_provider))
}

#[derive(Debug, Deserialize)]
pub struct NpiCheckRequest {
    pub npi: String,
}

#[derive(Debug, Serialize)]
pub struct NpiCheckResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateProviderRequest {
    pub provider_name: String,
    pub state: String,
    #[serde(default)]
    pub license_number: Option<String>,
}

/// Quick NPPES existence check for a single NPI number.
async fn check_npi(
    State(state): State<AppState>,
    Json(req): Json<NpiCheckRequest>,
) -> Result<Json<NpiCheckResponse>, (StatusCode, String)> {
    let npi = req.npi.trim();
    let client = NpiClient::new(Arc::clone(&state.transport), &state.config.npi_api_url);

    let result = client.quick_check(npi).await;
    if result.error == Some(ErrorKind::Validation) {
        return Err((StatusCode::BAD_REQUEST, result.raw_message));
    }

    let detail = result
        .raw_message
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    Ok(Json(NpiCheckResponse {
        valid: result.verified,
        provider: result.field("name").map(String::from),
        detail,
    }))
}

/// Full pipeline run. Not-found is a distinct but non-error outcome, so it
/// ships with 200; only `error` maps to 500. The envelope rides along in
/// both cases.
async fn validate_provider(
    State(state): State<AppState>,
    Json(req): Json<ValidateProviderRequest>,
) -> Result<(StatusCode, Json<RunOutcome>), (StatusCode, String)> {
    let name = req.provider_name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "provider_name is required".to_string(),
        ));
    }
    let Some(jurisdiction) = states::normalize(&req.state) else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("invalid state code: {}", req.state),
        ));
    };

    let mut identity = ProviderIdentity::new(name, jurisdiction);
    if let Some(license) = req.license_number {
        identity = identity.with_license_number(license);
    }

    // Per-run file names keep concurrent runs from clobbering each other.
    let emitter = ReportEmitter::new(&state.config.reports_dir).with_unique_file_name();
    let pipeline =
        ValidationPipeline::new(&state.config, Arc::clone(&state.transport)).with_emitter(emitter);

    info!(provider = %identity.provider_name, state = %identity.state, "starting validation run");
    let outcome = pipeline.run(identity).await;

    let code = match outcome.status {
        RunStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    Ok((code, Json(outcome)))
}
