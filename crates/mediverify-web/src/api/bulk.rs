use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use mediverify_core::{NpiClient, SourceResult};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::state::{AppState, BulkReport, BulkRow};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bulk", post(upload_bulk))
        .route("/bulk/{session}/report", get(download_report))
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub session: Uuid,
    pub rows: Vec<BulkRow>,
}

/// Accepts CSV text (`npi[,name]` per row), runs the NPI quick check per
/// row, and stores the results under a fresh session id.
async fn upload_bulk(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<BulkResponse>, (StatusCode, String)> {
    let rows = parse_rows(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    if rows.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "no rows found in the uploaded CSV".to_string(),
        ));
    }

    let client = NpiClient::new(Arc::clone(&state.transport), &state.config.npi_api_url);
    let mut checked = Vec::with_capacity(rows.len());
    for (npi, name) in rows {
        let result = client.quick_check(&npi).await;
        checked.push(BulkRow {
            npi,
            name,
            valid: result.verified,
            detail: detail(&result).to_string(),
        });
    }

    let session = Uuid::new_v4();
    let report = BulkReport::new(checked);
    info!(%session, rows = report.rows.len(), valid = report.valid_count(), "stored bulk check");

    let rows = report.rows.clone();
    state.bulk_store.write().await.insert(session, report);
    Ok(Json(BulkResponse { session, rows }))
}

/// Serves a stored bulk check as a CSV attachment.
async fn download_report(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let store = state.bulk_store.read().await;
    let report = store
        .get(&session)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown bulk session {session}")))?;

    let csv = report
        .to_csv()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"bulk_check_results.csv\"",
            ),
        ],
        csv,
    ))
}

fn detail(result: &SourceResult) -> &str {
    if result.verified {
        result.field("name").unwrap_or("registered")
    } else {
        result.raw_message.lines().next().unwrap_or("")
    }
}

fn parse_rows(body: &str) -> csv::Result<Vec<(String, Option<String>)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(npi) = record.get(0).filter(|field| !field.is_empty()) else {
            continue;
        };
        if npi.eq_ignore_ascii_case("npi") {
            continue; // header row
        }
        rows.push((
            npi.to_string(),
            record
                .get(1)
                .filter(|name| !name.is_empty())
                .map(String::from),
        ));
    }
    Ok(rows)
}
