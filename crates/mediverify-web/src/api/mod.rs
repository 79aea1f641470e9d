mod bulk;
mod validate;

#[cfg(test)]
pub(crate) mod testing;

use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

/// Routes mounted under `/api`.
pub fn router() -> Router<AppState> {
    Router::new().merge(bulk::router()).merge(validate::router())
}

/// Liveness probe, mounted at the root.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
