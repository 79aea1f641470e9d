use std::collections::HashMap;
use std::sync::Arc;

use mediverify_core::{AppConfig, ReqwestTransport, Transport};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Unique identifier for a stored bulk check
pub type BulkSessionId = Uuid;

/// One checked row of a bulk upload.
#[derive(Debug, Clone, Serialize)]
pub struct BulkRow {
    pub npi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub valid: bool,
    pub detail: String,
}

/// A finished bulk check, held in memory so its report can be downloaded.
pub struct BulkReport {
    pub rows: Vec<BulkRow>,
}

impl BulkReport {
    pub fn new(rows: Vec<BulkRow>) -> Self {
        Self { rows }
    }

    pub fn valid_count(&self) -> usize {
        self.rows.iter().filter(|row| row.valid).count()
    }

    /// Renders the stored rows as the downloadable results CSV.
    pub fn to_csv(&self) -> anyhow::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["npi", "name", "valid", "detail"])?;
        for row in &self.rows {
            writer.write_record([
                row.npi.as_str(),
                row.name.as_deref().unwrap_or(""),
                if row.valid { "true" } else { "false" },
                row.detail.as_str(),
            ])?;
        }
        Ok(String::from_utf8(writer.into_inner()?)?)
    }
}

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub transport: Arc<dyn Transport>,
    pub bulk_store: Arc<RwLock<HashMap<BulkSessionId, BulkReport>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: AppConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            bulk_store: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(npi: &str, name: Option<&str>, valid: bool, detail: &str) -> BulkRow {
        BulkRow {
            npi: npi.to_string(),
            name: name.map(String::from),
            valid,
            detail: detail.to_string(),
        }
    }

    #[test]
    fn report_renders_header_and_rows() {
        let report = BulkReport::new(vec![
            make_row("1234567893", Some("Jane Smith"), true, "Jane Smith"),
            make_row(
                "123",
                None,
                false,
                "Invalid NPI format: 123. An NPI is exactly 10 digits.",
            ),
        ]);

        let csv = report.to_csv().unwrap();
        assert!(csv.starts_with("npi,name,valid,detail\n"));
        assert!(csv.contains("1234567893,Jane Smith,true,Jane Smith"));
        assert!(csv.contains("123,,false,Invalid NPI format"));
        assert_eq!(report.valid_count(), 1);
    }
}
