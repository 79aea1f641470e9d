//! Markdown report rendering and file output.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::pipeline::{RunContext, Stage};

pub const DEFAULT_REPORT_FILE_NAME: &str = "provider_validation_report.md";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("could not create reports directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ReportResult<T> = Result<T, ReportError>;

/// One rendered registry section.
#[derive(Debug, Clone)]
pub struct SourceSection {
    pub heading: String,
    pub verified: bool,
    pub fields: BTreeMap<String, String>,
    pub detail: String,
}

/// The final artifact of a verification run, rendered to Markdown.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub provider_name: String,
    pub state: String,
    pub license_number: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub executive_summary: String,
    pub sources: Vec<SourceSection>,
    pub data_quality: String,
    pub qa_verdict: String,
    pub qa_narrative: String,
    pub recommendation: String,
}

impl ValidationReport {
    /// Assembles the report from an accumulated run context and the
    /// executive summary produced for the reporting stage.
    pub fn from_context(context: &RunContext, executive_summary: &str) -> Self {
        let sources = context
            .source_results()
            .iter()
            .map(|result| SourceSection {
                heading: result.source.api_name().to_string(),
                verified: result.verified,
                fields: result.fields.clone(),
                detail: result.raw_message.clone(),
            })
            .collect();

        let data_quality = context
            .stage(Stage::Enriching)
            .map_or_else(
                || "No data quality notes were recorded.".to_string(),
                |s| s.text.clone(),
            );

        let qa = context.stage(Stage::QaReviewing);
        let qa_verdict = qa
            .and_then(|s| s.field("verdict"))
            .unwrap_or("Not assessed")
            .to_string();
        let qa_narrative = qa.map_or(String::new(), |s| s.text.clone());
        let recommendation = qa
            .and_then(|s| s.field("recommendation"))
            .unwrap_or("No recommendation was recorded.")
            .to_string();

        Self {
            provider_name: context.identity.provider_name.clone(),
            state: context.identity.state.clone(),
            license_number: context.identity.license_number.clone(),
            generated_at: context.started_at,
            executive_summary: executive_summary.to_string(),
            sources,
            data_quality,
            qa_verdict,
            qa_narrative,
            recommendation,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        out.push_str("# Provider Validation Report\n\n");
        out.push_str(&format!(
            "Generated: {} UTC\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));

        out.push_str("## Executive Summary\n\n");
        out.push_str(self.executive_summary.trim());
        out.push_str("\n\n");

        out.push_str("## Provider Information\n\n");
        out.push_str(&format!("- **Name:** {}\n", self.provider_name));
        out.push_str(&format!("- **State:** {}\n", self.state));
        out.push_str(&format!(
            "- **License Number:** {}\n\n",
            self.license_number.as_deref().unwrap_or("not provided")
        ));

        out.push_str("## Verification Results\n\n");
        for section in &self.sources {
            out.push_str(&format!("### {}\n\n", section.heading));
            out.push_str(&format!(
                "- **Verified:** {}\n",
                if section.verified { "yes" } else { "no" }
            ));
            for (name, value) in &section.fields {
                out.push_str(&format!("- **{name}:** {value}\n"));
            }
            out.push('\n');
            out.push_str(section.detail.trim());
            out.push_str("\n\n");
        }

        out.push_str("## Data Quality Assessment\n\n");
        out.push_str(self.data_quality.trim());
        out.push_str("\n\n");

        out.push_str("## QA Review\n\n");
        out.push_str(&format!("**Verdict:** {}\n\n", self.qa_verdict));
        if !self.qa_narrative.trim().is_empty() {
            out.push_str(self.qa_narrative.trim());
            out.push_str("\n\n");
        }

        out.push_str("## Recommendations\n\n");
        out.push_str(self.recommendation.trim());
        out.push('\n');

        out
    }
}

/// Writes rendered reports under a configured directory.
#[derive(Debug, Clone)]
pub struct ReportEmitter {
    reports_dir: PathBuf,
    file_name: String,
}

impl ReportEmitter {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            file_name: DEFAULT_REPORT_FILE_NAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Unique per-run file name so concurrent runs do not clobber each
    /// other's output.
    #[must_use]
    pub fn with_unique_file_name(mut self) -> Self {
        self.file_name = format!("provider_validation_report_{}.md", Uuid::new_v4());
        self
    }

    pub fn path(&self) -> PathBuf {
        self.reports_dir.join(&self.file_name)
    }

    pub fn write(&self, markdown: &str) -> ReportResult<PathBuf> {
        fs::create_dir_all(&self.reports_dir).map_err(|source| ReportError::CreateDir {
            path: self.reports_dir.clone(),
            source,
        })?;
        let path = self.path();
        fs::write(&path, markdown).map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ProviderIdentity;
    use crate::pipeline::StageOutput;
    use crate::registry::{ErrorKind, RegistrySource, SourceResult};

    fn make_context() -> RunContext {
        let identity = ProviderIdentity::new("Jane Smith", "NY").with_license_number("RX12345");
        let mut context = RunContext::new(identity);

        let mut npi_fields = BTreeMap::new();
        npi_fields.insert("npi".to_string(), "1234567890".to_string());
        npi_fields.insert("specialty".to_string(), "Pharmacist".to_string());
        context.push_source(SourceResult::found(
            RegistrySource::Npi,
            npi_fields,
            "Found 1 provider(s) in NPI Registry",
        ));
        context.push_source(SourceResult::failed(
            RegistrySource::Propelus,
            ErrorKind::NotVerified,
            "Propelus could not verify the license",
        ));

        context.push_stage(StageOutput::completed(
            Stage::Validating,
            "NPI Registry: found",
        ));
        context.push_stage(StageOutput::completed(
            Stage::Enriching,
            "All required fields are present.",
        ));
        let mut qa_fields = BTreeMap::new();
        qa_fields.insert("verdict".to_string(), "Pass".to_string());
        qa_fields.insert(
            "recommendation".to_string(),
            "Approve: all credential checks passed.".to_string(),
        );
        context.push_stage(
            StageOutput::completed(Stage::QaReviewing, "No compliance issues found.")
                .with_fields(qa_fields),
        );

        context
    }

    #[test]
    fn report_renders_every_section() {
        let context = make_context();
        let report = ValidationReport::from_context(&context, "Provider verified.");
        let markdown = report.to_markdown();

        assert!(markdown.starts_with("# Provider Validation Report"));
        for heading in [
            "## Executive Summary",
            "## Provider Information",
            "## Verification Results",
            "## Data Quality Assessment",
            "## QA Review",
            "## Recommendations",
        ] {
            assert!(markdown.contains(heading), "missing {heading}");
        }

        assert!(markdown.contains("- **Name:** Jane Smith"));
        assert!(markdown.contains("- **License Number:** RX12345"));
        assert!(markdown.contains("### NPI Registry"));
        assert!(markdown.contains("- **Verified:** yes"));
        assert!(markdown.contains("- **specialty:** Pharmacist"));
        assert!(markdown.contains("### Propelus"));
        assert!(markdown.contains("- **Verified:** no"));
        assert!(markdown.contains("**Verdict:** Pass"));
        assert!(markdown.contains("Approve: all credential checks passed."));
    }

    #[test]
    fn missing_stages_fall_back_to_placeholders() {
        let identity = ProviderIdentity::new("John Doe", "CA");
        let context = RunContext::new(identity);
        let report = ValidationReport::from_context(&context, "Nothing to report.");
        let markdown = report.to_markdown();

        assert!(markdown.contains("- **License Number:** not provided"));
        assert!(markdown.contains("No data quality notes were recorded."));
        assert!(markdown.contains("**Verdict:** Not assessed"));
        assert!(markdown.contains("No recommendation was recorded."));
    }

    #[test]
    fn emitter_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = ReportEmitter::new(dir.path().join("reports"));

        let path = emitter.write("# Provider Validation Report\n").unwrap();
        assert!(path.ends_with(DEFAULT_REPORT_FILE_NAME));
        let written = fs::read_to_string(path).unwrap();
        assert!(written.starts_with("# Provider Validation Report"));
    }

    #[test]
    fn emitter_surfaces_unwritable_directories() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let emitter = ReportEmitter::new(blocker.join("reports"));
        let error = emitter.write("content").unwrap_err();
        assert!(matches!(error, ReportError::CreateDir { .. }));
    }

    #[test]
    fn unique_file_names_do_not_collide() {
        let a = ReportEmitter::new("reports").with_unique_file_name();
        let b = ReportEmitter::new("reports").with_unique_file_name();

        assert_ne!(a.path(), b.path());
        for emitter in [a, b] {
            let name = emitter.path().file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("provider_validation_report_"));
            assert!(name.ends_with(".md"));
        }
    }
}
