use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ProviderIdentity;
use crate::registry::{RegistrySource, SourceResult};

/// Exact marker stages pass through when no registry locates the provider.
/// Downstream consumers key off this literal, so it must never change.
pub const NOT_FOUND_SENTINEL: &str = "NO_USER_FOUND";

/// Fixed notice recorded when license verification is skipped for lack of
/// a usable license number. Emitted verbatim.
pub const PROPELUS_SKIP_NOTICE: &str =
    "Propelus verification skipped: No valid license number available.";

/// The four working stages plus the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Enriching,
    QaReviewing,
    Reporting,
    Done,
    NotFound,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Enriching => "enriching",
            Self::QaReviewing => "qa_reviewing",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::NotFound => "not_found",
        }
    }

    /// Heading used for the stage in transcripts and the report.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Validating => "Validation",
            Self::Enriching => "Enrichment",
            Self::QaReviewing => "QA Review",
            Self::Reporting => "Reporting",
            Self::Done => "Done",
            Self::NotFound => "Not Found",
        }
    }

    /// Forward-only transition. Terminal states have no successor.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Validating => Some(Self::Enriching),
            Self::Enriching => Some(Self::QaReviewing),
            Self::QaReviewing => Some(Self::Reporting),
            Self::Reporting | Self::Done | Self::NotFound => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::NotFound)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    NotFound,
}

/// What one stage produced: a status flag, structured fields, and the
/// stage narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    pub text: String,
}

impl StageOutput {
    pub fn completed(stage: Stage, text: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            fields: BTreeMap::new(),
            text: text.into(),
        }
    }

    /// A pass-through output carrying the sentinel unchanged.
    pub fn not_found(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::NotFound,
            fields: BTreeMap::new(),
            text: NOT_FOUND_SENTINEL.to_string(),
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StageStatus::NotFound
    }
}

/// Accumulated evidence for one verification run.
///
/// Stage outputs are append-only. Earlier entries are never rewritten;
/// later stages read them and add their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub identity: ProviderIdentity,
    pub started_at: DateTime<Utc>,
    source_results: Vec<SourceResult>,
    stages: Vec<StageOutput>,
}

impl RunContext {
    pub fn new(identity: ProviderIdentity) -> Self {
        Self {
            identity,
            started_at: Utc::now(),
            source_results: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn push_source(&mut self, result: SourceResult) {
        self.source_results.push(result);
    }

    pub fn source_results(&self) -> &[SourceResult] {
        &self.source_results
    }

    pub fn source(&self, source: RegistrySource) -> Option<&SourceResult> {
        self.source_results.iter().find(|r| r.source == source)
    }

    pub fn push_stage(&mut self, output: StageOutput) {
        self.stages.push(output);
    }

    pub fn stages(&self) -> &[StageOutput] {
        &self.stages
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// True once any stage has emitted the sentinel.
    pub fn is_not_found_run(&self) -> bool {
        self.stages.iter().any(StageOutput::is_not_found)
    }

    /// Joined stage narratives, oldest first. This is the context handed
    /// to the summarizer for later stages.
    pub fn transcript(&self) -> String {
        self.stages
            .iter()
            .map(|s| format!("### {}\n{}", s.stage.title(), s.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NotFound,
    Interrupted,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The envelope every surface returns for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl RunOutcome {
    pub fn success(report_path: Option<PathBuf>, raw_result: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            report_path,
            raw_result: Some(raw_result.into()),
            error: None,
            error_type: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: RunStatus::NotFound,
            report_path: None,
            raw_result: Some(NOT_FOUND_SENTINEL.to_string()),
            error: None,
            error_type: None,
        }
    }

    pub fn interrupted(before: Stage) -> Self {
        Self {
            status: RunStatus::Interrupted,
            report_path: None,
            raw_result: None,
            error: Some(format!("run interrupted before the {before} stage")),
            error_type: None,
        }
    }

    pub fn error(error: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            report_path: None,
            raw_result: None,
            error: Some(error.into()),
            error_type: Some(error_type.into()),
        }
    }

    /// Attach a non-fatal problem (e.g. the report could not be written)
    /// without downgrading the run status.
    #[must_use]
    pub fn with_warning(mut self, error: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.error_type = Some(error_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ErrorKind;

    fn make_identity() -> ProviderIdentity {
        ProviderIdentity::new("Jane Smith", "NY").with_license_number("RX12345")
    }

    #[test]
    fn stages_advance_strictly_forward() {
        assert_eq!(Stage::Validating.next(), Some(Stage::Enriching));
        assert_eq!(Stage::Enriching.next(), Some(Stage::QaReviewing));
        assert_eq!(Stage::QaReviewing.next(), Some(Stage::Reporting));
        assert_eq!(Stage::Reporting.next(), None);
        assert_eq!(Stage::Done.next(), None);
        assert_eq!(Stage::NotFound.next(), None);
    }

    #[test]
    fn only_end_states_are_terminal() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::NotFound.is_terminal());
        assert!(!Stage::Validating.is_terminal());
        assert!(!Stage::Reporting.is_terminal());
    }

    #[test]
    fn sentinel_literal_is_fixed() {
        assert_eq!(NOT_FOUND_SENTINEL, "NO_USER_FOUND");
        assert_eq!(
            PROPELUS_SKIP_NOTICE,
            "Propelus verification skipped: No valid license number available."
        );
    }

    #[test]
    fn not_found_output_carries_the_sentinel_verbatim() {
        let output = StageOutput::not_found(Stage::Enriching);
        assert!(output.is_not_found());
        assert_eq!(output.text, NOT_FOUND_SENTINEL);
    }

    #[test]
    fn context_accumulates_stages_in_order() {
        let mut context = RunContext::new(make_identity());
        context.push_stage(StageOutput::completed(Stage::Validating, "checked"));
        context.push_stage(StageOutput::completed(Stage::Enriching, "enriched"));

        let stages: Vec<Stage> = context.stages().iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec![Stage::Validating, Stage::Enriching]);
        assert!(context.stage(Stage::Validating).is_some());
        assert!(context.stage(Stage::Reporting).is_none());
    }

    #[test]
    fn context_finds_source_results_by_registry() {
        let mut context = RunContext::new(make_identity());
        context.push_source(SourceResult::failed(
            RegistrySource::Npi,
            ErrorKind::NotFound,
            "nothing",
        ));

        assert!(context.source(RegistrySource::Npi).is_some());
        assert!(context.source(RegistrySource::Nabp).is_none());
    }

    #[test]
    fn not_found_run_detected_from_any_stage() {
        let mut context = RunContext::new(make_identity());
        assert!(!context.is_not_found_run());
        context.push_stage(StageOutput::not_found(Stage::Validating));
        assert!(context.is_not_found_run());
    }

    #[test]
    fn transcript_joins_stage_narratives() {
        let mut context = RunContext::new(make_identity());
        context.push_stage(StageOutput::completed(Stage::Validating, "two sources"));
        context.push_stage(StageOutput::completed(Stage::Enriching, "no gaps"));

        let transcript = context.transcript();
        assert!(transcript.contains("### Validation\ntwo sources"));
        assert!(transcript.contains("### Enrichment\nno gaps"));
    }

    #[test]
    fn outcome_statuses_serialize_snake_case() {
        let outcome = RunOutcome::not_found();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["raw_result"], NOT_FOUND_SENTINEL);
        assert!(json.get("report_path").is_none());
    }

    #[test]
    fn warning_does_not_downgrade_success() {
        let outcome = RunOutcome::success(None, "report body")
            .with_warning("could not write report", "report_write");
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.error_type.as_deref(), Some("report_write"));
    }
}
