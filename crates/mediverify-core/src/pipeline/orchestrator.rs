use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::context::{RunContext, RunOutcome, Stage, StageOutput, PROPELUS_SKIP_NOTICE};
use crate::config::AppConfig;
use crate::identity::ProviderIdentity;
use crate::network::Transport;
use crate::registry::{
    ErrorKind, NabpClient, NpiClient, NpiQuery, PropelusClient, RegistrySource, SourceResult,
};
use crate::report::{ReportEmitter, ValidationReport};
use crate::summarize::{Summarizer, SummaryRequest};

/// Taxonomy fragment that marks a provider as a pharmacist. NABP only
/// holds pharmacist credentials.
const PHARMACIST_MARKER: &str = "pharmac";

/// Jaro-Winkler score below which the submitted and registered names
/// count as a discrepancy.
const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Licenses expiring within this many days raise a concern.
const EXPIRY_WARN_DAYS: i64 = 90;

const NABP_SKIP_NOTICE: &str =
    "NABP check skipped: provider role does not indicate a pharmacist.";

const ENRICH_INSTRUCTIONS: &str = "Assess the completeness and consistency of the registry \
     evidence. Note missing fields, disagreements between sources, and licenses at or near \
     expiration.";
const QA_INSTRUCTIONS: &str = "Review the compliance checklist results and concerns. Call out \
     anything that needs follow-up before credentialing.";
const REPORT_INSTRUCTIONS: &str = "Write a short executive summary of this provider \
     verification run for a credentialing analyst.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("run interrupted before the {0} stage")]
    Interrupted(Stage),

    #[error(transparent)]
    Summary(#[from] crate::summarize::SummaryError),
}

impl PipelineError {
    fn error_type(&self) -> &'static str {
        match self {
            Self::Interrupted(_) => "interrupted",
            Self::Summary(_) => "summarizer",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Cooperative cancellation flag, shared with signal handlers. The
/// pipeline checks it between stages and stops cleanly.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of the compliance review stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaVerdict {
    Pass,
    PassWithConcerns,
    Fail,
}

impl QaVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::PassWithConcerns => "Pass with concerns",
            Self::Fail => "Fail",
        }
    }
}

impl fmt::Display for QaVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Drives a verification run through its four stages, collecting registry
/// evidence on the way and folding every failure into the outcome
/// envelope. `run` never returns an error.
pub struct ValidationPipeline {
    npi: NpiClient,
    nabp: NabpClient,
    propelus: PropelusClient,
    summarizer: Box<dyn Summarizer>,
    emitter: ReportEmitter,
    interrupt: InterruptFlag,
}

impl ValidationPipeline {
    pub fn new(config: &AppConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            npi: NpiClient::new(transport.clone(), &config.npi_api_url),
            nabp: NabpClient::new(
                transport.clone(),
                &config.nabp_api_url,
                config.nabp_api_key.clone(),
            ),
            propelus: PropelusClient::new(
                transport.clone(),
                &config.propelus_api_url,
                config.propelus_api_key.clone(),
                config.api_timeout,
                config.retry_policy(),
            ),
            summarizer: config.summarizer(transport),
            emitter: ReportEmitter::new(&config.reports_dir),
            interrupt: InterruptFlag::new(),
        }
    }

    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    #[must_use]
    pub fn with_emitter(mut self, emitter: ReportEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    #[must_use]
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Handle for signal handlers to request a clean stop.
    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    pub async fn run(&self, identity: ProviderIdentity) -> RunOutcome {
        self.run_with_context(identity).await.0
    }

    /// Same as `run` but also hands back the accumulated context, which
    /// carries per-stage outputs and raw registry results.
    pub async fn run_with_context(&self, identity: ProviderIdentity) -> (RunOutcome, RunContext) {
        let mut context = RunContext::new(identity);
        info!(
            provider = %context.identity.provider_name,
            state = %context.identity.state,
            "starting verification run"
        );

        let outcome = match self.execute(&mut context).await {
            Ok(outcome) => outcome,
            Err(PipelineError::Interrupted(stage)) => {
                info!(stage = %stage, "run interrupted");
                RunOutcome::interrupted(stage)
            }
            Err(error) => {
                warn!(%error, "run failed");
                RunOutcome::error(error.to_string(), error.error_type())
            }
        };

        info!(status = %outcome.status, "verification run finished");
        (outcome, context)
    }

    async fn execute(&self, context: &mut RunContext) -> PipelineResult<RunOutcome> {
        self.ensure_not_interrupted(Stage::Validating)?;
        self.validate(context).await;

        self.ensure_not_interrupted(Stage::Enriching)?;
        self.enrich(context).await?;

        self.ensure_not_interrupted(Stage::QaReviewing)?;
        self.qa_review(context).await?;

        self.ensure_not_interrupted(Stage::Reporting)?;
        self.report(context).await
    }

    fn ensure_not_interrupted(&self, next: Stage) -> PipelineResult<()> {
        if self.interrupt.is_triggered() {
            Err(PipelineError::Interrupted(next))
        } else {
            Ok(())
        }
    }

    /// Stage 1: query each applicable registry and record the results.
    /// NABP is queried only for pharmacists; Propelus only when a usable
    /// license number was supplied.
    async fn validate(&self, context: &mut RunContext) {
        let identity = context.identity.clone();
        let mut lines = Vec::new();

        let npi_result = self.npi.verify(&NpiQuery::for_identity(&identity)).await;
        let pharmacist = is_pharmacist(&npi_result);
        lines.push(source_line(&npi_result));
        context.push_source(npi_result);

        if pharmacist {
            let nabp_result = self.nabp.verify(&identity).await;
            lines.push(source_line(&nabp_result));
            context.push_source(nabp_result);
        } else {
            lines.push(NABP_SKIP_NOTICE.to_string());
        }

        if identity.usable_license().is_some() {
            let propelus_result = self.propelus.verify(&identity).await;
            lines.push(source_line(&propelus_result));
            context.push_source(propelus_result);
        } else {
            lines.push(PROPELUS_SKIP_NOTICE.to_string());
        }

        let all_not_found = context
            .source_results()
            .iter()
            .all(SourceResult::is_not_found);
        if all_not_found {
            info!("validation: no registry located the provider");
            context.push_stage(StageOutput::not_found(Stage::Validating));
            return;
        }

        let mut fields = BTreeMap::new();
        for result in context.source_results() {
            let status = if result.verified {
                "verified".to_string()
            } else {
                result
                    .error
                    .map_or("failed", |kind| kind.as_str())
                    .to_string()
            };
            fields.insert(result.source.as_str().to_string(), status);
        }

        context.push_stage(
            StageOutput::completed(Stage::Validating, lines.join("\n")).with_fields(fields),
        );
    }

    /// Stage 2: assess completeness and cross-source consistency of the
    /// collected evidence.
    async fn enrich(&self, context: &mut RunContext) -> PipelineResult<()> {
        if context.is_not_found_run() {
            context.push_stage(StageOutput::not_found(Stage::Enriching));
            return Ok(());
        }

        let findings = assess_quality(context);
        let request =
            SummaryRequest::new(Stage::Enriching, ENRICH_INSTRUCTIONS, findings.digest());
        let narrative = self.summarizer.summarize(&request).await?;

        context.push_stage(
            StageOutput::completed(Stage::Enriching, narrative).with_fields(findings.fields()),
        );
        Ok(())
    }

    /// Stage 3: run the compliance checklist and settle on a verdict.
    async fn qa_review(&self, context: &mut RunContext) -> PipelineResult<()> {
        if context.is_not_found_run() {
            context.push_stage(StageOutput::not_found(Stage::QaReviewing));
            return Ok(());
        }

        let checklist = Checklist::evaluate(context);
        let verdict = checklist.verdict();
        let recommendation = recommendation_for(verdict);

        let request = SummaryRequest::new(
            Stage::QaReviewing,
            QA_INSTRUCTIONS,
            checklist.digest(verdict, &recommendation),
        );
        let narrative = self.summarizer.summarize(&request).await?;

        let mut fields = BTreeMap::new();
        fields.insert("verdict".to_string(), verdict.as_str().to_string());
        fields.insert("recommendation".to_string(), recommendation);
        for item in &checklist.items {
            fields.insert(
                format!("check_{}", item.key),
                if item.passed { "pass" } else { "fail" }.to_string(),
            );
        }

        info!(verdict = verdict.as_str(), "qa review settled");
        context
            .push_stage(StageOutput::completed(Stage::QaReviewing, narrative).with_fields(fields));
        Ok(())
    }

    /// Stage 4: render the Markdown report and write it out. A failed
    /// write keeps the rendered result in the outcome instead of failing
    /// the run.
    async fn report(&self, context: &mut RunContext) -> PipelineResult<RunOutcome> {
        if context.is_not_found_run() {
            context.push_stage(StageOutput::not_found(Stage::Reporting));
            info!("reporting: provider not found, no file written");
            return Ok(RunOutcome::not_found());
        }

        let request =
            SummaryRequest::new(Stage::Reporting, REPORT_INSTRUCTIONS, context.transcript());
        let executive_summary = self.summarizer.summarize(&request).await?;

        let report = ValidationReport::from_context(context, &executive_summary);
        let markdown = report.to_markdown();
        context.push_stage(StageOutput::completed(Stage::Reporting, executive_summary));

        match self.emitter.write(&markdown) {
            Ok(path) => {
                info!(path = %path.display(), "report written");
                Ok(RunOutcome::success(Some(path), markdown))
            }
            Err(error) => {
                warn!(%error, "report not written, keeping the rendered result");
                Ok(RunOutcome::success(None, markdown)
                    .with_warning(error.to_string(), "report_write"))
            }
        }
    }
}

fn is_pharmacist(npi_result: &SourceResult) -> bool {
    npi_result
        .field("specialty")
        .is_some_and(|specialty| specialty.to_lowercase().contains(PHARMACIST_MARKER))
}

fn source_line(result: &SourceResult) -> String {
    format!("{}: {}", result.source.api_name(), result.raw_message)
}

#[derive(Debug, Default)]
struct QualityFindings {
    notes: Vec<String>,
    missing_fields: Vec<String>,
    name_similarity: Option<f64>,
    expiry_alert: Option<String>,
    unavailable_sources: Vec<String>,
}

impl QualityFindings {
    fn digest(&self) -> String {
        if self.notes.is_empty() {
            "All expected fields are present and the sources agree.".to_string()
        } else {
            self.notes.join("\n")
        }
    }

    fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(
            "missing_fields".to_string(),
            if self.missing_fields.is_empty() {
                "none".to_string()
            } else {
                self.missing_fields.join(", ")
            },
        );
        if let Some(score) = self.name_similarity {
            fields.insert("name_similarity".to_string(), format!("{score:.2}"));
        }
        if let Some(alert) = &self.expiry_alert {
            fields.insert("expiry_alert".to_string(), alert.clone());
        }
        if !self.unavailable_sources.is_empty() {
            fields.insert(
                "unavailable_sources".to_string(),
                self.unavailable_sources.join(", "),
            );
        }
        fields
    }
}

fn assess_quality(context: &RunContext) -> QualityFindings {
    let mut findings = QualityFindings::default();

    let expectations: [(RegistrySource, &[&str]); 3] = [
        (
            RegistrySource::Npi,
            &["npi", "name", "specialty", "address", "status"],
        ),
        (RegistrySource::Nabp, &["license_status", "expiration"]),
        (RegistrySource::Propelus, &["status", "expiration_date"]),
    ];
    for (source, expected) in expectations {
        let Some(result) = context.source(source) else {
            continue;
        };
        if !result.verified {
            continue;
        }
        for name in expected {
            if result.field(name).is_none() {
                findings
                    .missing_fields
                    .push(format!("{}.{}", source.as_str(), name));
            }
        }
    }
    if !findings.missing_fields.is_empty() {
        findings.notes.push(format!(
            "Missing fields: {}.",
            findings.missing_fields.join(", ")
        ));
    }

    if let Some(registered) = context
        .source(RegistrySource::Npi)
        .and_then(|result| result.field("name"))
    {
        let score = strsim::jaro_winkler(
            &context.identity.provider_name.to_lowercase(),
            &registered.to_lowercase(),
        );
        findings.name_similarity = Some(score);
        if score < NAME_SIMILARITY_THRESHOLD {
            findings.notes.push(format!(
                "Submitted name \"{}\" differs from the NPI record \"{registered}\" \
                 (similarity {score:.2}).",
                context.identity.provider_name
            ));
        }
    }

    let expiration = context
        .source(RegistrySource::Nabp)
        .and_then(|result| result.field("expiration"))
        .or_else(|| {
            context
                .source(RegistrySource::Propelus)
                .and_then(|result| result.field("expiration_date"))
        });
    if let Some(raw) = expiration {
        match parse_expiration(raw) {
            Some(date) => {
                let days_left = (date - Utc::now().date_naive()).num_days();
                if days_left < 0 {
                    let alert = format!("license expired on {date}");
                    findings.notes.push(format!("The {alert}."));
                    findings.expiry_alert = Some(alert);
                } else if days_left <= EXPIRY_WARN_DAYS {
                    let alert = format!("license expires on {date} ({days_left} days left)");
                    findings.notes.push(format!("The {alert}."));
                    findings.expiry_alert = Some(alert);
                }
            }
            None => {
                findings
                    .notes
                    .push(format!("Unrecognized expiration date format: {raw}."));
            }
        }
    }

    for result in context.source_results() {
        if result.error.is_some_and(|kind| kind.is_transient()) {
            findings
                .unavailable_sources
                .push(result.source.as_str().to_string());
            findings.notes.push(format!(
                "{} was unavailable ({}); findings rely on the remaining sources.",
                result.source.api_name(),
                result.error.map_or("error", |kind| kind.as_str()),
            ));
        }
    }

    findings
}

fn parse_expiration(raw: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw.trim(), format).ok())
}

#[derive(Debug)]
struct ChecklistItem {
    key: &'static str,
    label: &'static str,
    passed: bool,
    note: String,
}

#[derive(Debug)]
struct Checklist {
    items: Vec<ChecklistItem>,
    concerns: Vec<String>,
}

impl Checklist {
    fn evaluate(context: &RunContext) -> Self {
        let mut items = Vec::new();
        let mut concerns = Vec::new();

        let verified: Vec<&SourceResult> = context
            .source_results()
            .iter()
            .filter(|result| result.verified)
            .collect();
        items.push(ChecklistItem {
            key: "active_license",
            label: "Active credential on file",
            passed: !verified.is_empty(),
            note: if verified.is_empty() {
                "no source verified the credential".to_string()
            } else {
                format!(
                    "verified by {}",
                    verified
                        .iter()
                        .map(|result| result.source.api_name())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            },
        });
        if !verified.is_empty() {
            for result in context.source_results() {
                if result.error == Some(ErrorKind::NotVerified) {
                    concerns.push(format!(
                        "{} did not verify the credential.",
                        result.source.api_name()
                    ));
                }
            }
        }

        let propelus = context.source(RegistrySource::Propelus);
        let disciplinary = propelus
            .and_then(|result| result.field("disciplinary_actions"))
            .and_then(|count| count.parse::<u32>().ok())
            .unwrap_or(0);
        items.push(ChecklistItem {
            key: "no_disciplinary_actions",
            label: "No disciplinary actions reported",
            passed: disciplinary == 0,
            note: if disciplinary == 0 {
                "none reported".to_string()
            } else {
                format!(
                    "{disciplinary} reported: {}",
                    propelus
                        .and_then(|result| result.field("disciplinary_detail"))
                        .unwrap_or("no detail")
                )
            },
        });

        let npi = context.source(RegistrySource::Npi);
        let missing: Vec<&str> = ["npi", "specialty", "address"]
            .into_iter()
            .filter(|name| npi.and_then(|result| result.field(name)).is_none())
            .collect();
        items.push(ChecklistItem {
            key: "required_fields",
            label: "Core identity fields present",
            passed: missing.is_empty(),
            note: if missing.is_empty() {
                "npi, specialty, address".to_string()
            } else {
                format!("missing {}", missing.join(", "))
            },
        });

        if let Some(enrich) = context.stage(Stage::Enriching) {
            if let Some(alert) = enrich.field("expiry_alert") {
                concerns.push(format!("The {alert}."));
            }
            if let Some(score) = enrich.field("name_similarity") {
                if score
                    .parse::<f64>()
                    .is_ok_and(|s| s < NAME_SIMILARITY_THRESHOLD)
                {
                    concerns.push(format!(
                        "Submitted and registered names disagree (similarity {score})."
                    ));
                }
            }
            if let Some(sources) = enrich.field("unavailable_sources") {
                concerns.push(format!("Sources unavailable during validation: {sources}."));
            }
        }

        Self { items, concerns }
    }

    fn verdict(&self) -> QaVerdict {
        if self.items.iter().any(|item| !item.passed) {
            QaVerdict::Fail
        } else if self.concerns.is_empty() {
            QaVerdict::Pass
        } else {
            QaVerdict::PassWithConcerns
        }
    }

    fn digest(&self, verdict: QaVerdict, recommendation: &str) -> String {
        let mut lines: Vec<String> = self
            .items
            .iter()
            .map(|item| {
                format!(
                    "[{}] {}: {}",
                    if item.passed { "pass" } else { "fail" },
                    item.label,
                    item.note
                )
            })
            .collect();
        for concern in &self.concerns {
            lines.push(format!("Concern: {concern}"));
        }
        lines.push(format!("Verdict: {verdict}"));
        lines.push(format!("Recommendation: {recommendation}"));
        lines.join("\n")
    }
}

fn recommendation_for(verdict: QaVerdict) -> String {
    match verdict {
        QaVerdict::Pass => {
            "Approve: all credential checks passed. Proceed with credentialing.".to_string()
        }
        QaVerdict::PassWithConcerns => {
            "Approve with follow-up: resolve the noted concerns before final credentialing."
                .to_string()
        }
        QaVerdict::Fail => "Do not approve: failed checks require manual review.".to_string(),
    }
}
