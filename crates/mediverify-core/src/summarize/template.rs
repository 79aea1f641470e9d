use async_trait::async_trait;

use super::{SummaryError, SummaryRequest, Summarizer};
use crate::pipeline::Stage;

/// Deterministic fallback narrative built from the stage evidence.
///
/// Used when no LLM is configured or when LLM use is disabled. Output is a
/// fixed lead-in per stage followed by the evidence lines, so runs are
/// reproducible in tests and offline environments.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateSummarizer;

impl TemplateSummarizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Summarizer for TemplateSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError> {
        let lead_in = match request.stage {
            Stage::Validating => "Registry findings:",
            Stage::Enriching => "Data quality observations:",
            Stage::QaReviewing => "Compliance review notes:",
            Stage::Reporting => "Verification run overview:",
            Stage::Done | Stage::NotFound => "Summary:",
        };

        let context = request.context.trim();
        if context.is_empty() {
            return Ok(format!("{lead_in} no evidence was gathered."));
        }
        Ok(format!("{lead_in}\n{context}"))
    }

    fn name(&self) -> &'static str {
        "template"
    }
}
