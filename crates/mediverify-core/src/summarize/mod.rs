mod gemini;
mod template;

use async_trait::async_trait;

pub use gemini::{GeminiSummarizer, DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_TEMPERATURE};
pub use template::TemplateSummarizer;

use crate::pipeline::Stage;

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("summarizer request failed: {0}")]
    Request(#[from] crate::network::TransportError),

    #[error("summarizer returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("summarizer response could not be parsed: {0}")]
    Parse(String),

    #[error("summarizer returned an empty response")]
    Empty,
}

/// What a stage wants narrated: its own instructions plus the evidence
/// gathered so far.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub stage: Stage,
    pub instructions: String,
    pub context: String,
}

impl SummaryRequest {
    pub fn new(stage: Stage, instructions: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            stage,
            instructions: instructions.into(),
            context: context.into(),
        }
    }

    /// Single prompt string for LLM-backed summarizers.
    pub fn prompt(&self) -> String {
        format!(
            "{}\n\nEvidence gathered so far:\n{}",
            self.instructions, self.context
        )
    }
}

/// Produces the narrative text for a pipeline stage.
///
/// The pipeline owns one of these behind a `Box`; which implementation it
/// gets is a configuration decision, not a pipeline concern.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError>;

    /// Short label for logs and the report footer.
    fn name(&self) -> &'static str;
}
