//! The staged verification run: validate, enrich, QA review, report.

mod context;
mod orchestrator;

pub use context::{
    RunContext, RunOutcome, RunStatus, Stage, StageOutput, StageStatus, NOT_FOUND_SENTINEL,
    PROPELUS_SKIP_NOTICE,
};
pub use orchestrator::{
    InterruptFlag, PipelineError, PipelineResult, QaVerdict, ValidationPipeline,
};
