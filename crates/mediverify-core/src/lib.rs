pub mod config;
pub mod error;
pub mod identity;
pub mod network;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod states;
pub mod summarize;

pub use config::{AppConfig, ConfigError};
pub use error::{Error, Result};
pub use identity::ProviderIdentity;
pub use network::{
    ApiRequest, ApiResponse, HttpSession, ReqwestTransport, RetryPolicy, Transport, TransportError,
    TransportResult,
};
pub use pipeline::{
    InterruptFlag, QaVerdict, RunContext, RunOutcome, RunStatus, Stage, StageOutput,
    ValidationPipeline, NOT_FOUND_SENTINEL, PROPELUS_SKIP_NOTICE,
};
pub use registry::{
    is_valid_npi_format, ErrorKind, NabpClient, NpiClient, NpiQuery, PropelusClient,
    RegistrySource, SourceResult,
};
pub use report::{ReportEmitter, ValidationReport};
pub use summarize::{GeminiSummarizer, Summarizer, TemplateSummarizer};
