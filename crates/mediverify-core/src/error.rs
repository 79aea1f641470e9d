use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown registry source: {0}")]
    InvalidSource(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::network::TransportError),

    #[error("Summarizer error: {0}")]
    Summary(#[from] crate::summarize::SummaryError),

    #[error("Report error: {0}")]
    Report(#[from] crate::report::ReportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
