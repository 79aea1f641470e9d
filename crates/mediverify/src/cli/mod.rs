pub mod bulk;
pub mod lookup;
pub mod validate;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mdv",
    about = "Healthcare provider credential verification",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full verification pipeline for one provider
    Validate {
        /// Provider full name, e.g. "Jane Smith"
        name: String,
        /// Two-letter state or jurisdiction code
        state: String,
        /// License number, when known
        #[arg(short, long)]
        license: Option<String>,
        /// Skip the LLM summarizer and use the deterministic template
        #[arg(long = "no-llm")]
        no_llm: bool,
        /// Directory for the Markdown report
        #[arg(long = "reports-dir")]
        reports_dir: Option<String>,
        /// Print the rendered report to stdout
        #[arg(long)]
        print: bool,
        /// Emit the outcome envelope as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Quick NPI registry existence check
    Lookup {
        /// Ten-digit NPI number
        npi: String,
    },
    /// Check a CSV of NPI numbers against the registry
    Bulk {
        /// Input CSV with rows of npi[,name]
        input: String,
        /// Output CSV path (defaults to <input>.results.csv)
        #[arg(short, long)]
        out: Option<String>,
    },
}
