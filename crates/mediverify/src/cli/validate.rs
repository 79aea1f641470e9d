use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use console::style;

use mediverify_core::states;
use mediverify_core::{
    AppConfig, ProviderIdentity, ReqwestTransport, RunOutcome, RunStatus, Transport,
    ValidationPipeline,
};

pub struct ValidateArgs {
    pub name: String,
    pub state: String,
    pub license: Option<String>,
    pub no_llm: bool,
    pub reports_dir: Option<String>,
    pub print: bool,
    pub json: bool,
}

pub async fn run(args: ValidateArgs) -> Result<i32> {
    let name = args.name.trim();
    if name.is_empty() {
        bail!("provider name is required");
    }
    let Some(state) = states::normalize(&args.state) else {
        bail!(
            "invalid state code: {}. Use a two-letter jurisdiction code",
            args.state.trim()
        );
    };

    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if args.no_llm {
        config.use_llm = false;
    }
    if let Some(dir) = &args.reports_dir {
        config.reports_dir = dir.into();
    }

    let mut identity = ProviderIdentity::new(name, &state);
    if let Some(license) = &args.license {
        identity = identity.with_license_number(license);
    }

    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new().context("could not build HTTP client")?);
    let pipeline = ValidationPipeline::new(&config, transport);

    let flag = pipeline.interrupt_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("interrupt requested, stopping after the current stage...");
            flag.trigger();
        }
    });

    if !args.json {
        print_banner(&identity);
    }

    let outcome = pipeline.run(identity).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome, args.print);
    }

    Ok(match outcome.status {
        RunStatus::Success | RunStatus::NotFound => 0,
        RunStatus::Error => 1,
        RunStatus::Interrupted => 130,
    })
}

fn print_banner(identity: &ProviderIdentity) {
    eprintln!("{}", style("Provider Validation").bold());
    eprintln!(
        "  provider: {} ({})",
        style(&identity.provider_name).cyan(),
        identity.state
    );
    eprintln!(
        "  license:  {}",
        identity.license_number.as_deref().unwrap_or("not provided")
    );
    eprintln!();
}

fn print_outcome(outcome: &RunOutcome, print_report: bool) {
    match outcome.status {
        RunStatus::Success => {
            eprintln!("{} validation complete", style("✓").green());
            if let Some(path) = &outcome.report_path {
                eprintln!("  report: {}", style(path.display()).cyan());
            }
            if let (Some(error), Some(kind)) = (&outcome.error, &outcome.error_type) {
                eprintln!("  {} {error} ({kind})", style("!").yellow());
            }
            if print_report {
                if let Some(raw) = &outcome.raw_result {
                    println!("{raw}");
                }
            }
        }
        RunStatus::NotFound => {
            eprintln!("{} provider not found in any registry", style("?").yellow());
        }
        RunStatus::Interrupted | RunStatus::Error => {
            eprintln!(
                "{} {}",
                style("✗").red().bold(),
                outcome.error.as_deref().unwrap_or("validation failed")
            );
        }
    }
}
