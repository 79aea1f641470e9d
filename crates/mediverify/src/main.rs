use anyhow::Result;
use clap::Parser;
use console::style;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let code = match dispatch(cli.command).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error:#}", style("error:").red().bold());
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Validate {
            name,
            state,
            license,
            no_llm,
            reports_dir,
            print,
            json,
        } => {
            cli::validate::run(cli::validate::ValidateArgs {
                name,
                state,
                license,
                no_llm,
                reports_dir,
                print,
                json,
            })
            .await
        }
        Commands::Lookup { npi } => cli::lookup::run(&npi).await,
        Commands::Bulk { input, out } => cli::bulk::run(&input, out.as_deref()).await,
    }
}
