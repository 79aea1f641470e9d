use std::sync::Arc;

use anyhow::{Context as _, Result};
use console::style;

use mediverify_core::{is_valid_npi_format, AppConfig, NpiClient, ReqwestTransport, Transport};

pub async fn run(npi: &str) -> Result<i32> {
    let npi = npi.trim();
    if !is_valid_npi_format(npi) {
        eprintln!(
            "{} invalid NPI format: an NPI is exactly 10 digits",
            style("✗").red().bold()
        );
        return Ok(1);
    }

    let config = AppConfig::from_env().context("invalid configuration")?;
    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new().context("could not build HTTP client")?);
    let client = NpiClient::new(transport, &config.npi_api_url);

    let result = client.quick_check(npi).await;
    if result.verified {
        eprintln!("{} NPI {npi} is registered", style("✓").green());
        for (name, value) in &result.fields {
            if name != "matches" {
                eprintln!("  {name}: {value}");
            }
        }
        Ok(0)
    } else if result.is_not_found() {
        eprintln!("{} NPI {npi} not found in the registry", style("?").yellow());
        Ok(0)
    } else {
        eprintln!("{} {}", style("✗").red().bold(), result.raw_message);
        Ok(1)
    }
}
