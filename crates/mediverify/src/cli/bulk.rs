use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use console::style;

use mediverify_core::{AppConfig, NpiClient, ReqwestTransport, SourceResult, Transport};

struct BulkRow {
    npi: String,
    name: Option<String>,
}

pub async fn run(input: &str, out: Option<&str>) -> Result<i32> {
    let input = Path::new(input);
    let rows = read_rows(input)?;
    if rows.is_empty() {
        bail!("no rows found in {}", input.display());
    }

    let config = AppConfig::from_env().context("invalid configuration")?;
    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new().context("could not build HTTP client")?);
    let client = NpiClient::new(transport, &config.npi_api_url);

    let out_path = out.map_or_else(|| input.with_extension("results.csv"), PathBuf::from);
    let mut writer = csv::Writer::from_path(&out_path)
        .with_context(|| format!("could not create {}", out_path.display()))?;
    writer.write_record(["npi", "name", "valid", "detail"])?;

    let mut valid = 0usize;
    for row in &rows {
        let result = client.quick_check(&row.npi).await;
        if result.verified {
            valid += 1;
        }
        writer.write_record([
            row.npi.as_str(),
            row.name.as_deref().unwrap_or(""),
            if result.verified { "true" } else { "false" },
            detail(&result),
        ])?;
    }
    writer.flush()?;

    eprintln!(
        "{} {valid}/{} registered, results in {}",
        style("✓").green(),
        rows.len(),
        style(out_path.display()).cyan()
    );
    Ok(0)
}

fn detail(result: &SourceResult) -> &str {
    if result.verified {
        result.field("name").unwrap_or("registered")
    } else {
        result.raw_message.lines().next().unwrap_or("")
    }
}

fn read_rows(path: &Path) -> Result<Vec<BulkRow>> {
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(npi) = record.get(0).filter(|field| !field.is_empty()) else {
            continue;
        };
        if npi.eq_ignore_ascii_case("npi") {
            continue; // header row
        }
        rows.push(BulkRow {
            npi: npi.to_string(),
            name: record
                .get(1)
                .filter(|name| !name.is_empty())
                .map(String::from),
        });
    }
    Ok(rows)
}
