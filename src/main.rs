use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use solar_pipeline::config::{load_config, resolve_timezone, PipelineConfig};
use solar_pipeline::AnalysisPipeline;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Peak hours, efficiency and weather correlations for solar plant data", long_about = None)]
struct Cli {
    /// JSON pipeline configuration.
    #[clap(long, value_parser, conflicts_with = "data_dir")]
    config: Option<PathBuf>,
    /// Directory with generation and weather CSV files.
    #[clap(long)]
    data_dir: Option<PathBuf>,
    /// Use the fixed two-plant file layout under --data-dir instead of discovery.
    #[clap(long, requires = "data_dir")]
    standard: bool,
    /// Convert all timestamps to this IANA zone before bucketing.
    #[clap(long)]
    output_timezone: Option<String>,
    /// Print the report as JSON.
    #[clap(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match (&cli.config, &cli.data_dir) {
        (Some(path), _) => load_config(path)
            .with_context(|| format!("Failed to load configuration {:?}", path))?,
        (None, Some(dir)) if cli.standard => PipelineConfig::standard(dir),
        (None, Some(dir)) => PipelineConfig::discover(dir)
            .with_context(|| format!("Failed to discover sources in {:?}", dir))?,
        (None, None) => bail!("either --config or --data-dir is required"),
    };
    if let Some(tz) = cli.output_timezone {
        resolve_timezone(Some(tz.as_str()), "--output-timezone")?;
        config.output_timezone = Some(tz);
    }
    info!("Running analysis over {} configured sources", config.sources.len());

    let report = AnalysisPipeline::new(config)
        .run()
        .context("Analysis pipeline failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
