//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::progress::ProgressReporter;
use anyhow::Context;
use paperlens_core::config::{self, ConfigOverrides, PaperlensConfig, WORKSPACE_CONFIG_FILE};
use paperlens_core::providers::create_provider;
use paperlens_core::{PdfExtractReader, Pipeline, RunReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub config_file: Option<PathBuf>,
    pub overrides: ConfigOverrides,
    pub quiet: bool,
}

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    options: &Options,
) -> anyhow::Result<()> {
    match command {
        Commands::Run => handle_run(workspace, options).await,
        Commands::Config { action } => handle_config(action, workspace, options),
    }
}

/// Load the layered configuration and resolve paths against `workspace`.
fn load(workspace: &Path, options: &Options) -> anyhow::Result<PaperlensConfig> {
    let mut config = config::load_config(
        Some(workspace),
        options.config_file.as_deref(),
        Some(&options.overrides),
    )
    .context("Failed to load configuration")?;
    config.resolve_paths(workspace);
    for warning in config.validate() {
        warn!("{}", warning);
    }
    Ok(config)
}

async fn handle_run(workspace: &Path, options: &Options) -> anyhow::Result<()> {
    let config = load(workspace, options)?;
    config.ensure_runnable()?;

    let provider = create_provider(&config.llm).with_context(|| {
        format!(
            "Could not create the '{}' provider; set {} or configure llm.api_key_env",
            config.llm.provider, config.llm.api_key_env
        )
    })?;

    let reporter = Arc::new(ProgressReporter::new(options.quiet));
    let pipeline =
        Pipeline::new(config, provider, Arc::new(PdfExtractReader)).with_callback(reporter);
    let report = pipeline.run().await?;

    if !options.quiet {
        print_report(&report);
    }
    if !report.tables_written() {
        anyhow::bail!("No papers were successfully analyzed.");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!(
        "Analyzed {} of {} paper(s) in {}s with {}",
        report.summarized,
        report.discovered,
        report.duration().num_seconds(),
        report.model
    );
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.paper_name, skipped.reason);
    }
    if report.comparisons.calls > 0 {
        println!(
            "Comparisons: {} call(s), {} failed",
            report.comparisons.calls, report.comparisons.failures
        );
    }
    println!(
        "Model usage: {} call(s), {} tokens (~${:.4})",
        report.llm.calls,
        report.llm.usage.total(),
        report.llm.cost_usd
    );
    if let Some(path) = &report.summary_table {
        println!("Summary table: {}", path.display());
    }
    if let Some(path) = &report.comparison_table {
        println!("Comparison matrix: {}", path.display());
    }
}

fn handle_config(action: ConfigAction, workspace: &Path, options: &Options) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(WORKSPACE_CONFIG_FILE);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&PaperlensConfig::default())?;
            std::fs::create_dir_all(workspace)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, options)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
