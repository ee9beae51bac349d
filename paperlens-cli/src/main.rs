//! Paperlens CLI: summarize a folder of research PDFs and cross-compare them.

mod commands;
mod progress;

use clap::Parser;
use paperlens_core::ConfigOverrides;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Paperlens: structured LLM summaries and a pairwise comparison matrix for research papers
#[derive(Parser, Debug)]
#[command(name = "paperlens", version, about, long_about = None)]
struct Cli {
    /// Directory containing the PDF files (overrides paths.papers_dir)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Workspace directory; relative paths resolve against it
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path (replaces the workspace paperlens.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// LLM model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Query each unordered pair once and mirror the answer
    #[arg(long, global = true)]
    mirror_pairs: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Analyze every PDF in the input directory and write both tables
    Run,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default paperlens.toml in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model: self.model.clone(),
            papers_dir: self.input.clone(),
            mirror_pairs: self.mirror_pairs.then_some(true),
        }
    }

    fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(cli.log_filter()));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "paperlens", "paperlens")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "paperlens.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    let options = commands::Options {
        config_file: cli.config.clone(),
        overrides: cli.overrides(),
        quiet: cli.quiet,
    };
    let command = cli.command.unwrap_or(Commands::Run);
    commands::handle_command(command, &workspace, &options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_defaults_to_run() {
        let cli = Cli::try_parse_from(["paperlens"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.workspace, PathBuf::from("."));
        assert_eq!(cli.overrides(), ConfigOverrides::default());
        assert_eq!(cli.log_filter(), "info");
    }

    #[test]
    fn test_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "paperlens",
            "--input",
            "pdfs",
            "--model",
            "gpt-4o-mini",
            "--mirror-pairs",
            "run",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Run)));
        let overrides = cli.overrides();
        assert_eq!(overrides.papers_dir, Some(PathBuf::from("pdfs")));
        assert_eq!(overrides.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(overrides.mirror_pairs, Some(true));
    }

    #[test]
    fn test_verbosity_levels() {
        let quiet = Cli::try_parse_from(["paperlens", "--quiet"]).unwrap();
        assert_eq!(quiet.log_filter(), "error");
        let debug = Cli::try_parse_from(["paperlens", "-v"]).unwrap();
        assert_eq!(debug.log_filter(), "debug");
        let trace = Cli::try_parse_from(["paperlens", "-vv"]).unwrap();
        assert_eq!(trace.log_filter(), "trace");
    }

    #[test]
    fn test_config_subcommands_parse() {
        let cli = Cli::try_parse_from(["paperlens", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
        let cli = Cli::try_parse_from(["paperlens", "config", "init", "-w", "/tmp"]).unwrap();
        assert_eq!(cli.workspace, PathBuf::from("/tmp"));
    }
}
