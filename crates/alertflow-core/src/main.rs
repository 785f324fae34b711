//! AlertFlow CLI
//!
//! Command-line interface for the AlertFlow alert pipeline.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use alertflow::alerting::{AlertHistory, AlertProcessor, HistoryFile, ProcessingSummary};
use alertflow::config::{self, Config};
use alertflow::models::{Alert, Level, MetricReport, MetricSnapshot, PredictionReport};

/// AlertFlow - Alert processing for tool and system monitoring
#[derive(Parser)]
#[command(name = "alertflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "ALERTFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one alert batch against a metric report
    Check {
        /// Metric report to evaluate
        #[arg(long, default_value = "dashboard_data.json", env = "ALERTFLOW_METRICS")]
        metrics: PathBuf,

        /// Prediction report, or a directory holding `predictions_*.json`
        #[arg(long, env = "ALERTFLOW_PREDICTIONS")]
        predictions: Option<PathBuf>,

        /// Threshold environment (defaults to the configured one)
        #[arg(long)]
        environment: Option<String>,
    },

    /// Show channels, routing and throttle state
    Status,

    /// Show threshold profiles
    Thresholds {
        /// Resolve thresholds for this environment
        #[arg(long)]
        environment: Option<String>,

        /// Apply this tool's overrides
        #[arg(long)]
        tool: Option<String>,
    },

    /// Persist the default threshold environment
    SetEnvironment {
        /// Environment name (development, staging, production, ...)
        name: String,
    },

    /// Send a test alert through every enabled channel
    Test,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().or_else(|| {
        let path = Config::default_path();
        path.exists().then_some(path)
    });
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    init_tracing(log_level, config.logging.format == "json");

    // Execute command
    let result = match cli.command {
        Commands::Check {
            metrics,
            predictions,
            environment,
        } => {
            let predictions = predictions.as_deref();
            run_check(&config, &metrics, predictions, environment, cli.format).await
        }
        Commands::Status => run_status(&config, cli.format),
        Commands::Thresholds { environment, tool } => {
            run_thresholds(&config, environment.as_deref(), tool.as_deref(), cli.format)
        }
        Commands::SetEnvironment { name } => {
            let path = cli.config.unwrap_or_else(Config::default_path);
            run_set_environment(&config, &path, &name)
        }
        Commands::Test => run_test(&config).await,
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn history_store(config: &Config) -> HistoryFile {
    HistoryFile::new(config.history_path(), config.history.max_records)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_check(
    config: &Config,
    metrics: &Path,
    predictions: Option<&Path>,
    environment: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let environment = environment.unwrap_or_else(|| config.thresholds.current_environment.clone());
    info!(metrics = %metrics.display(), environment = %environment, "Running alert check");

    let mut load_errors = Vec::new();
    let report = match MetricReport::load(metrics) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(path = %metrics.display(), error = %e, "Metric report unavailable");
            load_errors.push(format!("{}: {e}", metrics.display()));
            None
        }
    };

    let prediction_report = match predictions {
        None => None,
        Some(path) => match PredictionReport::discover(path) {
            Ok(found) => found,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Prediction report unavailable");
                load_errors.push(format!("{}: {e}", path.display()));
                None
            }
        },
    };

    let processor = AlertProcessor::from_config(config)?;
    let mut summary = processor
        .run(
            &history_store(config),
            report.as_ref(),
            prediction_report.as_ref(),
            &environment,
        )
        .await;
    summary.warnings.splice(0..0, load_errors);

    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Text => {
            print_summary(&summary, &environment);
            Ok(())
        }
    }
}

fn print_summary(summary: &ProcessingSummary, environment: &str) {
    println!("Alert check complete (environment: {environment})");
    println!("  Raw alerts:        {}", summary.raw_count);
    println!(
        "  After correlation: {} ({} groups)",
        summary.correlated_count, summary.group_count
    );
    println!("  Escalated:         {}", summary.escalated_count);
    println!("  Sent:              {}", summary.sent_count);
    println!("  Throttled:         {}", summary.throttled_count);
    if summary.dropped_count > 0 {
        println!("  Dropped:           {}", summary.dropped_count);
    }
    if !summary.warnings.is_empty() {
        println!("Warnings:");
        for warning in &summary.warnings {
            println!("  - {warning}");
        }
    }
}

fn run_status(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let processor = AlertProcessor::from_config(config)?;
    let store = history_store(config);
    let history = store.load().unwrap_or_else(|e| {
        warn!(error = %e, "Alert history unreadable");
        AlertHistory::new()
    });
    let throttle = processor.throttle().status(&history, Utc::now());
    let channels = processor.dispatcher().enabled_channels();

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "current_environment": config.thresholds.current_environment,
            "enabled_channels": channels,
            "routing": config.routing,
            "history_path": store.path(),
            "history_records": history.len(),
            "throttle": throttle,
        }));
    }

    println!("AlertFlow Status");
    println!("────────────────");
    println!("Environment:      {}", config.thresholds.current_environment);
    let channels = channels.iter().map(ToString::to_string).collect::<Vec<_>>();
    println!(
        "Enabled channels: {}",
        if channels.is_empty() { "none".to_string() } else { channels.join(", ") }
    );
    println!("Routing:");
    for level in Level::ALL.iter().rev() {
        let routed = config
            .routing
            .get(level)
            .map(|c| c.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        println!("  {:<9} -> {routed}", level.as_str());
    }
    println!("History:          {} records ({})", history.len(), store.path().display());
    println!(
        "Last hour:        {}/{} alerts",
        throttle.sent_last_hour, throttle.max_alerts_per_hour
    );
    match throttle.cooldown_remaining_seconds {
        Some(seconds) => println!("Cooldown:         {seconds}s remaining"),
        None => println!("Cooldown:         inactive ({} min)", throttle.cooldown_minutes),
    }
    Ok(())
}

fn run_thresholds(
    config: &Config,
    environment: Option<&str>,
    tool: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let thresholds = &config.thresholds;

    if environment.is_some() || tool.is_some() {
        let environment = environment.unwrap_or(&thresholds.current_environment);
        let resolved = thresholds.resolve(environment, tool);
        return match format {
            OutputFormat::Json => print_json(&resolved),
            OutputFormat::Text => {
                let scope = tool.map_or_else(String::new, |tool| format!(", tool: {tool}"));
                println!("Resolved thresholds (environment: {environment}{scope})");
                print_profile(&resolved);
                Ok(())
            }
        };
    }

    if format == OutputFormat::Json {
        return print_json(thresholds);
    }

    println!("Environments:");
    for (name, profile) in &thresholds.environments {
        let marker = current_marker(name, &thresholds.current_environment);
        println!("  {name}{marker}");
        print_profile(profile);
    }
    println!("Tools:");
    for (name, profile) in &thresholds.tools {
        println!("  {name}");
        print_profile(profile);
    }
    Ok(())
}

/// Environment lookups ignore case, so the marker does too
fn current_marker(name: &str, current: &str) -> &'static str {
    if name.eq_ignore_ascii_case(current) {
        " (current)"
    } else {
        ""
    }
}

fn print_profile(profile: &MetricSnapshot) {
    for (metric, value) in profile {
        println!("    {metric:<24} {value}");
    }
}

fn run_set_environment(config: &Config, path: &Path, name: &str) -> anyhow::Result<()> {
    if config.thresholds.environment(name).is_none() {
        let known = config.thresholds.environments.keys().cloned().collect::<Vec<_>>();
        anyhow::bail!("unknown environment '{name}' (known: {})", known.join(", "));
    }

    config::persist_environment(path, name)
        .with_context(|| format!("failed to update {}", path.display()))?;

    info!(environment = name, path = %path.display(), "Default environment updated");
    println!("Environment set to {name}");
    Ok(())
}

async fn run_test(config: &Config) -> anyhow::Result<()> {
    let processor = AlertProcessor::from_config(config)?;
    if processor.dispatcher().enabled_channels().is_empty() {
        anyhow::bail!("no notification channels are enabled");
    }

    let alert = Alert::new(
        Level::Low,
        "Test Alert",
        "This is a test alert from AlertFlow",
        "alertflow",
        Utc::now(),
    );
    let results = processor.dispatcher().send_to_all(&alert).await;

    for result in &results {
        match &result.error {
            None => println!("  {:<8} ok", result.channel.as_str()),
            Some(error) => println!("  {:<8} failed: {error}", result.channel.as_str()),
        }
    }

    if results.iter().any(|r| r.success) {
        Ok(())
    } else {
        anyhow::bail!("test alert was not delivered on any channel")
    }
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "alertflow", &mut io::stdout());
}
