//! Property Insights: multi-property conversion analytics reports.
//!
//! Fetches CVR, funnel, traffic and demographic metrics for every enabled
//! property, then writes the report tables to the configured directory.

use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use insights_analytics::{ClickHouseExecutor, Orchestrator, RetryPolicy};
use insights_core::{Granularity, ReportWindow, RunConfig, SourceRegistry};
use insights_reporting::{CsvDirectorySink, ReportRunner, RunRequest};
use serde_json::json;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "property-insights")]
#[command(about = "Multi-property conversion analytics reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output directory for report tables (overrides config)
    #[arg(long, global = true, env = "PROPERTY_INSIGHTS__OUTPUT__DIRECTORY")]
    output: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Monthly report
    Monthly(WindowArgs),

    /// Quarterly report
    Quarterly(WindowArgs),

    /// Monthly report over the trailing lookback
    All {
        /// Lookback in months (overrides config)
        #[arg(long)]
        months: Option<u32>,
    },

    /// Validate configuration, list sources and ping the warehouse
    Check,
}

#[derive(clap::Args, Debug)]
struct WindowArgs {
    /// Lookback in months for the trailing window (overrides config)
    #[arg(long)]
    months: Option<u32>,

    /// Which stretch of time to report on
    #[arg(long, value_enum, default_value_t = Window::Trailing)]
    window: Window,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Window {
    Trailing,
    Current,
    Previous,
}

impl WindowArgs {
    fn window(&self, default_months: u32) -> ReportWindow {
        match self.window {
            Window::Trailing => ReportWindow::Trailing {
                months: self.months.unwrap_or(default_months),
            },
            Window::Current => ReportWindow::Current,
            Window::Previous => ReportWindow::Previous,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "property_insights=info,insights_analytics=info,insights_reporting=info".into()
            }),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "status": "success",
                    "timestamp": Utc::now(),
                    "report": report,
                }))?
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "status": "error",
                    "timestamp": Utc::now(),
                    "error": e.to_string(),
                }))?
            );
            std::process::exit(1);
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<serde_json::Value> {
    let mut config = RunConfig::load()?;
    if let Some(output) = cli.output {
        config.output.directory = output;
    }

    let registry = SourceRegistry::load(&config.sources)?;
    let executor = Arc::new(ClickHouseExecutor::new(&config.warehouse));

    let request = match &cli.command {
        Commands::Monthly(args) => RunRequest {
            granularity: Granularity::Month,
            window: args.window(config.report.months_back),
        },
        Commands::Quarterly(args) => RunRequest {
            granularity: Granularity::Quarter,
            window: args.window(config.report.months_back),
        },
        Commands::All { months } => RunRequest {
            granularity: Granularity::Month,
            window: ReportWindow::Trailing {
                months: months.unwrap_or(config.report.months_back),
            },
        },
        Commands::Check => {
            executor.ping().await?;
            info!(sources = registry.len(), "Configuration and warehouse check passed");
            return Ok(json!({
                "warehouse": config.warehouse.url,
                "sources": registry.all(),
                "enabled": registry.enabled_sources().len(),
            }));
        }
    };

    info!(
        granularity = %request.granularity,
        sources = registry.len(),
        output = %config.output.directory,
        "Configuration loaded"
    );

    let orchestrator = Orchestrator::new(executor, RetryPolicy::from(&config.query));
    let sink = Arc::new(CsvDirectorySink::new(&config.output.directory));
    let runner = ReportRunner::new(orchestrator, sink, registry, &config.report);

    let outcome = runner.run(request).await?;
    Ok(serde_json::to_value(outcome)?)
}
