use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{info, warn};

use claude_usage_chart::analyzer::{
    render_report, report_json, ReportOptions, TodayReading, UsageAnalyzer,
};
use claude_usage_chart::config::Config;
use claude_usage_chart::logging::init_logging;
use claude_usage_chart::monitor::{clear_screen, MonitorLoop, TokioSleeper};
use claude_usage_chart::subscription::{render_subscription, ScreenParser, SubscriptionReport};
use claude_usage_chart::time::SystemClock;
use claude_usage_chart::tray::{format_tray_label, NO_DATA_LABEL};

#[derive(Parser)]
#[command(name = "claude-usage-chart")]
#[command(about = "Token usage tables and ASCII charts for Claude Code logs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Also count Gemini CLI sessions (GEMINI_CONFIG_DIR or ~/.gemini)
    #[arg(long, global = true)]
    gemini: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Overall stats, per-model table and hourly charts (default)
    Report(ReportArgs),
    /// One-line token summary since the daily reset hour
    Today {
        /// Local hour (0-23) at which the day starts
        #[arg(long)]
        reset_hour: Option<u32>,
        /// IANA time zone, e.g. Europe/Berlin
        #[arg(long)]
        timezone: Option<String>,
        /// Reprint every SECS seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<Option<u64>>,
    },
    /// Parse a captured subscription usage screen
    Subscription {
        /// File holding the captured screen; stdin when omitted
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Default)]
struct ReportArgs {
    /// Whole days to look back before today
    #[arg(long)]
    days: Option<u32>,
    /// IANA time zone, e.g. Europe/Berlin
    #[arg(long)]
    timezone: Option<String>,
    /// Bucket width in hours; must divide 24
    #[arg(long)]
    interval_hours: Option<u32>,
    /// Chart height in rows
    #[arg(long)]
    height: Option<usize>,
    /// Refresh every SECS seconds until Ctrl+C
    #[arg(long, value_name = "SECS")]
    monitor: Option<Option<u64>>,
    /// Output in JSON format
    #[arg(long)]
    json: bool,
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Commands::Report(args) => args.json,
            Commands::Subscription { json, .. } => *json,
            Commands::Today { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.command.as_ref().is_some_and(Commands::json);

    if let Err(e) = run(cli).await {
        handle_error(e, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }
    let color = !cli.no_color && io::stdout().is_terminal();
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Report(ReportArgs::default()));

    let mut config = Config::load()?;
    if cli.gemini {
        config.paths.include_gemini = true;
    }
    apply_cli_overrides(&mut config, &command);
    config.validate()?;

    let _guard = init_logging(&config.logging, &config.paths.log_directory)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting claude-usage-chart");

    match command {
        Commands::Report(args) => run_report(&config, &args, color).await,
        Commands::Today { watch, .. } => run_today(&config, watch.is_some()).await,
        Commands::Subscription { input, json } => run_subscription(input, json),
    }
}

fn apply_cli_overrides(config: &mut Config, command: &Commands) {
    match command {
        Commands::Report(args) => {
            if let Some(days) = args.days {
                config.report.days = days;
            }
            if let Some(tz) = &args.timezone {
                config.report.timezone = tz.clone();
            }
            if let Some(hours) = args.interval_hours {
                config.report.interval_hours = hours;
            }
            if let Some(height) = args.height {
                config.report.chart_height = height;
            }
            if let Some(Some(secs)) = args.monitor {
                config.monitor.interval_secs = secs;
            }
        }
        Commands::Today {
            reset_hour,
            timezone,
            watch,
        } => {
            if let Some(hour) = reset_hour {
                config.tray.reset_hour = *hour;
            }
            if let Some(tz) = timezone {
                config.report.timezone = tz.clone();
            }
            if let Some(Some(secs)) = watch {
                config.tray.refresh_secs = *secs;
            }
        }
        Commands::Subscription { .. } => {}
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C; stop the process another way");
        futures::future::pending::<()>().await;
    }
}

async fn run_report(config: &Config, args: &ReportArgs, color: bool) -> Result<()> {
    let options = ReportOptions::from_config(config, color && !args.json)?;
    let analyzer = UsageAnalyzer::from_config(config);

    if args.monitor.is_none() {
        let report = analyzer.build_report(&options, Utc::now())?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
        } else {
            println!("{}", render_report(&report, &options));
        }
        return Ok(());
    }

    if args.json {
        bail!("Monitor mode does not support --json output");
    }

    let secs = config.monitor.interval_secs;
    let monitor = MonitorLoop::new(SystemClock, TokioSleeper, Duration::from_secs(secs));
    monitor
        .run(
            |_, now| {
                let report = analyzer.build_report(&options, now)?;
                clear_screen()?;
                println!("{}", render_report(&report, &options));
                println!();
                println!("Refreshing every {}s. Press Ctrl+C to exit.", secs);
                Ok(())
            },
            shutdown_signal(),
        )
        .await;

    Ok(())
}

async fn run_today(config: &Config, watch: bool) -> Result<()> {
    let tz = config.display_tz()?;
    let reset_hour = config.tray.reset_hour;
    let analyzer = UsageAnalyzer::from_config(config);

    let label = |now: DateTime<Utc>| -> Result<String> {
        Ok(match analyzer.today(now, tz, reset_hour)? {
            TodayReading::NoSource => NO_DATA_LABEL.to_string(),
            TodayReading::Counts(counts) => format_tray_label(&counts),
        })
    };

    if !watch {
        println!("{}", label(Utc::now())?);
        return Ok(());
    }

    let monitor = MonitorLoop::new(
        SystemClock,
        TokioSleeper,
        Duration::from_secs(config.tray.refresh_secs),
    );
    monitor
        .run(
            |_, now| {
                println!("{}", label(now)?);
                Ok(())
            },
            shutdown_signal(),
        )
        .await;

    Ok(())
}

fn run_subscription(input: Option<PathBuf>, json: bool) -> Result<()> {
    let raw = match input {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read the captured screen from stdin")?;
            buffer
        }
    };

    let parser = ScreenParser::new()?;
    let usage = parser.parse(&raw);
    if usage.is_none() {
        warn!("No usage percentages found in the captured screen");
    }

    let now = Utc::now();
    if json {
        let report = SubscriptionReport::new(&parser, usage, now);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_subscription(&parser, usage.as_ref(), now));
    }
    Ok(())
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
