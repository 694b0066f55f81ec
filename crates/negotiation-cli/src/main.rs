mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::env;
use std::process;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use commands::plan::PlanArgs;
use commands::present_value::PresentValueArgs;
use commands::schedule::ScheduleArgs;
use commands::simulate::SimulateArgs;
use commands::validate::ValidateArgs;

/// Payment plan pricing and negotiation allocation
#[derive(Parser)]
#[command(
    name = "negot",
    version,
    about = "Payment plan pricing and negotiation allocation",
    long_about = "A CLI for splitting a negotiated sale across payment instruments \
                  with decimal precision. Prices installment plans, builds due-date \
                  calendars, validates saved negotiations and replays edit scripts \
                  through the redistribution engine."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Present value of a single amount due in N periods
    PresentValue(PresentValueArgs),
    /// Price an installment plan (installment value, PV, implied discount)
    Plan(PlanArgs),
    /// Build the installment calendar of an instrument
    Schedule(ScheduleArgs),
    /// Run every validator over a saved negotiation
    Validate(ValidateArgs),
    /// Replay a script of edits against a negotiation
    Simulate(SimulateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if env_bool("NEGOT_LOG_JSON", false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::PresentValue(args) => commands::present_value::run_present_value(args),
        Commands::Plan(args) => commands::plan::run_plan(args),
        Commands::Schedule(args) => commands::schedule::run_schedule(args),
        Commands::Validate(args) => commands::validate::run_validate(args),
        Commands::Simulate(args) => commands::simulate::run_simulate(args),
        Commands::Version => {
            println!("negot {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
