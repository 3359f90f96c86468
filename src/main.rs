use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use dcatrack::cli::chart::ChartOptions;
use dcatrack::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for dcatrack::AppCommand {
    fn from(cmd: Commands) -> dcatrack::AppCommand {
        match cmd {
            Commands::Sync => dcatrack::AppCommand::Sync,
            Commands::Chart {
                asset,
                fiat,
                exchange,
                year,
                month,
                offline,
            } => dcatrack::AppCommand::Chart(ChartOptions {
                asset,
                fiat,
                exchange,
                year,
                month,
                offline,
            }),
            Commands::Summary => dcatrack::AppCommand::Summary,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch missing daily prices for every traded pair
    Sync,
    /// Show portfolio value, invested amount and ROI over time
    Chart {
        /// Chart a single asset instead of every asset of the fiat
        #[arg(short, long)]
        asset: Option<String>,
        /// Fiat to chart, defaults to the configured one
        #[arg(short, long)]
        fiat: Option<String>,
        /// Only count purchases made on this exchange
        #[arg(short, long)]
        exchange: Option<String>,
        /// Zoom into a year
        #[arg(short, long)]
        year: Option<i32>,
        /// Zoom into a month of --year
        #[arg(
            short,
            long,
            requires = "year",
            value_parser = clap::value_parser!(u32).range(1..=12)
        )]
        month: Option<u32>,
        /// Use cached prices only
        #[arg(long)]
        offline: bool,
    },
    /// Display holdings and monthly investment
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => dcatrack::cli::setup::setup(),
        Some(cmd) => dcatrack::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
