use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use most_read::simulate::{simulate, SimulationOptions};
use most_read::{CliArgs, Config, MostRead};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "most-read")]
#[command(about = "Write-behind page hit counters and a cached most-read listing")]
struct Cli {
    #[arg(short, long, help = "Increase verbosity")]
    verbose: bool,

    #[arg(short, long, env = "MOST_READ_CONFIG", help = "Path to a TOML or JSON config file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Flush after this many hits")]
    flush_after_x_hits: Option<u64>,

    #[arg(long, help = "Flush claim grace period in milliseconds")]
    flush_grace_period_ms: Option<u64>,

    #[arg(long, help = "Number of items in the listing")]
    posts_to_display: Option<usize>,

    #[arg(long, help = "Listing window in days")]
    most_read_in_x_days: Option<u32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Drive concurrent hit traffic against in-process backends
    Simulate {
        #[arg(long, default_value_t = 1_000)]
        hits: u64,
        #[arg(long, default_value_t = 20)]
        items: u64,
        #[arg(long, default_value_t = 8)]
        workers: usize,
    },
    /// Print the listing for an empty in-process store
    Render,
    /// Print the effective configuration as TOML
    Config,
}

impl Cli {
    fn overrides(&self) -> CliArgs {
        CliArgs {
            config_file: self.config.clone(),
            flush_after_x_hits: self.flush_after_x_hits,
            flush_grace_period_ms: self.flush_grace_period_ms,
            posts_to_display: self.posts_to_display,
            most_read_in_x_days: self.most_read_in_x_days,
            log_level: self.verbose.then(|| "debug".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_with_cli(&cli.overrides()).context("Failed to load configuration")?;

    let level = config
        .logging
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command.unwrap_or(Command::Simulate {
        hits: 1_000,
        items: 20,
        workers: 8,
    }) {
        Command::Simulate {
            hits,
            items,
            workers,
        } => {
            let opts = SimulationOptions {
                hits,
                items,
                workers,
            };
            let report = simulate(&config, &opts)
                .await
                .context("Simulation failed")?;
            println!(
                "sent={} recorded={} flushes={} persisted={} pending={}",
                report.sent, report.recorded, report.flushes, report.persisted, report.pending
            );
            print!("{}", report.listing);
        }
        Command::Render => {
            let (app, _store) = MostRead::in_memory(&config).context("Invalid configuration")?;
            print!("{}", app.listing.get_rendering().await);
        }
        Command::Config => {
            config.validate().context("Invalid configuration")?;
            let rendered = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            print!("{rendered}");
        }
    }

    Ok(())
}
