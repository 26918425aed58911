//! SupplySense operations command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ops::{
    config::Profile,
    deploy::{self, DeployOpts},
    seed::{self, SeedData, SeedOpts},
    teardown::{self, TeardownOpts},
};

/// Region used when neither `--region` nor `AWS_REGION` is set.
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Parser)]
#[command(
    name = "supplysense-ops",
    version,
    about = "Operate the SupplySense deployment: teardown, seed, deploy"
)]
struct Cli {
    /// Sets the verbosity level.
    #[arg(short, action = clap::ArgAction::Count)]
    verbosity: u8,

    /// Path to a JSON deployment profile; defaults cover the stock
    /// SupplySense deployment.
    #[arg(long)]
    profile: Option<PathBuf>,

    /// AWS region; falls back to AWS_REGION, then us-east-1.
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remove every SupplySense resource, including those CloudFormation
    /// cannot delete on its own.
    Teardown {
        /// Enable destructive deletes. Without this the run only prints
        /// what would be removed.
        #[arg(long, short)]
        force: bool,

        /// Leave the DynamoDB tables (and their data) in place.
        #[arg(long)]
        skip_tables: bool,
    },
    /// Seed the DynamoDB tables with sample supply-chain data.
    Seed {
        /// Overwrite existing data in tables.
        #[arg(long, short)]
        force: bool,

        /// Path to the JSON dataset.
        #[arg(long, default_value = "data/mock-data.json")]
        data: PathBuf,
    },
    /// Deploy the complete system: infrastructure, data, agents and UI.
    Deploy {
        /// Skip prerequisite checks.
        #[arg(long)]
        skip_prerequisites: bool,

        /// Skip infrastructure deployment.
        #[arg(long)]
        skip_infrastructure: bool,

        /// Skip the UI build.
        #[arg(long)]
        skip_ui: bool,

        /// Path to the JSON dataset used for seeding.
        #[arg(long, default_value = "data/mock-data.json")]
        data: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("ops", level)
        .filter_module("supplysense_ops", level)
        .init();

    let profile = match &cli.profile {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };

    let region = cli.region.clone().unwrap_or_else(|| {
        log::debug!("no region configured, defaulting to {DEFAULT_REGION}");
        DEFAULT_REGION.to_owned()
    });
    let sdk_cfg = aws_config::from_env()
        .region(aws_config::Region::new(region))
        .load()
        .await;

    match cli.command {
        Command::Teardown { force, skip_tables } => {
            let report = teardown::run(
                &sdk_cfg,
                &profile,
                &TeardownOpts { force, skip_tables },
            )
            .await?;
            // Partial failures are reported but do not fail the run.
            if !report.is_clean() {
                log::warn!("teardown finished with {} failure(s)", report.failed.len());
            }
        }
        Command::Seed { force, data } => {
            let data = SeedData::load(data)?;
            seed::run(
                &sdk_cfg,
                &profile,
                &data,
                SeedOpts {
                    force,
                    verbose: cli.verbosity > 0,
                },
            )
            .await?;
        }
        Command::Deploy {
            skip_prerequisites,
            skip_infrastructure,
            skip_ui,
            data,
        } => {
            let data = SeedData::load(data)?;
            deploy::run(
                &sdk_cfg,
                &profile,
                &data,
                &DeployOpts {
                    skip_prerequisites,
                    skip_infrastructure,
                    skip_ui,
                },
            )
            .await?;
        }
    }

    Ok(())
}
