use std::path::PathBuf;

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use plasmid_lm::{Pipeline, Stage, load_pipeline_config};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fetch, filter, cluster and split plasmid sequences for language model training"
)]
struct Cli {
    #[command(flatten)]
    args: PrepareArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(ClapArgs, Debug)]
struct PrepareArgs {
    /// Additional configuration files applied in order (later files override earlier ones).
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Vec<PathBuf>,
    /// Override the configured work directory.
    #[arg(long, value_name = "DIR", global = true)]
    work_dir: Option<PathBuf>,
    /// Re-run every stage even when cached outputs are current.
    #[arg(long, global = true)]
    force: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Download the dataset into the work directory.
    Fetch,
    /// Fetch, then apply the sequence filters.
    Filter,
    /// Filter, then cluster with the configured tool.
    Cluster,
    /// Cluster, then write train/val/test splits.
    Split,
    /// Run every stage, including token export when enabled.
    All,
}

impl Command {
    fn stage(self) -> Stage {
        match self {
            Command::Fetch => Stage::Fetch,
            Command::Filter => Stage::Filter,
            Command::Cluster => Stage::Cluster,
            Command::Split => Stage::Split,
            Command::All => Stage::Export,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config_paths = vec![PathBuf::from("config/base.toml")];
    config_paths.extend(cli.args.config.clone());
    let mut config = load_pipeline_config(&config_paths)?;
    if let Some(work_dir) = cli.args.work_dir.clone() {
        config.work_dir = work_dir;
    }

    let until = cli.command.unwrap_or(Command::All).stage();
    let pipeline = Pipeline::new(&config).force(cli.args.force);

    let manifest = pipeline.run(until)?;

    for outcome in &manifest.stages {
        info!(
            "{:?}: {} records{}",
            outcome.stage,
            outcome.records,
            if outcome.cached { " (cached)" } else { "" }
        );
    }
    if let Some(split) = &manifest.split {
        for summary in &split.splits {
            println!(
                "{:<5} {:>8} records {:>8} clusters {:>12} bp",
                summary.split.name(),
                summary.records,
                summary.clusters,
                summary.bases
            );
        }
    }
    println!("{}", pipeline.paths().run_manifest().display());

    Ok(())
}
