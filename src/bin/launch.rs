use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plasmid_lm::pipeline::WorkPaths;
use plasmid_lm::split::MANIFEST_FILE;
use plasmid_lm::{
    SbatchSubmitter, Submitter, load_pipeline_config, render_batch_script, write_batch_script,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Render and submit the plasmid LM training job")]
struct Cli {
    #[command(flatten)]
    args: LaunchArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct LaunchArgs {
    /// Additional configuration files applied in order (later files override earlier ones).
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Vec<PathBuf>,
    /// Directory holding the prepared splits (defaults to `<work_dir>/splits`).
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,
    /// Where to write the batch script (defaults to `<work_dir>/train_job.sh`).
    #[arg(long, value_name = "PATH", global = true)]
    script: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the batch script without submitting it.
    Render,
    /// Write the batch script and hand it to sbatch.
    Submit {
        /// Print the script instead of submitting it.
        #[arg(long)]
        dry_run: bool,
        /// Scheduler submission command.
        #[arg(long, value_name = "PATH", default_value = "sbatch")]
        sbatch: PathBuf,
    },
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
    let config = load_pipeline_config(&config_paths)?;
    let paths = WorkPaths::new(&config.work_dir);

    let data_dir = cli.args.data_dir.clone().unwrap_or_else(|| paths.split_dir());
    if !data_dir.join(MANIFEST_FILE).is_file() {
        warn!(
            "{} has no {MANIFEST_FILE}; run `prepare` before the job starts",
            data_dir.display()
        );
    }
    let data_dir = if data_dir.is_absolute() {
        data_dir
    } else {
        std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(data_dir)
    };

    let script_path = cli
        .args
        .script
        .clone()
        .unwrap_or_else(|| paths.root.join("train_job.sh"));
    let script = render_batch_script(&config.job, &data_dir)?;

    match cli.command {
        Command::Render => {
            write_batch_script(&script_path, &script)?;
            info!("wrote {}", script_path.display());
            println!("{}", script_path.display());
        }
        Command::Submit { dry_run: true, .. } => {
            print!("{script}");
        }
        Command::Submit { sbatch, .. } => {
            write_batch_script(&script_path, &script)?;
            let job_id = SbatchSubmitter::new(sbatch).submit(&script_path)?;
            println!("{job_id}");
        }
    }

    Ok(())
}
