use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ecosim::Manager;
use std::path::PathBuf;

/// Predator-prey-resource ecosystem simulator.
///
/// Each run lives in `SIM_DIR/run-NNNN` and grows by one segment of
/// `output.days_per_segment` simulated days per `create` or `resume`.
/// Every segment writes a JSON report next to the run's checkpoint.
#[derive(Debug, Parser)]
#[command(version, after_help = "Example: ecosim --sim-dir sims/meadow create")]
struct CLI {
    /// Directory holding `config.toml` and the run directories.
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new run and simulate one segment.
    Create,

    /// Simulate one more segment of an existing run.
    Resume {
        /// Index of the run, as in `run-NNNN`.
        #[arg(long)]
        run_idx: usize,
    },

    /// Remove all runs.
    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::debug!("{args:#?}");

    let mgr = Manager::new(&args.sim_dir).context("failed to construct mgr")?;
    let cfg = mgr.config();
    log::info!(
        "{:?}: {}x{} world, {} prey, {} predators, {} days per segment",
        args.sim_dir,
        cfg.world.width,
        cfg.world.height,
        cfg.prey.initial_count,
        cfg.predator.initial_count,
        cfg.output.days_per_segment,
    );

    match args.command {
        Command::Create => mgr.create_run().context("failed to create run")?,
        Command::Resume { run_idx } => mgr
            .resume_run(run_idx)
            .with_context(|| format!("failed to resume run {run_idx}"))?,
        Command::Clean => mgr.clean_sim().context("failed to clean sim dir")?,
    }

    Ok(())
}
