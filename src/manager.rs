use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::Engine;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Simulation directory layout:
///
/// ```text
/// DIR/config.toml
/// DIR/run-NNNN/checkpoint.msgpack
/// DIR/run-NNNN/report-NNNN.json
/// ```
pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::debug!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Start a new run from the configured initial populations.
    pub fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let mut engine = Engine::new(self.cfg.clone()).context("failed to construct engine")?;
        engine.initialize();

        self.run_segment(run_idx, &mut engine)
            .context("failed to run segment")
    }

    /// Continue an existing run from its checkpoint.
    pub fn resume_run(&self, run_idx: usize) -> Result<()> {
        let checkpoint_file = self.checkpoint_file(run_idx);
        let mut engine = Engine::load_checkpoint(&checkpoint_file)
            .with_context(|| format!("failed to load {checkpoint_file:?}"))?;
        if engine.config() != &self.cfg {
            bail!("checkpoint config differs from the current config");
        }
        log::info!("loaded {checkpoint_file:?}");

        self.run_segment(run_idx, &mut engine)
            .context("failed to run segment")
    }

    /// Remove every run directory.
    pub fn clean_sim(&self) -> Result<()> {
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }
        Ok(())
    }

    fn run_segment(&self, run_idx: usize, engine: &mut Engine) -> Result<()> {
        let report_idx = self
            .count_report_files(run_idx)
            .context("failed to count report files")?;

        let mut analyzer = Analyzer::new(engine);
        let n_days = self.cfg.output.days_per_segment;
        let dt = self.cfg.output.delta_time;

        engine.start();
        for i_day in 0..n_days {
            for _ in 0..self.cfg.world.ticks_per_day {
                engine.update(dt);
            }
            analyzer.sample(engine);

            let stats = engine.stats();
            let progress = 100.0 * (i_day + 1) as f64 / n_days as f64;
            log::info!(
                "completed {progress:06.2}% (day {}: {} prey, {} predators, {} resources)",
                stats.day,
                stats.prey.count,
                stats.predators.count,
                stats.resources
            );
        }
        engine.pause();

        analyzer
            .save_report(self.report_file(run_idx, report_idx))
            .context("failed to save report")?;

        engine
            .save_checkpoint(self.checkpoint_file(run_idx))
            .context("failed to save checkpoint")?;

        Ok(())
    }

    fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let run_dirs = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        Ok(run_dirs)
    }

    fn count_run_dirs(&self) -> Result<usize> {
        Ok(self.run_dirs()?.len())
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn count_report_files(&self, run_idx: usize) -> Result<usize> {
        let pattern = self.run_dir(run_idx).join("report-*.json");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob report files")?
            .filter_map(Result::ok)
            .count();
        Ok(count)
    }

    fn checkpoint_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("checkpoint.msgpack")
    }

    fn report_file(&self, run_idx: usize, report_idx: usize) -> PathBuf {
        self.run_dir(run_idx)
            .join(format!("report-{report_idx:04}.json"))
    }
}
