use crate::engine::Engine;
use crate::stats::Accumulator;
use crate::types::{ExtinctionEvent, LifeCounters, ReproductionStats, SpeciesSummary};
use anyhow::{Context, Result};
use std::{fs::File, io::BufWriter, path::Path};

/// Quantity sampled from the engine once per simulated day.
pub trait Obs {
    fn update(&mut self, engine: &Engine);
    fn report(&self) -> serde_json::Value;
}

pub struct Populations {
    resources: Accumulator,
    prey: Accumulator,
    predators: Accumulator,
}

impl Populations {
    pub fn new() -> Self {
        Self {
            resources: Accumulator::new(),
            prey: Accumulator::new(),
            predators: Accumulator::new(),
        }
    }
}

impl Obs for Populations {
    fn update(&mut self, engine: &Engine) {
        let stats = engine.stats();
        self.resources.add(stats.resources as f64);
        self.prey.add(stats.prey.count as f64);
        self.predators.add(stats.predators.count as f64);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "populations": {
                "resources": self.resources.report(),
                "prey": self.prey.report(),
                "predators": self.predators.report(),
            }
        })
    }
}

/// Per-species averages; days where the species is absent are skipped.
struct TraitAccumulators {
    strength: Accumulator,
    stealth: Accumulator,
    learnability: Accumulator,
    longevity: Accumulator,
    energy_ratio: Accumulator,
}

impl TraitAccumulators {
    fn new() -> Self {
        Self {
            strength: Accumulator::new(),
            stealth: Accumulator::new(),
            learnability: Accumulator::new(),
            longevity: Accumulator::new(),
            energy_ratio: Accumulator::new(),
        }
    }

    fn add(&mut self, summary: &SpeciesSummary) {
        if summary.count == 0 {
            return;
        }
        self.strength.add(summary.avg_strength);
        self.stealth.add(summary.avg_stealth);
        self.learnability.add(summary.avg_learnability);
        self.longevity.add(summary.avg_longevity);
        self.energy_ratio.add(summary.avg_energy_ratio);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "strength": self.strength.report(),
            "stealth": self.stealth.report(),
            "learnability": self.learnability.report(),
            "longevity": self.longevity.report(),
            "energy_ratio": self.energy_ratio.report(),
        })
    }
}

pub struct AvgTraits {
    prey: TraitAccumulators,
    predators: TraitAccumulators,
}

impl AvgTraits {
    pub fn new() -> Self {
        Self {
            prey: TraitAccumulators::new(),
            predators: TraitAccumulators::new(),
        }
    }
}

impl Obs for AvgTraits {
    fn update(&mut self, engine: &Engine) {
        let stats = engine.stats();
        self.prey.add(&stats.prey);
        self.predators.add(&stats.predators);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "avg_traits": {
                "prey": self.prey.report(),
                "predators": self.predators.report(),
            }
        })
    }
}

pub struct BloomFraction {
    acc: Accumulator,
}

impl BloomFraction {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for BloomFraction {
    fn update(&mut self, engine: &Engine) {
        self.acc.add(if engine.is_resource_bloom() { 1.0 } else { 0.0 });
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "bloom_fraction": self.acc.report() })
    }
}

/// Births, deaths and extinctions since the segment started.
pub struct Events {
    start_tick: u64,
    start_life: ReproductionStats,
    life: ReproductionStats,
    extinctions: Vec<ExtinctionEvent>,
}

impl Events {
    pub fn new(engine: &Engine) -> Self {
        Self {
            start_tick: engine.ticks(),
            start_life: engine.reproduction_stats(),
            life: engine.reproduction_stats(),
            extinctions: Vec::new(),
        }
    }
}

fn counted_since(start: &LifeCounters, now: &LifeCounters) -> LifeCounters {
    LifeCounters {
        births: now.births.saturating_sub(start.births),
        exhaustion: now.exhaustion.saturating_sub(start.exhaustion),
        old_age: now.old_age.saturating_sub(start.old_age),
        starvation: now.starvation.saturating_sub(start.starvation),
        predation: now.predation.saturating_sub(start.predation),
    }
}

impl Obs for Events {
    fn update(&mut self, engine: &Engine) {
        self.life = engine.reproduction_stats();
        self.extinctions = engine
            .extinction_events()
            .iter()
            .filter(|event| event.tick >= self.start_tick)
            .cloned()
            .collect();
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "events": {
                "prey": counted_since(&self.start_life.prey, &self.life.prey),
                "predators": counted_since(&self.start_life.predators, &self.life.predators),
                "extinctions": self.extinctions,
            }
        })
    }
}

/// Collects daily samples over one segment and writes them as a JSON report.
pub struct Analyzer {
    start_day: u64,
    end_day: u64,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(engine: &Engine) -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(Populations::new()),
            Box::new(AvgTraits::new()),
            Box::new(BloomFraction::new()),
            Box::new(Events::new(engine)),
        ];
        Self {
            start_day: engine.days(),
            end_day: engine.days(),
            obs_ptr_vec,
        }
    }

    pub fn sample(&mut self, engine: &Engine) {
        self.end_day = engine.days();
        for obs in &mut self.obs_ptr_vec {
            obs.update(engine);
        }
    }

    pub fn report(&self) -> serde_json::Value {
        let observables: Vec<_> = self.obs_ptr_vec.iter().map(|obs| obs.report()).collect();
        serde_json::json!({
            "start_day": self.start_day,
            "end_day": self.end_day,
            "observables": observables,
        })
    }

    pub fn save_report<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.report()).context("failed to write report")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn engine() -> Engine {
        let mut cfg = Config::default();
        cfg.world.seed = Some(21);
        cfg.world.ticks_per_day = 20;
        let mut engine = Engine::new(cfg).unwrap();
        engine.initialize();
        engine.start();
        engine
    }

    #[test]
    fn report_covers_every_sampled_day() {
        let mut engine = engine();
        let mut analyzer = Analyzer::new(&engine);
        for _ in 0..5 {
            for _ in 0..20 {
                engine.update(1.0 / 60.0);
            }
            analyzer.sample(&engine);
        }

        let report = analyzer.report();
        assert_eq!(report["start_day"], 0);
        assert_eq!(report["end_day"], 5);
        let observables = report["observables"].as_array().unwrap();
        assert_eq!(observables.len(), 4);
        assert_eq!(observables[0]["populations"]["prey"]["n_vals"], 5);
        assert_eq!(
            observables[0]["populations"]["prey"]["last"],
            engine.stats().prey.count as f64
        );
    }

    #[test]
    fn events_count_only_this_segment() {
        let mut engine = engine();
        for _ in 0..200 {
            engine.update(1.0 / 60.0);
        }
        let before = engine.reproduction_stats();

        let mut events = Events::new(&engine);
        for _ in 0..200 {
            engine.update(1.0 / 60.0);
        }
        events.update(&engine);

        let report = events.report();
        let births = report["events"]["prey"]["births"].as_u64().unwrap();
        assert_eq!(births, engine.reproduction_stats().prey.births - before.prey.births);
    }

    #[test]
    fn absent_species_leave_trait_averages_empty() {
        let mut cfg = Config::default();
        cfg.predator.initial_count = 0;
        let mut engine = Engine::new(cfg).unwrap();
        engine.initialize();

        let mut traits = AvgTraits::new();
        traits.update(&engine);
        let report = traits.report();
        assert_eq!(report["avg_traits"]["predators"]["strength"]["n_vals"], 0);
        assert_eq!(report["avg_traits"]["prey"]["strength"]["n_vals"], 1);
    }
}
