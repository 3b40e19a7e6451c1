use crate::config::{Config, LearningConfig};
use crate::model::Creature;
use crate::predator::Predator;
use crate::prey::Prey;
use crate::spawn::{self, CLUSTER_RADIUS};
use crate::types::{
    Bounds, DeathCause, EntityKind, EntitySnapshot, ExtinctionEvent, ReproductionStats, Resource,
    Species, SpeciesSummary, Stats, TotalSpawned, Trait, Traits, Vec2, nearest_within,
};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    ops::DerefMut,
    path::Path,
};

/// Oldest extinction events are dropped beyond this many.
const MAX_EXTINCTION_EVENTS: usize = 256;

/// Spawned creatures get a max energy within these multiples of the default.
const MIN_SPAWN_ENERGY_FACTOR: f64 = 0.5;
const MAX_SPAWN_ENERGY_FACTOR: f64 = 2.0;

/// Size range of the resource clusters that appear during a bloom.
const BLOOM_BATCH_MIN: usize = 2;
const BLOOM_BATCH_MAX: usize = 4;

/// Simulation engine.
///
/// Owns the configuration, the three entity collections and the random
/// number generator, and advances the ecosystem one tick at a time.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    bounds: Bounds,
    rng: ChaCha12Rng,
    resources: Vec<Resource>,
    prey: Vec<Prey>,
    predators: Vec<Predator>,
    running: bool,
    ticks: u64,
    days: u64,
    bloom_ticks_left: u64,
    next_id: u64,
    last_prey_count: usize,
    last_predator_count: usize,
    extinction_events: Vec<ExtinctionEvent>,
    total_spawned: TotalSpawned,
    life: ReproductionStats,
}

impl Engine {
    /// Create an empty, paused engine.
    ///
    /// The generator is seeded from `world.seed` when set, otherwise from the OS.
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;
        let rng = match cfg.world.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng().context("failed to seed generator")?,
        };
        let bounds = Bounds::new(cfg.world.width, cfg.world.height);
        Ok(Self {
            cfg,
            bounds,
            rng,
            resources: Vec::new(),
            prey: Vec::new(),
            predators: Vec::new(),
            running: false,
            ticks: 0,
            days: 0,
            bloom_ticks_left: 0,
            next_id: 0,
            last_prey_count: 0,
            last_predator_count: 0,
            extinction_events: Vec::new(),
            total_spawned: TotalSpawned::default(),
            life: ReproductionStats::default(),
        })
    }

    /// Clear the world and spawn the configured initial populations.
    pub fn initialize(&mut self) {
        self.resources.clear();
        self.prey.clear();
        self.predators.clear();
        self.ticks = 0;
        self.days = 0;
        self.bloom_ticks_left = 0;
        self.extinction_events.clear();
        self.total_spawned = TotalSpawned::default();
        self.life = ReproductionStats::default();

        self.spawn_resources(self.cfg.resource.initial_count);
        self.spawn_prey(self.cfg.prey.initial_count, true);
        self.spawn_predators(self.cfg.predator.initial_count, true);

        self.last_prey_count = self.prey.len();
        self.last_predator_count = self.predators.len();
        log::debug!(
            "initialized {} resources, {} prey, {} predators",
            self.resources.len(),
            self.prey.len(),
            self.predators.len()
        );
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pause and reinitialize.
    pub fn reset(&mut self) {
        self.pause();
        self.initialize();
    }

    pub fn spawn_prey(&mut self, count: usize, clustered: bool) {
        self.spawn_population(Species::Prey, count, clustered);
    }

    pub fn spawn_predators(&mut self, count: usize, clustered: bool) {
        self.spawn_population(Species::Predator, count, clustered);
    }

    /// Scatter `count` base-energy resources uniformly over the world.
    pub fn spawn_resources(&mut self, count: usize) {
        let energy = self.cfg.resource.energy;
        for _ in 0..count {
            let pos = self.bounds.random_point(&mut self.rng);
            self.add_resource(pos, energy);
        }
    }

    /// Advance the simulation by one tick of `dt` seconds.
    ///
    /// Does nothing while paused. `dt` is clamped to `[0, max_delta_time]`;
    /// non-finite values count as zero. The day clock counts ticks, not time.
    pub fn update(&mut self, dt: f64) {
        if !self.running {
            return;
        }
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.cfg.world.max_delta_time)
        } else {
            0.0
        };

        self.update_creatures(dt);
        self.consume_resources();
        self.resolve_predation();
        self.reproduce();
        self.learn();
        self.remove_dead();
        self.regenerate_resources();
        self.check_extinctions();
        self.advance_clock();
    }

    /// Flat snapshot of every entity: resources, then prey, then predators.
    pub fn all_entities(&self) -> Vec<EntitySnapshot> {
        let mut entities =
            Vec::with_capacity(self.resources.len() + self.prey.len() + self.predators.len());
        entities.extend(self.resources.iter().map(|resource| EntitySnapshot {
            id: resource.body.id,
            kind: EntityKind::Resource,
            pos: resource.body.pos,
            velocity: Vec2::ZERO,
            energy: resource.energy(),
            max_energy: resource.body.max_energy(),
            age: 0.0,
            traits: None,
        }));
        entities.extend(self.prey.iter().map(|prey| prey.snapshot()));
        entities.extend(self.predators.iter().map(|predator| predator.snapshot()));
        entities
    }

    pub fn stats(&self) -> Stats {
        Stats {
            day: self.days,
            resources: self.resources.len(),
            prey: summarize(self.prey.iter().map(|prey| &**prey)),
            predators: summarize(self.predators.iter().map(|predator| &**predator)),
            bloom: self.is_resource_bloom(),
        }
    }

    pub fn days(&self) -> u64 {
        self.days
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn extinction_events(&self) -> &[ExtinctionEvent] {
        &self.extinction_events
    }

    pub fn total_spawned(&self) -> TotalSpawned {
        self.total_spawned
    }

    pub fn is_resource_bloom(&self) -> bool {
        self.bloom_ticks_left > 0
    }

    pub fn reproduction_stats(&self) -> ReproductionStats {
        self.life
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn prey(&self) -> &[Prey] {
        &self.prey
    }

    pub fn predators(&self) -> &[Predator] {
        &self.predators
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn spawn_population(&mut self, species: Species, count: usize, clustered: bool) {
        if !clustered {
            for _ in 0..count {
                let pos = self.bounds.random_point(&mut self.rng);
                let traits = spawn::random_traits(&mut self.rng);
                self.add_creature(species, pos, traits, 1.0);
            }
            return;
        }

        for (archetype, n_members) in spawn::partition(count) {
            let center = self.bounds.random_point(&mut self.rng);
            for _ in 0..n_members {
                let offset = Vec2::random_in_disc(&mut self.rng, CLUSTER_RADIUS);
                let pos = self.bounds.wrap(center + offset);
                let (traits, energy_factor) = archetype.sample(&mut self.rng);
                self.add_creature(species, pos, traits, energy_factor);
            }
        }
    }

    fn add_creature(&mut self, species: Species, pos: Vec2, traits: Traits, energy_factor: f64) {
        let id = self.next_id();
        let species_cfg = match species {
            Species::Prey => &self.cfg.prey,
            Species::Predator => &self.cfg.predator,
        };
        let max_energy = (species_cfg.max_energy * energy_factor).clamp(
            MIN_SPAWN_ENERGY_FACTOR * species_cfg.max_energy,
            MAX_SPAWN_ENERGY_FACTOR * species_cfg.max_energy,
        );
        let mut creature = Creature::new(id, species, pos, traits, max_energy, species_cfg);
        creature.velocity = Vec2::random_unit(&mut self.rng) * species_cfg.wander_speed;

        match species {
            Species::Prey => {
                self.prey.push(Prey::new(creature));
                self.total_spawned.prey += 1;
            }
            Species::Predator => {
                self.predators.push(Predator::new(creature));
                self.total_spawned.predators += 1;
            }
        }
    }

    fn add_resource(&mut self, pos: Vec2, energy: f64) {
        let id = self.next_id();
        self.resources.push(Resource::new(id, pos, energy));
        self.total_spawned.resources += 1;
    }

    /// Spawn up to `count` resources around `center`, stopping at the cap.
    ///
    /// Returns the number actually spawned.
    fn spawn_cluster(&mut self, center: Vec2, count: usize, radius: f64, energy: f64) -> usize {
        let room = self
            .cfg
            .resource
            .max_resources
            .saturating_sub(self.resources.len());
        let count = count.min(room);
        for _ in 0..count {
            let offset = Vec2::random_in_disc(&mut self.rng, radius);
            self.add_resource(self.bounds.wrap(center + offset), energy);
        }
        count
    }

    fn update_creatures(&mut self, dt: f64) {
        for i_prey in 0..self.prey.len() {
            if !self.prey[i_prey].is_alive() {
                continue;
            }
            let steering = self.prey[i_prey].steer(
                &self.predators,
                &self.resources,
                &self.cfg,
                &self.bounds,
                dt,
                &mut self.rng,
            );
            self.prey[i_prey].act(steering, dt, &self.cfg.prey, &self.bounds, &mut self.rng);
        }

        for i_pred in 0..self.predators.len() {
            if !self.predators[i_pred].is_alive() {
                continue;
            }
            let steering = self.predators[i_pred].steer(
                i_pred,
                &self.predators,
                &self.prey,
                &self.cfg,
                &self.bounds,
                dt,
                &mut self.rng,
            );
            self.predators[i_pred].act(
                steering,
                dt,
                &self.cfg.predator,
                &self.bounds,
                &mut self.rng,
            );
        }
    }

    fn consume_resources(&mut self) {
        let behavior = &self.cfg.prey_behavior;
        let mut any_eaten = false;

        for prey in &mut self.prey {
            if !prey.is_alive() || prey.body.energy_ratio() >= behavior.satiation {
                continue;
            }
            if prey.predator_within(&self.predators, behavior.caution_range, &self.bounds) {
                continue;
            }
            let Some(i_resource) =
                prey.nearest_resource(&self.resources, behavior.feeding_radius, &self.bounds)
            else {
                continue;
            };
            let resource = &mut self.resources[i_resource];
            resource.body.kill();
            prey.body.add_energy(resource.energy());
            any_eaten = true;
        }

        if any_eaten {
            self.resources.retain(|resource| resource.body.is_alive());
        }
    }

    fn resolve_predation(&mut self) {
        let behavior = &self.cfg.predator_behavior;

        for predator in &mut self.predators {
            if !predator.is_alive() || predator.body.energy_ratio() >= behavior.satiation {
                continue;
            }
            let Some(i_prey) = nearest_within(
                self.prey.iter().map(|prey| {
                    let distance = self.bounds.distance(predator.pos(), prey.pos());
                    (prey.is_alive(), distance)
                }),
                behavior.catch_radius,
            ) else {
                continue;
            };
            let prey = &mut self.prey[i_prey];

            if !predator.can_catch_prey(prey, &mut self.rng) {
                continue;
            }
            if prey.can_escape_with_stealth(predator, &self.cfg, &mut self.rng) {
                log::trace!("prey {} escaped predator {}", prey.id(), predator.id());
                continue;
            }

            let gain = prey.body.energy() * behavior.energy_gain_from_prey;
            prey.die(DeathCause::Predation);
            predator.body.add_energy(gain);
        }
    }

    fn reproduce(&mut self) {
        // Offspring join only after both scans, so newborns never breed this tick.
        let prey_parents: Vec<usize> = (0..self.prey.len())
            .filter(|&i_prey| self.prey[i_prey].can_reproduce(&self.cfg.prey))
            .collect();
        let predator_parents: Vec<usize> = (0..self.predators.len())
            .filter(|&i_pred| self.predators[i_pred].can_reproduce(&self.cfg.predator))
            .collect();

        let mut prey_born = Vec::with_capacity(prey_parents.len());
        for i_prey in prey_parents {
            let id = self.next_id();
            let child = self.prey[i_prey].reproduce(id, &self.cfg, &self.bounds, &mut self.rng);
            prey_born.push(child);
        }
        let mut predators_born = Vec::with_capacity(predator_parents.len());
        for i_pred in predator_parents {
            let id = self.next_id();
            let child =
                self.predators[i_pred].reproduce(id, &self.cfg, &self.bounds, &mut self.rng);
            predators_born.push(child);
        }

        let n_prey = prey_born.len() as u64;
        let n_predators = predators_born.len() as u64;
        self.life.prey.births += n_prey;
        self.life.predators.births += n_predators;
        self.total_spawned.prey += n_prey;
        self.total_spawned.predators += n_predators;
        self.prey.extend(prey_born);
        self.predators.extend(predators_born);
    }

    fn learn(&mut self) {
        learn_from_peers(&mut self.prey, &self.cfg.learning, &mut self.rng);
        learn_from_peers(&mut self.predators, &self.cfg.learning, &mut self.rng);
    }

    fn remove_dead(&mut self) {
        let mut remains = Vec::new();

        for prey in self.prey.iter().filter(|prey| !prey.is_alive()) {
            let cause = prey.death_cause().unwrap_or(DeathCause::Exhaustion);
            self.life.prey.record_death(cause);
            remains.push((prey.pos(), prey.body.max_energy(), self.cfg.prey.remains_radius));
        }
        for predator in self.predators.iter().filter(|predator| !predator.is_alive()) {
            let cause = predator.death_cause().unwrap_or(DeathCause::Exhaustion);
            self.life.predators.record_death(cause);
            remains.push((
                predator.pos(),
                predator.body.max_energy(),
                self.cfg.predator.remains_radius,
            ));
        }
        if remains.is_empty() {
            return;
        }

        self.prey.retain(|prey| prey.is_alive());
        self.predators.retain(|predator| predator.is_alive());

        let energy = self.cfg.resource.energy;
        let fraction = self.cfg.resource.remains_fraction;
        for (pos, max_energy, radius) in remains {
            for _ in 0..remains_count(max_energy, fraction, energy) {
                let offset = Vec2::random_in_disc(&mut self.rng, radius);
                self.add_resource(self.bounds.wrap(pos + offset), energy);
            }
        }
    }

    fn regenerate_resources(&mut self) {
        if self.prey.is_empty() {
            let decay_chance = self.cfg.resource.decay_chance;
            if !self.resources.is_empty() && self.rng.random::<f64>() < decay_chance {
                let i_resource = self.rng.random_range(0..self.resources.len());
                self.resources.remove(i_resource);
            }
            return;
        }

        let res = self.cfg.resource.clone();
        if self.is_resource_bloom() {
            if self.rng.random::<f64>() < res.bloom_spawn_chance {
                let center = self.bounds.random_point(&mut self.rng);
                let size = self.rng.random_range(BLOOM_BATCH_MIN..=BLOOM_BATCH_MAX);
                let energy = res.energy * res.bloom_energy_bonus;
                self.spawn_cluster(center, size, res.bloom_cluster_radius, energy);
            }
        } else if self.rng.random::<f64>() < res.spawn_chance {
            let center = self.bounds.random_point(&mut self.rng);
            self.spawn_cluster(center, 1, 0.0, res.energy);
        }

        let threshold = res.recovery_threshold * self.cfg.prey.initial_count as f64;
        if (self.prey.len() as f64) < threshold && self.rng.random::<f64>() < res.recovery_chance {
            let center = self.bounds.random_point(&mut self.rng);
            let energy = res.energy * res.recovery_energy_multiplier;
            let n_spawned = self.spawn_cluster(
                center,
                res.recovery_cluster_size,
                res.bloom_cluster_radius,
                energy,
            );
            log::debug!(
                "recovery cluster of {n_spawned} resources with {} prey left",
                self.prey.len()
            );
        }
    }

    fn check_extinctions(&mut self) {
        let n_prey = self.prey.len();
        let n_predators = self.predators.len();
        if self.last_prey_count > 0 && n_prey == 0 {
            self.record_extinction(Species::Prey);
        }
        if self.last_predator_count > 0 && n_predators == 0 {
            self.record_extinction(Species::Predator);
        }
        self.last_prey_count = n_prey;
        self.last_predator_count = n_predators;
    }

    fn record_extinction(&mut self, species: Species) {
        let event = ExtinctionEvent {
            species,
            day: self.days,
            tick: self.ticks,
            prey: self.prey.len(),
            predators: self.predators.len(),
            resources: self.resources.len(),
        };
        log::info!("{species:?} went extinct on day {}", self.days);
        if self.extinction_events.len() >= MAX_EXTINCTION_EVENTS {
            self.extinction_events.remove(0);
        }
        self.extinction_events.push(event);
    }

    fn advance_clock(&mut self) {
        self.ticks += 1;

        if self.bloom_ticks_left > 0 {
            self.bloom_ticks_left -= 1;
            if self.bloom_ticks_left == 0 {
                log::info!("resource bloom ended on day {}", self.days);
            }
        }

        if self.ticks % self.cfg.world.ticks_per_day == 0 {
            self.days += 1;
            if self.days % self.cfg.world.season_length_days == 0 {
                self.start_bloom();
            }
        }
    }

    fn start_bloom(&mut self) {
        let res = self.cfg.resource.clone();
        self.bloom_ticks_left = self.cfg.world.bloom_duration_ticks;

        let mut n_spawned = 0;
        for _ in 0..res.bloom_centers {
            let center = self.bounds.random_point(&mut self.rng);
            n_spawned += self.spawn_cluster(
                center,
                res.primary_cluster_size,
                res.primary_cluster_radius,
                res.energy * res.primary_energy_multiplier,
            );
            n_spawned += self.spawn_cluster(
                center,
                res.secondary_cluster_size,
                res.secondary_cluster_radius,
                res.energy * res.secondary_energy_multiplier,
            );
        }
        log::info!("resource bloom started on day {}: {n_spawned} resources", self.days);
    }
}

/// Number of resources a corpse of `max_energy` leaves behind.
pub fn remains_count(max_energy: f64, fraction: f64, resource_energy: f64) -> usize {
    let exact = fraction * max_energy / resource_energy;
    // Absorb rounding error so exact multiples don't gain a resource.
    (exact - 1e-9).ceil().max(0.0) as usize
}

fn summarize<'a>(creatures: impl Iterator<Item = &'a Creature>) -> SpeciesSummary {
    let mut summary = SpeciesSummary::default();
    for creature in creatures {
        summary.count += 1;
        summary.avg_strength += creature.traits.strength;
        summary.avg_stealth += creature.traits.stealth;
        summary.avg_learnability += creature.traits.learnability;
        summary.avg_longevity += creature.traits.longevity;
        summary.avg_energy_ratio += creature.body.energy_ratio();
    }
    if summary.count > 0 {
        let n = summary.count as f64;
        summary.avg_strength /= n;
        summary.avg_stealth /= n;
        summary.avg_learnability /= n;
        summary.avg_longevity /= n;
        summary.avg_energy_ratio /= n;
    }
    summary
}

/// Let each creature copy part of a random peer's better trait.
///
/// Learnability itself is never learned.
fn learn_from_peers<C, R>(group: &mut [C], cfg: &LearningConfig, rng: &mut R)
where
    C: DerefMut<Target = Creature>,
    R: Rng,
{
    let n_members = group.len();
    if n_members < 2 {
        return;
    }

    for i_learner in 0..n_members {
        if !group[i_learner].is_alive() {
            continue;
        }
        let learnability = group[i_learner].traits.learnability;
        if rng.random::<f64>() >= learnability * cfg.chance_factor {
            continue;
        }

        let mut i_peer = rng.random_range(0..n_members - 1);
        if i_peer >= i_learner {
            i_peer += 1;
        }
        if !group[i_peer].is_alive() {
            continue;
        }

        let which = Trait::LEARNABLE[rng.random_range(0..Trait::LEARNABLE.len())];
        let own = group[i_learner].traits.get(which);
        let diff = group[i_peer].traits.get(which) - own;
        if diff <= 0.0 {
            continue;
        }

        let amount = (diff * learnability * cfg.rate).min(cfg.max_gain);
        let learner = &mut group[i_learner];
        learner.traits.set(which, own + amount);
        learner.spend_energy(amount * cfg.energy_cost);
    }
}
