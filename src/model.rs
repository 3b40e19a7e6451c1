//! Creature state shared by both species: movement, metabolism, ageing,
//! starvation and inheritance.

use crate::config::{GeneticsConfig, SpeciesConfig, StarvationThreshold};
use crate::types::{
    Body, Bounds, DeathCause, EntityKind, EntitySnapshot, Species, Trait, Traits, Vec2,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Seconds of lifespan every creature gets regardless of longevity.
const BASE_LIFESPAN: f64 = 60.0;
/// Extra seconds of lifespan at full longevity.
const LONGEVITY_LIFESPAN: f64 = 40.0;

/// Offspring max energy stays within these multiples of the species default.
const MIN_MAX_ENERGY_FACTOR: f64 = 0.5;
const MAX_MAX_ENERGY_FACTOR: f64 = 2.0;

/// Movement decision made by a species behaviour step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Steering {
    pub velocity: Vec2,
    /// Extra activity cost per second for this tick.
    pub surcharge: f64,
}

impl Steering {
    pub fn moving(velocity: Vec2) -> Self {
        Self {
            velocity,
            surcharge: 0.0,
        }
    }
}

/// A moving, ageing, metabolising agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creature {
    pub body: Body,
    pub species: Species,
    /// Heading scaled by the current speed factor; set by the species step.
    pub velocity: Vec2,
    pub speed: f64,
    /// Age in seconds.
    pub age: f64,
    pub traits: Traits,
    since_reproduction: f64,
    death: Option<DeathCause>,
}

impl Creature {
    /// Create a creature at half of its maximum energy.
    pub fn new(
        id: u64,
        species: Species,
        pos: Vec2,
        traits: Traits,
        max_energy: f64,
        cfg: &SpeciesConfig,
    ) -> Self {
        Self {
            body: Body::new(id, pos, 0.5 * max_energy, max_energy),
            species,
            velocity: Vec2::ZERO,
            speed: cfg.speed,
            age: 0.0,
            traits: traits.clamped(0.0, 1.0),
            since_reproduction: 0.0,
            death: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.body.id
    }

    pub fn pos(&self) -> Vec2 {
        self.body.pos
    }

    pub fn is_alive(&self) -> bool {
        self.body.is_alive()
    }

    pub fn death_cause(&self) -> Option<DeathCause> {
        self.death
    }

    /// `1 - energy / max_energy`.
    pub fn hunger(&self) -> f64 {
        1.0 - self.body.energy_ratio()
    }

    /// Mark the creature dead. The first recorded cause wins.
    pub fn die(&mut self, cause: DeathCause) {
        if self.death.is_none() {
            self.death = Some(cause);
        }
        self.body.kill();
    }

    /// Spend energy; running dry kills.
    pub fn spend_energy(&mut self, amount: f64) {
        self.body.add_energy(-amount);
        if self.body.energy() <= 0.0 {
            self.die(DeathCause::Exhaustion);
        }
    }

    pub fn metabolic_efficiency(&self) -> f64 {
        0.7 + self.traits.longevity * 0.5
    }

    pub fn max_lifespan(&self) -> f64 {
        BASE_LIFESPAN + self.traits.longevity * LONGEVITY_LIFESPAN
    }

    fn age_ratio(&self) -> f64 {
        self.age / self.max_lifespan()
    }

    pub fn age_efficiency(&self) -> f64 {
        (1.0 - self.age_ratio() * (1.0 - self.traits.longevity)).max(0.7)
    }

    pub fn activity_efficiency(&self) -> f64 {
        (1.0 - self.age_ratio() * 0.8 * (1.0 - self.traits.longevity)).max(0.6)
    }

    /// Distance per second at the current velocity.
    pub fn travel_rate(&self) -> f64 {
        self.velocity.length() * self.speed * self.traits.strength
    }

    /// Energy spent over `dt` seconds.
    ///
    /// `surcharge` is the species-specific extra activity cost per second.
    pub fn metabolic_cost(&self, dt: f64, surcharge: f64, cfg: &SpeciesConfig) -> f64 {
        let efficiency = self.metabolic_efficiency();
        let base = cfg.base_metabolic_cost / (efficiency * self.age_efficiency());
        let movement = self.travel_rate() * cfg.movement_cost;
        let activity = cfg.activity_cost + surcharge;
        let active = (movement + activity) / (efficiency * self.activity_efficiency());
        (base + active) * cfg.metabolism_multiplier * dt
    }

    /// Adopt a steering decision and advance one tick.
    pub fn act<R: Rng>(
        &mut self,
        steering: Steering,
        dt: f64,
        cfg: &SpeciesConfig,
        bounds: &Bounds,
        rng: &mut R,
    ) {
        if !self.is_alive() {
            return;
        }
        self.velocity = steering.velocity;
        self.update(dt, steering.surcharge, cfg, bounds, rng);
    }

    /// Move, age and metabolise over `dt` seconds, then apply mortality.
    pub fn update<R: Rng>(
        &mut self,
        dt: f64,
        surcharge: f64,
        cfg: &SpeciesConfig,
        bounds: &Bounds,
        rng: &mut R,
    ) {
        if !self.is_alive() {
            return;
        }

        let step = self.velocity * (self.speed * self.traits.strength * dt);
        self.body.pos = bounds.wrap(self.body.pos + step);
        self.age += dt;
        self.since_reproduction += dt;

        self.spend_energy(self.metabolic_cost(dt, surcharge, cfg));
        if !self.is_alive() {
            return;
        }

        if self.age > self.max_lifespan() {
            self.die(DeathCause::OldAge);
            return;
        }

        if self.check_starvation(&cfg.starvation, rng) {
            self.die(DeathCause::Starvation);
        }
    }

    /// Roll once against the starvation row that applies, if any.
    pub fn check_starvation<R: Rng>(&self, table: &[StarvationThreshold], rng: &mut R) -> bool {
        match starvation_threshold(table, self.body.energy_ratio()) {
            Some(row) => rng.random::<f64>() < row.probability,
            None => false,
        }
    }

    pub fn can_reproduce(&self, cfg: &SpeciesConfig) -> bool {
        self.is_alive()
            && self.body.energy() >= self.body.max_energy()
            && self.since_reproduction >= cfg.reproduction_cooldown
    }

    /// Produce a mutated offspring and charge the parent.
    ///
    /// The caller checks [`Creature::can_reproduce`] first.
    pub fn reproduce<R: Rng>(
        &mut self,
        id: u64,
        cfg: &SpeciesConfig,
        genetics: &GeneticsConfig,
        bounds: &Bounds,
        rng: &mut R,
    ) -> Creature {
        let traits = inherit_traits(&self.traits, genetics, rng);
        let max_energy = inherit_max_energy(self.body.max_energy(), cfg.max_energy, genetics, rng);
        let pos = bounds.wrap(self.pos() + Vec2::random_in_disc(rng, cfg.offspring_spread));

        let mut child = Creature::new(id, self.species, pos, traits, max_energy, cfg);
        child.velocity = Vec2::random_unit(rng) * cfg.wander_speed;

        self.body
            .set_energy(self.body.energy() * (1.0 - cfg.reproduction_cost));
        self.since_reproduction = 0.0;

        child
    }

    /// Keep roughly the current heading, drifting by a random turn.
    pub fn wander_velocity<R: Rng>(&self, dt: f64, cfg: &SpeciesConfig, rng: &mut R) -> Vec2 {
        let heading = self.velocity.direction_or_random(rng);
        let max_turn = cfg.wander_turn_rate * dt;
        let turn = if max_turn > 0.0 {
            rng.random_range(-max_turn..=max_turn)
        } else {
            0.0
        };
        heading.rotated(turn) * cfg.wander_speed
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id(),
            kind: match self.species {
                Species::Prey => EntityKind::Prey,
                Species::Predator => EntityKind::Predator,
            },
            pos: self.pos(),
            velocity: self.velocity,
            energy: self.body.energy(),
            max_energy: self.body.max_energy(),
            age: self.age,
            traits: Some(self.traits),
        }
    }
}

/// The starvation row applying to `energy_ratio`.
///
/// Rows form nested bands: the tightest band containing the ratio (smallest
/// `energy_percent` with `energy_ratio <= energy_percent`) is the only one
/// that applies, whatever order the table lists them in.
pub fn starvation_threshold(
    table: &[StarvationThreshold],
    energy_ratio: f64,
) -> Option<StarvationThreshold> {
    table
        .iter()
        .filter(|row| energy_ratio <= row.energy_percent)
        .min_by(|a, b| a.energy_percent.total_cmp(&b.energy_percent))
        .copied()
}

fn symmetric<R: Rng>(rng: &mut R, magnitude: f64) -> f64 {
    if magnitude > 0.0 {
        rng.random_range(-magnitude..=magnitude)
    } else {
        0.0
    }
}

fn inherit_traits<R: Rng>(parent: &Traits, genetics: &GeneticsConfig, rng: &mut R) -> Traits {
    let mut traits = *parent;
    for which in Trait::ALL {
        let noise = symmetric(rng, genetics.trait_noise);
        traits.set(which, traits.get(which) + noise);
    }
    if rng.random::<f64>() < genetics.significant_mutation_chance {
        let which = Trait::ALL[rng.random_range(0..Trait::ALL.len())];
        let jump = symmetric(rng, genetics.significant_mutation_magnitude);
        traits.set(which, traits.get(which) + jump);
    }
    traits
}

fn inherit_max_energy<R: Rng>(
    parent: f64,
    species_default: f64,
    genetics: &GeneticsConfig,
    rng: &mut R,
) -> f64 {
    let mut max_energy = parent * (1.0 + symmetric(rng, genetics.max_energy_noise));
    if rng.random::<f64>() < genetics.max_energy_mutation_chance {
        max_energy *= 1.0 + symmetric(rng, genetics.max_energy_mutation_magnitude);
    }
    max_energy.clamp(
        MIN_MAX_ENERGY_FACTOR * species_default,
        MAX_MAX_ENERGY_FACTOR * species_default,
    )
}
