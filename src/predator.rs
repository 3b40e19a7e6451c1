//! Predator behaviour: stochastic prey detection, capture odds, hunting and
//! spacing from other predators.

use crate::config::{Config, PredatorBehaviorConfig};
use crate::model::{Creature, Steering};
use crate::prey::Prey;
use crate::types::{Bounds, Species, Traits, Vec2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// Detection chance before any stealth penalty, at equal stealth.
const BASE_DETECTION: f64 = 0.25;
/// Prey stealth above this is steeply harder to detect.
const STEALTH_PENALTY_START: f64 = 0.7;
const STEALTH_PENALTY_SLOPE: f64 = 2.0;

/// Capture odds before trait comparisons.
const BASE_CAPTURE: f64 = 0.35;
const MIN_CAPTURE: f64 = 0.15;
const MAX_CAPTURE: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predator {
    creature: Creature,
}

impl Deref for Predator {
    type Target = Creature;
    fn deref(&self) -> &Creature {
        &self.creature
    }
}

impl DerefMut for Predator {
    fn deref_mut(&mut self) -> &mut Creature {
        &mut self.creature
    }
}

/// Chance that a predator notices a given prey inside its range.
pub fn detection_chance(predator: &Traits, prey: &Traits) -> f64 {
    let stealth_diff = predator.stealth - prey.stealth;
    let mut chance = stealth_diff + BASE_DETECTION;
    if prey.stealth > STEALTH_PENALTY_START {
        chance -= (prey.stealth - STEALTH_PENALTY_START) * STEALTH_PENALTY_SLOPE;
    }
    chance
}

/// Probability that a predator catches a given prey, in `[0.15, 0.75]`.
pub fn capture_chance(predator: &Traits, prey: &Traits) -> f64 {
    let stealth_diff = predator.stealth - prey.stealth;
    let strength_diff = predator.strength - prey.strength;
    let primary = if stealth_diff > strength_diff {
        stealth_diff * 0.4
    } else {
        strength_diff * 0.5
    };
    let specialized = predator.specialization_bonus(0.8);
    let advantage = predator.specialization_deviation() - prey.specialization_deviation();
    (BASE_CAPTURE + primary + specialized + advantage * 0.3).clamp(MIN_CAPTURE, MAX_CAPTURE)
}

impl Predator {
    pub fn new(creature: Creature) -> Self {
        debug_assert_eq!(creature.species, Species::Predator);
        Self { creature }
    }

    /// Pick the most attractive detectable prey within `range`.
    ///
    /// Range grows with the predator's stealth. Every candidate is gated by a
    /// visibility roll; survivors are scored by closeness and stealth
    /// advantage. Ties go to the earliest candidate.
    pub fn detect_prey<R: Rng>(
        &self,
        prey: &[Prey],
        range: f64,
        bounds: &Bounds,
        rng: &mut R,
    ) -> Option<usize> {
        let range = range * (1.0 + self.traits.stealth * 0.5);
        if range <= 0.0 {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for (i_prey, candidate) in prey.iter().enumerate() {
            if !candidate.is_alive() {
                continue;
            }
            let distance = bounds.distance(self.pos(), candidate.pos());
            if distance > range {
                continue;
            }
            if rng.random::<f64>() >= detection_chance(&self.traits, &candidate.traits) {
                continue;
            }
            let stealth_diff = self.traits.stealth - candidate.traits.stealth;
            let score = 0.7 * (1.0 - distance / range) + 0.3 * stealth_diff.max(0.0);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((i_prey, score));
            }
        }
        best.map(|(i_prey, _)| i_prey)
    }

    pub fn capture_chance(&self, prey: &Prey) -> f64 {
        capture_chance(&self.traits, &prey.traits)
    }

    /// A single draw against [`capture_chance`].
    pub fn can_catch_prey<R: Rng>(&self, prey: &Prey, rng: &mut R) -> bool {
        rng.random::<f64>() < self.capture_chance(prey)
    }

    /// Decide this tick's velocity.
    ///
    /// `index` is this predator's position in `predators` so it can skip
    /// itself when spacing out.
    pub fn steer<R: Rng>(
        &self,
        index: usize,
        predators: &[Predator],
        prey: &[Prey],
        cfg: &Config,
        bounds: &Bounds,
        dt: f64,
        rng: &mut R,
    ) -> Steering {
        let species = &cfg.predator;
        let hunger = self.hunger();

        let (target, pace) = if hunger < species.hunger_threshold {
            if rng.random::<f64>() < species.opportunistic_chance {
                let target = self.detect_prey(prey, species.opportunistic_range, bounds, rng);
                (target, species.opportunistic_speed)
            } else {
                (None, 0.0)
            }
        } else {
            let range = species.detection_range * (1.0 + hunger * species.detection_multiplier);
            let target = self.detect_prey(prey, range, bounds, rng);
            (target, 1.0 + species.max_pursuit_bonus * hunger)
        };

        let mut velocity = match target {
            Some(i_prey) => {
                let towards = bounds.delta(self.pos(), prey[i_prey].pos());
                towards.direction_or_random(rng) * pace
            }
            None => self.wander_velocity(dt, species, rng),
        };

        let behavior = &cfg.predator_behavior;
        let weight = behavior.repulsion_strength * self.body.energy_ratio();
        if weight > 0.0 {
            velocity += self.repulsion(index, predators, behavior, bounds, rng) * weight;
        }

        Steering::moving(velocity)
    }

    /// Sum of push-away vectors from predators inside the personal space.
    fn repulsion<R: Rng>(
        &self,
        index: usize,
        predators: &[Predator],
        behavior: &PredatorBehaviorConfig,
        bounds: &Bounds,
        rng: &mut R,
    ) -> Vec2 {
        let radius = behavior.personal_space;
        if radius <= 0.0 {
            return Vec2::ZERO;
        }
        let mut push = Vec2::ZERO;
        for (i_other, other) in predators.iter().enumerate() {
            if i_other == index || !other.is_alive() {
                continue;
            }
            let away = bounds.delta(other.pos(), self.pos());
            let distance = away.length();
            if distance >= radius {
                continue;
            }
            push += away.direction_or_random(rng) * (1.0 - distance / radius);
        }
        push
    }

    pub fn reproduce<R: Rng>(
        &mut self,
        id: u64,
        cfg: &Config,
        bounds: &Bounds,
        rng: &mut R,
    ) -> Predator {
        let child = self
            .creature
            .reproduce(id, &cfg.predator, &cfg.genetics, bounds, rng);
        Predator::new(child)
    }
}
