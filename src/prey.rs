//! Prey behaviour: threat detection, fleeing, foraging and stealth escapes.

use crate::config::Config;
use crate::model::{Creature, Steering};
use crate::predator::Predator;
use crate::types::{Bounds, Resource, Species, Traits, nearest_within};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::ops::{Deref, DerefMut};

const MIN_ESCAPE: f64 = 0.15;
const MAX_ESCAPE: f64 = 0.75;

/// Stealth above this makes fleeing erratic and faster.
const EVASIVE_STEALTH: f64 = 0.6;
/// Trait level above which evasion bonuses grow faster.
const EXPERT_LEVEL: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prey {
    creature: Creature,
}

impl Deref for Prey {
    type Target = Creature;
    fn deref(&self) -> &Creature {
        &self.creature
    }
}

impl DerefMut for Prey {
    fn deref_mut(&mut self) -> &mut Creature {
        &mut self.creature
    }
}

/// Probability that caught prey slips away, in `[0.15, 0.75]`.
pub fn escape_chance(prey: &Traits, predator: &Traits, base_escape_chance: f64) -> f64 {
    let stealth_diff = prey.stealth - predator.stealth;
    let strength_diff = prey.strength - predator.strength;
    let primary = if stealth_diff > strength_diff {
        stealth_diff * 0.8
    } else {
        strength_diff * 0.5
    };
    let specialized = prey.specialization_bonus(1.5);
    let advantage = prey.specialization_deviation() - predator.specialization_deviation();
    (base_escape_chance + primary + specialized + advantage * 0.3).clamp(MIN_ESCAPE, MAX_ESCAPE)
}

/// Flee speed factor from stealth and strength, before the avoidance multiplier.
pub fn flee_boost(traits: &Traits) -> f64 {
    let mut stealth_bonus = 0.0;
    if traits.stealth > EVASIVE_STEALTH {
        stealth_bonus += (traits.stealth - EVASIVE_STEALTH) * 0.5;
    }
    if traits.stealth > EXPERT_LEVEL {
        stealth_bonus += (traits.stealth - EXPERT_LEVEL) * 0.5;
    }

    let mut strength_bonus = traits.strength * 0.3;
    if traits.strength > EXPERT_LEVEL {
        strength_bonus += (traits.strength - EXPERT_LEVEL) * 0.8;
    }

    1.0 + stealth_bonus.max(strength_bonus)
}

/// Half-width of the random turn applied while fleeing, in radians.
fn evasion_spread(stealth: f64) -> f64 {
    if stealth <= EVASIVE_STEALTH {
        return 0.0;
    }
    let mut spread = stealth * FRAC_PI_4;
    if stealth > EXPERT_LEVEL {
        spread += (stealth - EXPERT_LEVEL) * FRAC_PI_2;
    }
    spread
}

impl Prey {
    pub fn new(creature: Creature) -> Self {
        debug_assert_eq!(creature.species, Species::Prey);
        Self { creature }
    }

    /// Nearest live predator within `range`.
    fn nearest_predator(
        &self,
        predators: &[Predator],
        range: f64,
        bounds: &Bounds,
    ) -> Option<usize> {
        nearest_within(
            predators.iter().map(|predator| {
                let distance = bounds.distance(self.pos(), predator.pos());
                (predator.is_alive(), distance)
            }),
            range,
        )
    }

    /// Nearest predator inside the stealth-extended detection range.
    pub fn detect_predator(
        &self,
        predators: &[Predator],
        cfg: &Config,
        bounds: &Bounds,
    ) -> Option<usize> {
        let species = &cfg.prey;
        let extension = 1.0 + self.traits.stealth * species.detection_multiplier;
        let range = species.detection_range * extension;
        self.nearest_predator(predators, range, bounds)
    }

    /// Whether any live predator is within `range`.
    pub fn predator_within(&self, predators: &[Predator], range: f64, bounds: &Bounds) -> bool {
        self.nearest_predator(predators, range, bounds).is_some()
    }

    /// Nearest live resource within `range`.
    pub fn nearest_resource(
        &self,
        resources: &[Resource],
        range: f64,
        bounds: &Bounds,
    ) -> Option<usize> {
        nearest_within(
            resources.iter().map(|resource| {
                let distance = bounds.distance(self.pos(), resource.body.pos);
                (resource.body.is_alive(), distance)
            }),
            range,
        )
    }

    pub fn escape_chance(&self, predator: &Predator, cfg: &Config) -> f64 {
        escape_chance(&self.traits, &predator.traits, cfg.prey_behavior.base_escape_chance)
    }

    /// Try to slip away after being caught.
    ///
    /// The attempt costs energy whatever the outcome, and can exhaust the prey.
    pub fn can_escape_with_stealth<R: Rng>(
        &mut self,
        predator: &Predator,
        cfg: &Config,
        rng: &mut R,
    ) -> bool {
        let chance = self.escape_chance(predator, cfg);
        self.spend_energy(cfg.prey_behavior.escape_energy_cost);
        rng.random::<f64>() < chance
    }

    /// Decide this tick's velocity and activity surcharge.
    pub fn steer<R: Rng>(
        &self,
        predators: &[Predator],
        resources: &[Resource],
        cfg: &Config,
        bounds: &Bounds,
        dt: f64,
        rng: &mut R,
    ) -> Steering {
        if let Some(i_threat) = self.detect_predator(predators, cfg, bounds) {
            return self.flee(&predators[i_threat], cfg, bounds, rng);
        }

        let species = &cfg.prey;
        let behavior = &cfg.prey_behavior;

        // Survival first: a nearby predator keeps prey from heading for food.
        if self.predator_within(predators, behavior.caution_range, bounds) {
            return Steering::moving(self.wander_velocity(dt, species, rng));
        }

        let hunger = self.hunger();
        let (target, pace) = if hunger < species.hunger_threshold {
            if rng.random::<f64>() < species.opportunistic_chance {
                let target = self.nearest_resource(resources, species.opportunistic_range, bounds);
                (target, species.opportunistic_speed)
            } else {
                (None, 0.0)
            }
        } else {
            let range = behavior.forage_range * (1.0 + hunger * species.detection_multiplier);
            let target = self.nearest_resource(resources, range, bounds);
            (target, 1.0 + species.max_pursuit_bonus * hunger)
        };

        let velocity = match target {
            Some(i_resource) => {
                let towards = bounds.delta(self.pos(), resources[i_resource].body.pos);
                towards.direction_or_random(rng) * pace
            }
            None => self.wander_velocity(dt, species, rng),
        };
        Steering::moving(velocity)
    }

    fn flee<R: Rng>(
        &self,
        threat: &Predator,
        cfg: &Config,
        bounds: &Bounds,
        rng: &mut R,
    ) -> Steering {
        let behavior = &cfg.prey_behavior;
        let mut direction = bounds.delta(threat.pos(), self.pos()).direction_or_random(rng);

        let spread = evasion_spread(self.traits.stealth);
        if spread > 0.0 {
            direction = direction.rotated(rng.random_range(-spread..=spread));
        }

        let factor = flee_boost(&self.traits) * behavior.avoidance_multiplier;
        Steering {
            velocity: direction * factor,
            surcharge: self.traits.strength * behavior.flee_energy_cost,
        }
    }

    pub fn reproduce<R: Rng>(
        &mut self,
        id: u64,
        cfg: &Config,
        bounds: &Bounds,
        rng: &mut R,
    ) -> Prey {
        let child = self
            .creature
            .reproduce(id, &cfg.prey, &cfg.genetics, bounds, rng);
        Prey::new(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn prey_at(pos: Vec2, traits: Traits, cfg: &Config) -> Prey {
        Prey::new(Creature::new(1, Species::Prey, pos, traits, cfg.prey.max_energy, &cfg.prey))
    }

    fn predator_at(id: u64, pos: Vec2, traits: Traits, cfg: &Config) -> Predator {
        Predator::new(Creature::new(
            id,
            Species::Predator,
            pos,
            traits,
            cfg.predator.max_energy,
            &cfg.predator,
        ))
    }

    fn plain() -> Traits {
        Traits::new(0.5, 0.5, 0.5, 0.5)
    }

    #[test]
    fn escape_chance_favours_stealth() {
        let base = 0.3;
        let predator = plain();
        let sneaky = Traits::new(0.5, 0.8, 0.5, 0.5);
        // 0.3 + 0.3 * 0.8 + 0.1 * 1.5 + 0.3 * 0.3 = 0.78, over the cap
        assert_eq!(escape_chance(&sneaky, &predator, base), MAX_ESCAPE);
        let base = 0.1;
        assert!((escape_chance(&sneaky, &predator, base) - 0.58).abs() < 1e-12);
        let base = 0.3;
        let strong = Traits::new(0.6, 0.5, 0.5, 0.5);
        // 0.1 * 0.5 + 0.1 * 0.3
        assert!((escape_chance(&strong, &predator, base) - 0.38).abs() < 1e-12);
        let hopeless = Traits::new(0.5, 0.5, 0.5, 0.5);
        let apex = Traits::new(1.0, 1.0, 0.5, 0.5);
        assert_eq!(escape_chance(&hopeless, &apex, base), MIN_ESCAPE);
    }

    #[test]
    fn escape_attempt_always_costs_energy() {
        let cfg = Config::default();
        let mut prey = prey_at(Vec2::new(0.0, 0.0), plain(), &cfg);
        let predator = predator_at(2, Vec2::new(5.0, 0.0), plain(), &cfg);
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let before = prey.body.energy();
        prey.can_escape_with_stealth(&predator, &cfg, &mut rng);
        assert!((before - prey.body.energy() - cfg.prey_behavior.escape_energy_cost).abs() < 1e-12);
    }

    #[test]
    fn detection_range_grows_with_stealth() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        let predators = vec![predator_at(2, Vec2::new(170.0, 100.0), plain(), &cfg)];
        let blunt = prey_at(Vec2::new(100.0, 100.0), Traits::new(0.5, 0.0, 0.5, 0.5), &cfg);
        let keen = prey_at(Vec2::new(100.0, 100.0), Traits::new(0.5, 1.0, 0.5, 0.5), &cfg);
        // 60 vs 90 against a threat at 70
        assert_eq!(blunt.detect_predator(&predators, &cfg, &bounds), None);
        assert_eq!(keen.detect_predator(&predators, &cfg, &bounds), Some(0));
    }

    #[test]
    fn flees_directly_away_without_evasive_stealth() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        let prey = prey_at(Vec2::new(100.0, 100.0), Traits::new(0.5, 0.5, 0.5, 0.5), &cfg);
        let predators = vec![predator_at(2, Vec2::new(130.0, 100.0), plain(), &cfg)];
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let steering = prey.steer(&predators, &[], &cfg, &bounds, 0.1, &mut rng);
        let expected = (1.0 + 0.15) * cfg.prey_behavior.avoidance_multiplier;
        assert!((steering.velocity.x + expected).abs() < 1e-9);
        assert!(steering.velocity.y.abs() < 1e-9);
        assert!((steering.surcharge - 0.5 * cfg.prey_behavior.flee_energy_cost).abs() < 1e-12);
    }

    #[test]
    fn evasive_flight_stays_mostly_away() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        let prey = prey_at(Vec2::new(100.0, 100.0), Traits::new(0.2, 0.9, 0.5, 0.5), &cfg);
        let predators = vec![predator_at(2, Vec2::new(130.0, 100.0), plain(), &cfg)];
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let spread = evasion_spread(0.9);
        for _ in 0..100 {
            let steering = prey.steer(&predators, &[], &cfg, &bounds, 0.1, &mut rng);
            let angle = steering.velocity.y.atan2(-steering.velocity.x);
            assert!(angle.abs() <= spread + 1e-9);
            let expected = flee_boost(&prey.traits) * cfg.prey_behavior.avoidance_multiplier;
            assert!((steering.velocity.length() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn flee_boost_takes_the_better_bonus() {
        assert!((flee_boost(&Traits::new(0.0, 0.9, 0.5, 0.5)) - (1.0 + 0.15 + 0.1)).abs() < 1e-12);
        assert!((flee_boost(&Traits::new(0.9, 0.0, 0.5, 0.5)) - (1.0 + 0.27 + 0.16)).abs() < 1e-12);
    }

    #[test]
    fn hungry_prey_head_for_food() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        let mut prey = prey_at(Vec2::new(100.0, 100.0), plain(), &cfg);
        prey.body.set_energy(0.0);
        let resources = vec![
            Resource::new(10, Vec2::new(100.0, 150.0), 12.0),
            Resource::new(11, Vec2::new(100.0, 130.0), 12.0),
        ];
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let steering = prey.steer(&[], &resources, &cfg, &bounds, 0.1, &mut rng);
        assert!(steering.velocity.x.abs() < 1e-9);
        assert!((steering.velocity.y - 1.5).abs() < 1e-9);
    }

    #[test]
    fn sated_prey_rarely_feed() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        let prey = prey_at(Vec2::new(100.0, 100.0), plain(), &cfg);
        assert_eq!(prey.hunger(), 0.0);
        let resources = vec![Resource::new(10, Vec2::new(100.0, 120.0), 12.0)];

        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let n_trials = 10_000;
        let mut n_feeds = 0;
        for _ in 0..n_trials {
            let steering = prey.steer(&[], &resources, &cfg, &bounds, 0.1, &mut rng);
            let speed = steering.velocity.length();
            if (speed - cfg.prey.opportunistic_speed).abs() < 1e-9 {
                assert!((steering.velocity.y - speed).abs() < 1e-9);
                n_feeds += 1;
            } else {
                assert!((speed - cfg.prey.wander_speed).abs() < 1e-9);
            }
        }
        let fraction = n_feeds as f64 / n_trials as f64;
        assert!((fraction - cfg.prey.opportunistic_chance).abs() < 0.02, "fraction {fraction}");
    }

    #[test]
    fn hunger_at_the_threshold_means_foraging() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        let mut prey = prey_at(Vec2::new(100.0, 100.0), plain(), &cfg);
        let max = prey.body.max_energy();
        prey.body.set_energy(0.7 * max);
        assert!(prey.hunger() >= cfg.prey.hunger_threshold);
        let resources = vec![Resource::new(10, Vec2::new(100.0, 150.0), 12.0)];

        let mut rng = ChaCha12Rng::seed_from_u64(8);
        for _ in 0..50 {
            let steering = prey.steer(&[], &resources, &cfg, &bounds, 0.1, &mut rng);
            // 1 + 0.5 * 0.3
            assert!(steering.velocity.x.abs() < 1e-9);
            assert!((steering.velocity.y - 1.15).abs() < 1e-9);
        }
    }

    #[test]
    fn stacked_threat_still_gives_a_finite_flight() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        let prey = prey_at(Vec2::new(100.0, 100.0), plain(), &cfg);
        let predators = vec![predator_at(2, prey.pos(), plain(), &cfg)];
        let expected = flee_boost(&prey.traits) * cfg.prey_behavior.avoidance_multiplier;

        let mut rng = ChaCha12Rng::seed_from_u64(9);
        for _ in 0..20 {
            let steering = prey.steer(&predators, &[], &cfg, &bounds, 0.1, &mut rng);
            assert!(steering.velocity.x.is_finite() && steering.velocity.y.is_finite());
            assert!((steering.velocity.length() - expected).abs() < 1e-9);
            assert!(steering.surcharge > 0.0);
        }
    }

    #[test]
    fn nearby_predator_suppresses_foraging() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        // Stealth 0 keeps detection at 60 so the predator at 65 is not a threat.
        let mut prey = prey_at(Vec2::new(100.0, 100.0), Traits::new(0.5, 0.0, 0.5, 0.5), &cfg);
        prey.body.set_energy(0.0);
        prey.velocity = Vec2::new(0.0, -1.0);
        let predators = vec![predator_at(2, Vec2::new(165.0, 100.0), plain(), &cfg)];
        let resources = vec![Resource::new(10, Vec2::new(100.0, 150.0), 12.0)];
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let steering = prey.steer(&predators, &resources, &cfg, &bounds, 0.1, &mut rng);
        // wandering keeps the old heading within the turn rate
        assert!(steering.velocity.y < 0.0);
        assert!((steering.velocity.length() - cfg.prey.wander_speed).abs() < 1e-9);
    }

    #[test]
    fn reproduction_leaves_half() {
        let cfg = Config::default();
        let bounds = Bounds::new(1000.0, 1000.0);
        let mut prey = prey_at(Vec2::new(100.0, 100.0), plain(), &cfg);
        let max = prey.body.max_energy();
        prey.body.set_energy(max);
        let mut rng = ChaCha12Rng::seed_from_u64(6);
        let child = prey.reproduce(2, &cfg, &bounds, &mut rng);
        assert_eq!(child.species, Species::Prey);
        assert!((prey.body.energy() - 0.5 * cfg.prey.max_energy).abs() < 1e-9);
    }
}
