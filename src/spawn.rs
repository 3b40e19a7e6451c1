//! Trait archetypes used to seed diverse populations.

use crate::types::{Trait, Traits};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Requests above this size use every archetype.
const FULL_CLUSTER_THRESHOLD: usize = 25;
const SMALL_CLUSTER_COUNT: usize = 3;

const TRAIT_JITTER: f64 = 0.1;
const ENERGY_JITTER: f64 = 0.15;

/// Spawned traits stay away from the extremes.
pub const SPAWN_TRAIT_MIN: f64 = 0.05;
pub const SPAWN_TRAIT_MAX: f64 = 0.95;

/// Individuals of one cluster are placed within this distance of its centre.
pub const CLUSTER_RADIUS: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Archetype {
    StrengthFocused,
    StealthFocused,
    Resilient,
    Balanced,
    Adaptive,
}

impl Archetype {
    pub const ALL: [Archetype; 5] = [
        Archetype::StrengthFocused,
        Archetype::StealthFocused,
        Archetype::Resilient,
        Archetype::Balanced,
        Archetype::Adaptive,
    ];

    pub fn base_traits(self) -> Traits {
        match self {
            Archetype::StrengthFocused => Traits::new(0.8, 0.3, 0.4, 0.5),
            Archetype::StealthFocused => Traits::new(0.4, 0.8, 0.5, 0.4),
            Archetype::Resilient => Traits::new(0.55, 0.4, 0.4, 0.8),
            Archetype::Balanced => Traits::new(0.5, 0.5, 0.5, 0.5),
            Archetype::Adaptive => Traits::new(0.45, 0.5, 0.8, 0.5),
        }
    }

    /// Multiplier on the species' default max energy.
    pub fn energy_modifier(self) -> f64 {
        match self {
            Archetype::StrengthFocused => 1.1,
            Archetype::StealthFocused => 0.9,
            Archetype::Resilient => 1.2,
            Archetype::Balanced => 1.0,
            Archetype::Adaptive => 0.95,
        }
    }

    /// Jittered traits and max energy factor for one member of the cluster.
    pub fn sample<R: Rng>(self, rng: &mut R) -> (Traits, f64) {
        let mut traits = self.base_traits();
        for which in Trait::ALL {
            let jitter = 1.0 + rng.random_range(-TRAIT_JITTER..=TRAIT_JITTER);
            traits.set(which, traits.get(which) * jitter);
        }
        let traits = traits.clamped(SPAWN_TRAIT_MIN, SPAWN_TRAIT_MAX);
        let jitter = rng.random_range(-ENERGY_JITTER..=ENERGY_JITTER);
        let energy = self.energy_modifier() * (1.0 + jitter);
        (traits, energy)
    }
}

/// Number of archetype clusters used for a request of `count` individuals.
pub fn cluster_count(count: usize) -> usize {
    if count > FULL_CLUSTER_THRESHOLD {
        Archetype::ALL.len()
    } else {
        SMALL_CLUSTER_COUNT
    }
}

/// Split `count` evenly over archetypes; the first clusters take the remainder.
pub fn partition(count: usize) -> Vec<(Archetype, usize)> {
    let n_clusters = cluster_count(count);
    let base = count / n_clusters;
    let remainder = count % n_clusters;
    Archetype::ALL[..n_clusters]
        .iter()
        .enumerate()
        .map(|(i_cluster, &archetype)| (archetype, base + usize::from(i_cluster < remainder)))
        .collect()
}

/// Traits drawn uniformly from the spawn range, for unclustered spawning.
pub fn random_traits<R: Rng>(rng: &mut R) -> Traits {
    let mut draw = || rng.random_range(SPAWN_TRAIT_MIN..=SPAWN_TRAIT_MAX);
    Traits::new(draw(), draw(), draw(), draw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn ten_individuals_split_four_three_three() {
        let counts: Vec<_> = partition(10).into_iter().map(|(_, n)| n).collect();
        assert_eq!(counts, vec![4, 3, 3]);
    }

    #[test]
    fn large_requests_use_every_archetype() {
        let plan = partition(27);
        assert_eq!(plan.len(), 5);
        let counts: Vec<_> = plan.iter().map(|&(_, n)| n).collect();
        assert_eq!(counts, vec![6, 6, 5, 5, 5]);
        assert_eq!(partition(25).len(), 3);
        assert_eq!(partition(0).iter().map(|&(_, n)| n).sum::<usize>(), 0);
    }

    #[test]
    fn samples_stay_near_their_archetype() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        for archetype in Archetype::ALL {
            let base = archetype.base_traits();
            for _ in 0..200 {
                let (traits, energy) = archetype.sample(&mut rng);
                assert!(traits.is_within(SPAWN_TRAIT_MIN, SPAWN_TRAIT_MAX));
                for which in Trait::ALL {
                    let drift = (traits.get(which) - base.get(which)).abs();
                    assert!(drift <= base.get(which) * 0.1 + 1e-12);
                }
                let modifier = archetype.energy_modifier();
                assert!((energy - modifier).abs() <= modifier * 0.15 + 1e-12);
            }
        }
    }

    #[test]
    fn random_traits_respect_spawn_range() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        for _ in 0..500 {
            assert!(random_traits(&mut rng).is_within(SPAWN_TRAIT_MIN, SPAWN_TRAIT_MAX));
        }
    }
}
