//! Simulation data types.

use rand::Rng;
use rand_distr::{Distribution, UnitCircle, UnitDisc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

/// Point or displacement in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Unit vector in the same direction, or `None` for (near) zero vectors.
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        (len > 1e-9 && len.is_finite()).then(|| Self::new(self.x / len, self.y / len))
    }

    pub fn rotated(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Uniformly distributed unit vector.
    pub fn random_unit<R: Rng>(rng: &mut R) -> Self {
        let [x, y]: [f64; 2] = UnitCircle.sample(rng);
        Self::new(x, y)
    }

    /// Uniformly distributed point in the disc of the given radius.
    pub fn random_in_disc<R: Rng>(rng: &mut R, radius: f64) -> Self {
        let [x, y]: [f64; 2] = UnitDisc.sample(rng);
        Self::new(x * radius, y * radius)
    }

    /// Normalize, falling back to a random direction for zero vectors.
    pub fn direction_or_random<R: Rng>(self, rng: &mut R) -> Self {
        self.normalized().unwrap_or_else(|| Self::random_unit(rng))
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Toroidal world extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Wrap a position back into `[0, width) x [0, height)`.
    pub fn wrap(&self, pos: Vec2) -> Vec2 {
        let x = pos.x.rem_euclid(self.width);
        let y = pos.y.rem_euclid(self.height);
        // rem_euclid can round up to the modulus for tiny negative inputs.
        Vec2::new(
            if x >= self.width { 0.0 } else { x },
            if y >= self.height { 0.0 } else { y },
        )
    }

    /// Shortest displacement from `from` to `to` across the wrapped edges.
    pub fn delta(&self, from: Vec2, to: Vec2) -> Vec2 {
        Vec2::new(
            wrap_offset(to.x - from.x, self.width),
            wrap_offset(to.y - from.y, self.height),
        )
    }

    pub fn distance(&self, a: Vec2, b: Vec2) -> f64 {
        self.delta(a, b).length()
    }

    pub fn random_point<R: Rng>(&self, rng: &mut R) -> Vec2 {
        Vec2::new(
            rng.random::<f64>() * self.width,
            rng.random::<f64>() * self.height,
        )
    }
}

fn wrap_offset(offset: f64, extent: f64) -> f64 {
    if offset > extent / 2.0 {
        offset - extent
    } else if offset < -extent / 2.0 {
        offset + extent
    } else {
        offset
    }
}

/// Index of the closest live candidate within `range`; first wins on ties.
pub fn nearest_within(candidates: impl Iterator<Item = (bool, f64)>, range: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i_cand, (alive, distance)) in candidates.enumerate() {
        if !alive || distance > range {
            continue;
        }
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((i_cand, distance));
        }
    }
    best.map(|(i_cand, _)| i_cand)
}

/// Heritable traits, each within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Traits {
    pub strength: f64,
    pub stealth: f64,
    pub learnability: f64,
    pub longevity: f64,
}

/// Trait selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trait {
    Strength,
    Stealth,
    Learnability,
    Longevity,
}

impl Trait {
    pub const ALL: [Trait; 4] = [
        Trait::Strength,
        Trait::Stealth,
        Trait::Learnability,
        Trait::Longevity,
    ];

    /// Traits that can be picked up from peers.
    pub const LEARNABLE: [Trait; 3] = [Trait::Strength, Trait::Stealth, Trait::Longevity];
}

impl Traits {
    pub fn new(strength: f64, stealth: f64, learnability: f64, longevity: f64) -> Self {
        Self {
            strength,
            stealth,
            learnability,
            longevity,
        }
        .clamped(0.0, 1.0)
    }

    pub fn get(&self, which: Trait) -> f64 {
        match which {
            Trait::Strength => self.strength,
            Trait::Stealth => self.stealth,
            Trait::Learnability => self.learnability,
            Trait::Longevity => self.longevity,
        }
    }

    /// Set a trait, clamped to `[0, 1]`.
    pub fn set(&mut self, which: Trait, value: f64) {
        let value = value.clamp(0.0, 1.0);
        match which {
            Trait::Strength => self.strength = value,
            Trait::Stealth => self.stealth = value,
            Trait::Learnability => self.learnability = value,
            Trait::Longevity => self.longevity = value,
        }
    }

    pub fn clamped(mut self, min: f64, max: f64) -> Self {
        for which in Trait::ALL {
            let value = self.get(which);
            // NaN collapses to the lower bound.
            let value = if value.is_nan() { min } else { value.clamp(min, max) };
            match which {
                Trait::Strength => self.strength = value,
                Trait::Stealth => self.stealth = value,
                Trait::Learnability => self.learnability = value,
                Trait::Longevity => self.longevity = value,
            }
        }
        self
    }

    /// Largest distance from the median (0.5) among strength and stealth.
    pub fn specialization_deviation(&self) -> f64 {
        (self.strength - 0.5).abs().max((self.stealth - 0.5).abs())
    }

    /// Reward for strength or stealth above 0.7, the better of the two.
    pub fn specialization_bonus(&self, factor: f64) -> f64 {
        let excess = (self.strength - 0.7).max(self.stealth - 0.7);
        excess.max(0.0) * factor
    }

    pub fn is_within(&self, min: f64, max: f64) -> bool {
        Trait::ALL
            .iter()
            .all(|&which| (min..=max).contains(&self.get(which)))
    }
}

/// Positional, energetic state shared by resources and creatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: u64,
    pub pos: Vec2,
    energy: f64,
    max_energy: f64,
    alive: bool,
}

impl Body {
    pub fn new(id: u64, pos: Vec2, energy: f64, max_energy: f64) -> Self {
        let max_energy = max_energy.max(f64::MIN_POSITIVE);
        Self {
            id,
            pos,
            energy: energy.clamp(0.0, max_energy),
            max_energy,
            alive: true,
        }
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn max_energy(&self) -> f64 {
        self.max_energy
    }

    pub fn energy_ratio(&self) -> f64 {
        self.energy / self.max_energy
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Set energy, clamped to `[0, max_energy]`.
    pub fn set_energy(&mut self, energy: f64) {
        self.energy = if energy.is_nan() {
            0.0
        } else {
            energy.clamp(0.0, self.max_energy)
        };
    }

    pub fn add_energy(&mut self, amount: f64) {
        self.set_energy(self.energy + amount);
    }

    pub(crate) fn kill(&mut self) {
        self.alive = false;
    }
}

/// Static energy deposit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub body: Body,
}

impl Resource {
    pub fn new(id: u64, pos: Vec2, energy: f64) -> Self {
        Self {
            body: Body::new(id, pos, energy, energy),
        }
    }

    pub fn energy(&self) -> f64 {
        self.body.energy()
    }
}

/// Creature species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    Prey,
    Predator,
}

/// Why a creature died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathCause {
    /// Energy reached zero.
    Exhaustion,
    OldAge,
    /// Starvation probability roll fired.
    Starvation,
    Predation,
}

/// Kind tag in an [`EntitySnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Resource,
    Prey,
    Predator,
}

/// Read-only view of one entity for renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: u64,
    pub kind: EntityKind,
    pub pos: Vec2,
    pub velocity: Vec2,
    pub energy: f64,
    pub max_energy: f64,
    pub age: f64,
    pub traits: Option<Traits>,
}

/// Mean traits and energy of one species.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpeciesSummary {
    pub count: usize,
    pub avg_strength: f64,
    pub avg_stealth: f64,
    pub avg_learnability: f64,
    pub avg_longevity: f64,
    pub avg_energy_ratio: f64,
}

/// Population counts and averages at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub day: u64,
    pub resources: usize,
    pub prey: SpeciesSummary,
    pub predators: SpeciesSummary,
    pub bloom: bool,
}

/// One-time record of a species dying out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtinctionEvent {
    pub species: Species,
    pub day: u64,
    pub tick: u64,
    pub prey: usize,
    pub predators: usize,
    pub resources: usize,
}

/// Cumulative number of entities created, by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TotalSpawned {
    pub prey: u64,
    pub predators: u64,
    pub resources: u64,
}

/// Births and deaths of one species, by cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LifeCounters {
    pub births: u64,
    pub exhaustion: u64,
    pub old_age: u64,
    pub starvation: u64,
    pub predation: u64,
}

impl LifeCounters {
    pub fn record_death(&mut self, cause: DeathCause) {
        match cause {
            DeathCause::Exhaustion => self.exhaustion += 1,
            DeathCause::OldAge => self.old_age += 1,
            DeathCause::Starvation => self.starvation += 1,
            DeathCause::Predation => self.predation += 1,
        }
    }

    pub fn deaths(&self) -> u64 {
        self.exhaustion + self.old_age + self.starvation + self.predation
    }
}

/// Life counters for both species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReproductionStats {
    pub prey: LifeCounters,
    pub predators: LifeCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_is_toroidal() {
        let bounds = Bounds::new(100.0, 50.0);
        assert_eq!(bounds.wrap(Vec2::new(105.0, -5.0)), Vec2::new(5.0, 45.0));
        assert_eq!(bounds.wrap(Vec2::new(100.0, 50.0)), Vec2::ZERO);
    }

    #[test]
    fn delta_takes_shortest_path_across_edges() {
        let bounds = Bounds::new(100.0, 100.0);
        let d = bounds.delta(Vec2::new(95.0, 50.0), Vec2::new(5.0, 50.0));
        assert!((d.x - 10.0).abs() < 1e-12);
        let wrapped = bounds.distance(Vec2::new(1.0, 1.0), Vec2::new(99.0, 99.0));
        assert!((wrapped - 8f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_has_no_direction() {
        assert!(Vec2::ZERO.normalized().is_none());
        let v = Vec2::new(3.0, 4.0).normalized().unwrap();
        assert!((v.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn traits_are_clamped() {
        let traits = Traits::new(1.4, -0.2, 0.5, f64::NAN);
        assert!(traits.is_within(0.0, 1.0));
        assert_eq!(traits.strength, 1.0);
        assert_eq!(traits.stealth, 0.0);
        let mut traits = traits;
        traits.set(Trait::Stealth, 2.0);
        assert_eq!(traits.stealth, 1.0);
    }

    #[test]
    fn body_energy_stays_in_bounds() {
        let mut body = Body::new(1, Vec2::ZERO, 500.0, 100.0);
        assert_eq!(body.energy(), 100.0);
        body.add_energy(-250.0);
        assert_eq!(body.energy(), 0.0);
        body.set_energy(f64::NAN);
        assert_eq!(body.energy(), 0.0);
    }
}
