use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use. Every section falls back
/// to its [`Default`] values, so a file only needs to list what it overrides.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// World geometry and clock.
    pub world: WorldConfig,
    /// Prey tunables.
    pub prey: SpeciesConfig,
    /// Predator tunables.
    pub predator: SpeciesConfig,
    /// Predator-only hunting parameters.
    pub predator_behavior: PredatorBehaviorConfig,
    /// Prey-only feeding and evasion parameters.
    pub prey_behavior: PreyBehaviorConfig,
    /// Inheritance and mutation.
    pub genetics: GeneticsConfig,
    /// Resource spawning.
    pub resource: ResourceConfig,
    /// Peer learning.
    pub learning: LearningConfig,
    /// Headless driver output.
    pub output: OutputConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Width of the toroidal world.
    pub width: f64,
    /// Height of the toroidal world.
    pub height: f64,
    /// Seed for the random number generator (`None` seeds from the OS).
    pub seed: Option<u64>,
    /// Number of ticks that make up one day.
    pub ticks_per_day: u64,
    /// Number of days between blooms.
    pub season_length_days: u64,
    /// Number of ticks a bloom lasts.
    pub bloom_duration_ticks: u64,
    /// Largest time step the engine accepts per tick, in seconds.
    pub max_delta_time: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            seed: None,
            ticks_per_day: 300,
            season_length_days: 10,
            bloom_duration_ticks: 900,
            max_delta_time: 0.1,
        }
    }
}

/// One row of a starvation table.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct StarvationThreshold {
    /// Energy ratio at or below which this row applies.
    pub energy_percent: f64,
    /// Probability of dying when this row applies.
    pub probability: f64,
}

/// Parameters shared by both creature species.
///
/// Partial `[prey]`/`[predator]` sections are merged over the species'
/// own defaults, see [`Config::from_toml`].
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SpeciesConfig {
    pub initial_count: usize,
    pub max_energy: f64,
    /// Baseline speed in world units per second.
    pub speed: f64,
    pub base_metabolic_cost: f64,
    /// Energy per unit of distance travelled.
    pub movement_cost: f64,
    /// Constant activity cost per second.
    pub activity_cost: f64,
    /// Species-wide multiplier on the whole metabolic cost.
    pub metabolism_multiplier: f64,
    pub starvation: Vec<StarvationThreshold>,
    /// Fraction of energy the parent loses when reproducing.
    pub reproduction_cost: f64,
    /// Seconds that must pass between two reproductions.
    pub reproduction_cooldown: f64,
    /// Offspring are placed within this distance of the parent.
    pub offspring_spread: f64,
    /// Radius around the death position where remains are scattered.
    pub remains_radius: f64,
    pub hunger_threshold: f64,
    pub detection_range: f64,
    pub detection_multiplier: f64,
    /// Search range when feeding opportunistically while sated.
    pub opportunistic_range: f64,
    pub opportunistic_chance: f64,
    pub opportunistic_speed: f64,
    /// Speed bonus at full hunger while chasing food.
    pub max_pursuit_bonus: f64,
    pub wander_speed: f64,
    /// Largest heading change per second while wandering, in radians.
    pub wander_turn_rate: f64,
}

impl SpeciesConfig {
    fn prey() -> Self {
        Self {
            initial_count: 60,
            max_energy: 100.0,
            speed: 60.0,
            base_metabolic_cost: 0.6,
            movement_cost: 0.02,
            activity_cost: 0.1,
            metabolism_multiplier: 1.0,
            starvation: vec![
                StarvationThreshold {
                    energy_percent: 0.2,
                    probability: 0.005,
                },
                StarvationThreshold {
                    energy_percent: 0.1,
                    probability: 0.02,
                },
                StarvationThreshold {
                    energy_percent: 0.05,
                    probability: 0.01,
                },
            ],
            reproduction_cost: 0.5,
            reproduction_cooldown: 8.0,
            offspring_spread: 10.0,
            remains_radius: 20.0,
            hunger_threshold: 0.3,
            detection_range: 60.0,
            detection_multiplier: 0.5,
            opportunistic_range: 30.0,
            opportunistic_chance: 0.1,
            opportunistic_speed: 0.6,
            max_pursuit_bonus: 0.5,
            wander_speed: 0.5,
            wander_turn_rate: 2.0,
        }
    }

    fn predator() -> Self {
        Self {
            initial_count: 12,
            max_energy: 280.0,
            speed: 65.0,
            base_metabolic_cost: 0.8,
            movement_cost: 0.02,
            activity_cost: 0.15,
            metabolism_multiplier: 1.5,
            starvation: vec![
                StarvationThreshold {
                    energy_percent: 0.15,
                    probability: 0.004,
                },
                StarvationThreshold {
                    energy_percent: 0.05,
                    probability: 0.015,
                },
            ],
            reproduction_cost: 0.6,
            reproduction_cooldown: 15.0,
            offspring_spread: 15.0,
            remains_radius: 30.0,
            hunger_threshold: 0.25,
            detection_range: 80.0,
            detection_multiplier: 1.0,
            opportunistic_range: 40.0,
            opportunistic_chance: 0.5,
            opportunistic_speed: 0.7,
            max_pursuit_bonus: 0.5,
            wander_speed: 0.5,
            wander_turn_rate: 1.5,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredatorBehaviorConfig {
    /// Distance within which a predator can strike.
    pub catch_radius: f64,
    /// Predators only hunt below this energy ratio.
    pub satiation: f64,
    /// Fraction of the victim's energy transferred to the predator.
    pub energy_gain_from_prey: f64,
    pub personal_space: f64,
    pub repulsion_strength: f64,
}

impl Default for PredatorBehaviorConfig {
    fn default() -> Self {
        Self {
            catch_radius: 15.0,
            satiation: 0.8,
            energy_gain_from_prey: 1.2,
            personal_space: 30.0,
            repulsion_strength: 0.3,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreyBehaviorConfig {
    pub base_escape_chance: f64,
    /// Energy spent on every escape attempt.
    pub escape_energy_cost: f64,
    pub avoidance_multiplier: f64,
    /// Extra activity cost per second of fleeing, scaled by strength.
    pub flee_energy_cost: f64,
    /// Predators closer than this keep prey from seeking food.
    pub caution_range: f64,
    /// Prey only feed below this energy ratio.
    pub satiation: f64,
    /// Distance within which prey can eat a resource.
    pub feeding_radius: f64,
    pub forage_range: f64,
}

impl Default for PreyBehaviorConfig {
    fn default() -> Self {
        Self {
            base_escape_chance: 0.3,
            escape_energy_cost: 5.0,
            avoidance_multiplier: 1.2,
            flee_energy_cost: 0.5,
            caution_range: 70.0,
            satiation: 0.9,
            feeding_radius: 10.0,
            forage_range: 80.0,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticsConfig {
    pub trait_noise: f64,
    pub significant_mutation_chance: f64,
    pub significant_mutation_magnitude: f64,
    pub max_energy_noise: f64,
    pub max_energy_mutation_chance: f64,
    pub max_energy_mutation_magnitude: f64,
}

impl Default for GeneticsConfig {
    fn default() -> Self {
        Self {
            trait_noise: 0.05,
            significant_mutation_chance: 0.05,
            significant_mutation_magnitude: 0.2,
            max_energy_noise: 0.05,
            max_energy_mutation_chance: 0.05,
            max_energy_mutation_magnitude: 0.25,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub initial_count: usize,
    /// Energy of a regular resource.
    pub energy: f64,
    /// Regeneration stops adding resources above this count.
    pub max_resources: usize,
    pub spawn_chance: f64,
    pub bloom_spawn_chance: f64,
    pub bloom_energy_bonus: f64,
    pub bloom_cluster_radius: f64,
    /// Random resource removal chance per tick once prey are extinct.
    pub decay_chance: f64,
    /// Recovery clusters appear below this fraction of the initial prey count.
    pub recovery_threshold: f64,
    pub recovery_chance: f64,
    pub recovery_cluster_size: usize,
    pub recovery_energy_multiplier: f64,
    pub bloom_centers: usize,
    pub primary_cluster_size: usize,
    pub primary_cluster_radius: f64,
    pub primary_energy_multiplier: f64,
    pub secondary_cluster_size: usize,
    pub secondary_cluster_radius: f64,
    pub secondary_energy_multiplier: f64,
    /// Fraction of a dead creature's max energy returned as resources.
    pub remains_fraction: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            initial_count: 120,
            energy: 12.0,
            max_resources: 400,
            spawn_chance: 0.15,
            bloom_spawn_chance: 0.4,
            bloom_energy_bonus: 1.5,
            bloom_cluster_radius: 25.0,
            decay_chance: 0.05,
            recovery_threshold: 0.2,
            recovery_chance: 0.02,
            recovery_cluster_size: 6,
            recovery_energy_multiplier: 2.0,
            bloom_centers: 3,
            primary_cluster_size: 8,
            primary_cluster_radius: 30.0,
            primary_energy_multiplier: 1.5,
            secondary_cluster_size: 4,
            secondary_cluster_radius: 70.0,
            secondary_energy_multiplier: 1.0,
            remains_fraction: 0.7,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Per-tick learning probability per unit of learnability.
    pub chance_factor: f64,
    pub rate: f64,
    pub max_gain: f64,
    /// Energy spent per unit of trait learned.
    pub energy_cost: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            chance_factor: 0.1,
            rate: 0.2,
            max_gain: 0.05,
            energy_cost: 20.0,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Days simulated per `create`/`resume` invocation.
    pub days_per_segment: u64,
    /// Fixed time step used by the headless driver, in seconds.
    pub delta_time: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            days_per_segment: 50,
            delta_time: 1.0 / 60.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            prey: SpeciesConfig::prey(),
            predator: SpeciesConfig::predator(),
            predator_behavior: PredatorBehaviorConfig::default(),
            prey_behavior: PreyBehaviorConfig::default(),
            genetics: GeneticsConfig::default(),
            resource: ResourceConfig::default(),
            learning: LearningConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// Sections and fields absent from the file take their
    /// [`Config::default`] values.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut table: toml::Table = toml::from_str(contents).context("failed to parse config")?;

        // Species sections share one type but not one set of defaults.
        let prey = match table.remove("prey") {
            Some(value) => merge_species(SpeciesConfig::prey(), value)
                .context("failed to deserialize prey section")?,
            None => SpeciesConfig::prey(),
        };
        let predator = match table.remove("predator") {
            Some(value) => merge_species(SpeciesConfig::predator(), value)
                .context("failed to deserialize predator section")?,
            None => SpeciesConfig::predator(),
        };

        let mut config: Config = table
            .try_into()
            .context("failed to deserialize config")?;
        config.prey = prey;
        config.predator = predator;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Check every parameter against its admissible range.
    pub fn validate(&self) -> Result<()> {
        let world = &self.world;
        check_num(world.width, 1.0..1e6).context("invalid world width")?;
        check_num(world.height, 1.0..1e6).context("invalid world height")?;
        check_num(world.ticks_per_day, 1..1_000_000).context("invalid ticks per day")?;
        check_num(world.season_length_days, 1..100_000).context("invalid season length")?;
        check_num(world.bloom_duration_ticks, 0..100_000_000)
            .context("invalid bloom duration")?;
        check_num(world.max_delta_time, 1e-6..10.0).context("invalid max delta time")?;

        check_species(&self.prey).context("invalid prey parameters")?;
        check_species(&self.predator).context("invalid predator parameters")?;

        let hunt = &self.predator_behavior;
        check_num(hunt.catch_radius, 0.0..1e4).context("invalid catch radius")?;
        check_num(hunt.satiation, 0.0..=1.0).context("invalid predator satiation")?;
        check_num(hunt.energy_gain_from_prey, 0.0..100.0).context("invalid energy gain")?;
        check_num(hunt.personal_space, 0.0..1e4).context("invalid personal space")?;
        check_num(hunt.repulsion_strength, 0.0..10.0).context("invalid repulsion strength")?;

        let escape = &self.prey_behavior;
        check_num(escape.base_escape_chance, 0.0..=1.0).context("invalid base escape chance")?;
        check_num(escape.escape_energy_cost, 0.0..1e4).context("invalid escape energy cost")?;
        check_num(escape.avoidance_multiplier, 0.0..10.0)
            .context("invalid avoidance multiplier")?;
        check_num(escape.flee_energy_cost, 0.0..1e4).context("invalid flee energy cost")?;
        check_num(escape.caution_range, 0.0..1e4).context("invalid caution range")?;
        check_num(escape.satiation, 0.0..=1.0).context("invalid prey satiation")?;
        check_num(escape.feeding_radius, 0.0..1e4).context("invalid feeding radius")?;
        check_num(escape.forage_range, 0.0..1e4).context("invalid forage range")?;

        let genetics = &self.genetics;
        check_num(genetics.trait_noise, 0.0..=1.0).context("invalid trait noise")?;
        check_num(genetics.significant_mutation_chance, 0.0..=1.0)
            .context("invalid significant mutation chance")?;
        check_num(genetics.significant_mutation_magnitude, 0.0..=1.0)
            .context("invalid significant mutation magnitude")?;
        check_num(genetics.max_energy_noise, 0.0..1.0).context("invalid max energy noise")?;
        check_num(genetics.max_energy_mutation_chance, 0.0..=1.0)
            .context("invalid max energy mutation chance")?;
        check_num(genetics.max_energy_mutation_magnitude, 0.0..1.0)
            .context("invalid max energy mutation magnitude")?;

        let resource = &self.resource;
        check_num(resource.initial_count, 0..1_000_000).context("invalid resource count")?;
        check_num(resource.energy, 1e-3..1e6).context("invalid resource energy")?;
        check_num(resource.max_resources, 1..1_000_000).context("invalid max resources")?;
        for (name, prob) in [
            ("spawn chance", resource.spawn_chance),
            ("bloom spawn chance", resource.bloom_spawn_chance),
            ("decay chance", resource.decay_chance),
            ("recovery threshold", resource.recovery_threshold),
            ("recovery chance", resource.recovery_chance),
            ("remains fraction", resource.remains_fraction),
        ] {
            check_num(prob, 0.0..=1.0).with_context(|| format!("invalid {name}"))?;
        }
        for (name, mult) in [
            ("bloom energy bonus", resource.bloom_energy_bonus),
            ("recovery energy multiplier", resource.recovery_energy_multiplier),
            ("primary energy multiplier", resource.primary_energy_multiplier),
            ("secondary energy multiplier", resource.secondary_energy_multiplier),
        ] {
            check_num(mult, 1e-3..100.0).with_context(|| format!("invalid {name}"))?;
        }
        for (name, radius) in [
            ("bloom cluster radius", resource.bloom_cluster_radius),
            ("primary cluster radius", resource.primary_cluster_radius),
            ("secondary cluster radius", resource.secondary_cluster_radius),
        ] {
            check_num(radius, 0.0..1e4).with_context(|| format!("invalid {name}"))?;
        }
        check_num(resource.bloom_centers, 0..1000).context("invalid bloom centers")?;
        check_num(resource.recovery_cluster_size, 0..1000)
            .context("invalid recovery cluster size")?;
        check_num(resource.primary_cluster_size, 0..1000)
            .context("invalid primary cluster size")?;
        check_num(resource.secondary_cluster_size, 0..1000)
            .context("invalid secondary cluster size")?;

        let learning = &self.learning;
        check_num(learning.chance_factor, 0.0..=1.0).context("invalid learning chance")?;
        check_num(learning.rate, 0.0..=1.0).context("invalid learning rate")?;
        check_num(learning.max_gain, 0.0..=1.0).context("invalid learning max gain")?;
        check_num(learning.energy_cost, 0.0..1e4).context("invalid learning energy cost")?;

        check_num(self.output.days_per_segment, 1..1_000_000)
            .context("invalid days per segment")?;
        check_num(self.output.delta_time, 1e-6..=world.max_delta_time)
            .context("invalid driver delta time")?;

        Ok(())
    }
}

fn merge_species(defaults: SpeciesConfig, overrides: toml::Value) -> Result<SpeciesConfig> {
    let toml::Value::Table(overrides) = overrides else {
        bail!("species section must be a table");
    };
    let toml::Value::Table(mut table) = toml::Value::try_from(defaults)? else {
        bail!("species defaults must serialize to a table");
    };
    table.extend(overrides);
    Ok(toml::Value::Table(table).try_into()?)
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_species(species: &SpeciesConfig) -> Result<()> {
    check_num(species.initial_count, 0..100_000).context("invalid initial count")?;
    check_num(species.max_energy, 1e-3..1e6).context("invalid max energy")?;
    check_num(species.speed, 0.0..1e4).context("invalid speed")?;
    check_num(species.base_metabolic_cost, 0.0..1e4).context("invalid metabolic cost")?;
    check_num(species.movement_cost, 0.0..1e4).context("invalid movement cost")?;
    check_num(species.activity_cost, 0.0..1e4).context("invalid activity cost")?;
    check_num(species.metabolism_multiplier, 0.0..100.0)
        .context("invalid metabolism multiplier")?;
    check_starvation(&species.starvation).context("invalid starvation table")?;
    check_num(species.reproduction_cost, 0.0..1.0).context("invalid reproduction cost")?;
    check_num(species.reproduction_cooldown, 0.0..1e6).context("invalid reproduction cooldown")?;
    check_num(species.offspring_spread, 0.0..1e4).context("invalid offspring spread")?;
    check_num(species.remains_radius, 0.0..1e4).context("invalid remains radius")?;
    check_num(species.hunger_threshold, 0.0..=1.0).context("invalid hunger threshold")?;
    check_num(species.detection_range, 0.0..1e4).context("invalid detection range")?;
    check_num(species.detection_multiplier, 0.0..100.0)
        .context("invalid detection multiplier")?;
    check_num(species.opportunistic_range, 0.0..1e4).context("invalid opportunistic range")?;
    check_num(species.opportunistic_chance, 0.0..=1.0)
        .context("invalid opportunistic chance")?;
    check_num(species.opportunistic_speed, 0.0..10.0).context("invalid opportunistic speed")?;
    check_num(species.max_pursuit_bonus, 0.0..10.0).context("invalid pursuit bonus")?;
    check_num(species.wander_speed, 0.0..10.0).context("invalid wander speed")?;
    check_num(species.wander_turn_rate, 0.0..100.0).context("invalid wander turn rate")?;
    Ok(())
}

fn check_starvation(table: &[StarvationThreshold]) -> Result<()> {
    for (i_row, row) in table.iter().enumerate() {
        check_num(row.energy_percent, 0.0..=1.0)
            .with_context(|| format!("invalid energy percent in row {i_row}"))?;
        check_num(row.probability, 0.0..=1.0)
            .with_context(|| format!("invalid probability in row {i_row}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_file_yields_default_config() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
[world]
width = 200.0
seed = 7

[predator]
initial_count = 3
"#,
        )
        .unwrap();
        assert_eq!(config.world.width, 200.0);
        assert_eq!(config.world.seed, Some(7));
        assert_eq!(config.world.height, WorldConfig::default().height);
        assert_eq!(config.predator.initial_count, 3);
        assert_eq!(config.predator.max_energy, SpeciesConfig::predator().max_energy);
        assert_eq!(config.prey, SpeciesConfig::prey());
    }

    #[test]
    fn zero_max_energy_is_rejected() {
        let mut config = Config::default();
        config.prey.max_energy = 0.0;
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("invalid prey parameters"));
    }

    #[test]
    fn bad_starvation_probability_is_rejected() {
        assert!(
            Config::from_toml(
                r#"
[prey]
starvation = [ { energy_percent = 0.1, probability = 1.5 } ]
"#
            )
            .is_err()
        );
    }

    #[test]
    fn driver_step_must_fit_max_delta_time() {
        let mut config = Config::default();
        config.output.delta_time = 1.0;
        assert!(config.validate().is_err());
    }
}
