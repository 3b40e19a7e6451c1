use ecosim::{Config, Engine};
use proptest::prelude::*;

fn check_bounds(engine: &Engine) -> Result<(), TestCaseError> {
    for creature in engine
        .prey()
        .iter()
        .map(|prey| &**prey)
        .chain(engine.predators().iter().map(|predator| &**predator))
    {
        let energy = creature.body.energy();
        prop_assert!(energy >= 0.0 && energy <= creature.body.max_energy());
        prop_assert!(creature.traits.is_within(0.0, 1.0));
        prop_assert!(creature.pos().x >= 0.0 && creature.pos().x < engine.config().world.width);
        prop_assert!(creature.pos().y >= 0.0 && creature.pos().y < engine.config().world.height);
    }
    for resource in engine.resources() {
        prop_assert!(resource.energy() > 0.0);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn energy_traits_and_positions_stay_in_bounds(
        seed in any::<u64>(),
        n_prey in 0usize..80,
        n_predators in 0usize..20,
        dt in prop_oneof![Just(f64::NAN), 0.0..0.2f64],
    ) {
        let mut cfg = Config::default();
        cfg.world.seed = Some(seed);
        cfg.world.ticks_per_day = 50;
        cfg.world.season_length_days = 2;
        cfg.prey.initial_count = n_prey;
        cfg.predator.initial_count = n_predators;

        let mut engine = Engine::new(cfg).unwrap();
        engine.initialize();
        engine.start();
        for _ in 0..400 {
            engine.update(dt);
            check_bounds(&engine)?;
        }
        prop_assert_eq!(engine.days(), 8);
    }

    #[test]
    fn clustered_spawns_keep_traits_away_from_extremes(
        seed in any::<u64>(),
        count in 1usize..120,
    ) {
        let mut cfg = Config::default();
        cfg.world.seed = Some(seed);
        cfg.prey.initial_count = 0;
        cfg.predator.initial_count = 0;

        let mut engine = Engine::new(cfg).unwrap();
        engine.spawn_prey(count, true);
        engine.spawn_predators(count, false);
        prop_assert_eq!(engine.prey().len(), count);
        prop_assert_eq!(engine.predators().len(), count);
        for prey in engine.prey() {
            prop_assert!(prey.traits.is_within(0.05, 0.95));
            let default = engine.config().prey.max_energy;
            let max = prey.body.max_energy();
            prop_assert!(max >= 0.5 * default && max <= 2.0 * default);
        }
        for predator in engine.predators() {
            prop_assert!(predator.traits.is_within(0.05, 0.95));
        }
    }
}
