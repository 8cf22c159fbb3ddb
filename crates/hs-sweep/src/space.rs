//! The booster search space explored by the sweep.

use hs_optimizer::ParameterSpace;

/// Search space over the gradient-boosting parameters. The dropout keys are
/// only active for the `dart` booster.
pub fn booster_space() -> ParameterSpace {
    ParameterSpace::new()
        .add_categorical("booster", &["gbtree", "dart"])
        .add_log_real("lambda", 1e-8, 1.0)
        .add_log_real("alpha", 1e-8, 1.0)
        .add_int("max_depth", 3, 12)
        .add_real("eta", 0.01, 0.3)
        .add_real("gamma", 1e-8, 1.0)
        .add_categorical("grow_policy", &["depthwise", "lossguide"])
        .add_real("subsample", 0.5, 1.0)
        .add_real("colsample_bytree", 0.5, 1.0)
        .add_int("min_child_weight", 1, 10)
        .add_categorical("sample_type", &["uniform", "weighted"])
        .when("booster", "dart")
        .add_categorical("normalize_type", &["tree", "forest"])
        .when("booster", "dart")
        .add_real("rate_drop", 1e-8, 1.0)
        .when("booster", "dart")
        .add_real("skip_drop", 1e-8, 1.0)
        .when("booster", "dart")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_model::BoosterParams;
    use hs_optimizer::{RandomSampler, Sampler};

    #[test]
    fn space_is_valid() {
        let space = booster_space();
        space.validate().unwrap();
        assert_eq!(space.len(), 14);
    }

    #[test]
    fn dart_keys_follow_the_booster() {
        let space = booster_space();
        let mut sampler = RandomSampler::new(space.clone(), 42);
        let (mut saw_gbtree, mut saw_dart) = (false, false);

        for _ in 0..50 {
            let config = space.materialize(&sampler.propose().unwrap()).unwrap();
            let is_dart = config.categorical("booster").unwrap() == "dart";
            assert_eq!(config.len(), if is_dart { 14 } else { 10 });
            assert_eq!(config.contains("rate_drop"), is_dart);
            saw_dart |= is_dart;
            saw_gbtree |= !is_dart;

            // every materialized configuration is a valid model
            BoosterParams::from_configuration(&config).unwrap();
        }
        assert!(saw_gbtree && saw_dart);
    }
}
