// tests/property/fingerprint.rs

//! Properties of stage fingerprints.

use pipetree::cache::{stage_fingerprint, UpstreamState};
use pipetree::config::Config;
use pipetree::spec::InputId;
use pipetree_test_utils::stages::{new_log, RecordingStage};
use proptest::prelude::*;
use serde_json::json;

fn stage(id: &str) -> RecordingStage {
    RecordingStage::new(id, &["input"], &["mask"], new_log())
}

fn config_with(threshold: i64) -> Config {
    let mut config = Config::new();
    config.set("threshold", json!(threshold));
    config
}

proptest! {
    /// Same stage, same config slice, same upstream identity: equal keys.
    #[test]
    fn deterministic(threshold in any::<i64>(), input in any::<i64>()) {
        let upstream = UpstreamState::for_input(&InputId::Num(input));
        let a = stage_fingerprint(&stage("seg"), &config_with(threshold), &upstream);
        let b = stage_fingerprint(&stage("seg"), &config_with(threshold), &upstream);
        prop_assert_eq!(a, b);
    }

    /// Changing any one ingredient changes the key.
    #[test]
    fn sensitive_to_each_ingredient(
        threshold in any::<i64>(),
        other_threshold in any::<i64>(),
        input in any::<i64>(),
        other_input in any::<i64>(),
    ) {
        prop_assume!(threshold != other_threshold);
        prop_assume!(input != other_input);

        let upstream = UpstreamState::for_input(&InputId::Num(input));
        let base = stage_fingerprint(&stage("seg"), &config_with(threshold), &upstream);

        let changed_config =
            stage_fingerprint(&stage("seg"), &config_with(other_threshold), &upstream);
        prop_assert_ne!(&base, &changed_config);

        let other_upstream = UpstreamState::for_input(&InputId::Num(other_input));
        let changed_input =
            stage_fingerprint(&stage("seg"), &config_with(threshold), &other_upstream);
        prop_assert_ne!(&base, &changed_input);

        let changed_stage =
            stage_fingerprint(&stage("measure"), &config_with(threshold), &upstream);
        prop_assert_ne!(&base, &changed_stage);
    }

    /// Numeric and string identifiers of the same rendering never collide.
    #[test]
    fn input_identity_is_typed(n in any::<i64>()) {
        let numeric = UpstreamState::for_input(&InputId::Num(n));
        let named = UpstreamState::for_input(&InputId::Name(n.to_string()));
        let a = stage_fingerprint(&stage("seg"), &Config::new(), &numeric);
        let b = stage_fingerprint(&stage("seg"), &Config::new(), &named);
        prop_assert_ne!(a, b);
    }
}
