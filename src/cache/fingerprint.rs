// src/cache/fingerprint.rs

//! Cache keys for stage invocations.
//!
//! A fingerprint covers exactly three things: the stage identifier, the
//! configuration namespace the stage reads, and the identity of the
//! upstream artifacts it consumes. Nothing about the task directory enters
//! the key, which is what lets a derived task reuse results recorded by the
//! template it inherits from.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::Config;
use crate::pipeline::Stage;
use crate::spec::InputId;

/// Stable, equality-comparable cache key of one stage invocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.0[..12.min(self.0.len())])
    }
}

impl From<String> for Fingerprint {
    fn from(hex: String) -> Self {
        Fingerprint(hex)
    }
}

/// Identity of the pipeline data feeding the next stage: artifact key →
/// identity token. The token of the `input` key is the input identifier
/// itself; the token of any produced key is the fingerprint of the stage
/// that produced it, so changes propagate through the chain.
#[derive(Debug, Clone, Default)]
pub struct UpstreamState {
    ids: BTreeMap<String, String>,
}

impl UpstreamState {
    /// Seed the state for one input item.
    pub fn for_input(input: &InputId) -> Self {
        let mut ids = BTreeMap::new();
        ids.insert(
            "input".to_string(),
            serde_json::to_string(input).unwrap_or_default(),
        );
        Self { ids }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    /// Record that `stage`'s outputs now carry the identity `fp`.
    pub fn apply(&mut self, stage: &dyn Stage, fp: &Fingerprint) {
        for output in stage.outputs() {
            self.ids.insert((*output).to_string(), fp.as_hex().to_string());
        }
    }
}

/// Compute the fingerprint of invoking `stage` with the configuration
/// namespace `config` (already sliced to the stage) on the given upstream
/// state.
pub fn stage_fingerprint(
    stage: &dyn Stage,
    config: &Config,
    upstream: &UpstreamState,
) -> Fingerprint {
    let mut inputs: Vec<(&str, &str)> = stage
        .inputs()
        .iter()
        .map(|key| (*key, upstream.get(key).unwrap_or("")))
        .collect();
    inputs.sort();

    // Keys of the canonical form are sorted by serde_json, and the config
    // map is key-sorted itself, so equal content hashes equally.
    let canonical = serde_json::json!({
        "stage": stage.id(),
        "config": config.entries(),
        "inputs": inputs,
    });

    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    Fingerprint(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::tests::TestStage;
    use serde_json::json;

    fn threshold_config(value: i64) -> Config {
        let mut config = Config::new();
        config.set("threshold", json!(value));
        config
    }

    fn seg_stage() -> TestStage {
        TestStage::new("seg", &["input"], &["mask"])
    }

    #[test]
    fn deterministic_for_equal_parts() {
        let upstream = UpstreamState::for_input(&InputId::Num(1));
        let a = stage_fingerprint(&seg_stage(), &threshold_config(5), &upstream);
        let b = stage_fingerprint(&seg_stage(), &threshold_config(5), &upstream);
        assert_eq!(a, b);
    }

    #[test]
    fn changes_with_config_input_and_stage() {
        let upstream = UpstreamState::for_input(&InputId::Num(1));
        let base = stage_fingerprint(&seg_stage(), &threshold_config(5), &upstream);

        let other_config = stage_fingerprint(&seg_stage(), &threshold_config(7), &upstream);
        assert_ne!(base, other_config);

        let other_input = UpstreamState::for_input(&InputId::Num(2));
        let other_upstream = stage_fingerprint(&seg_stage(), &threshold_config(5), &other_input);
        assert_ne!(base, other_upstream);

        let renamed = TestStage::new("seg2", &["input"], &["mask"]);
        let other_stage = stage_fingerprint(&renamed, &threshold_config(5), &upstream);
        assert_ne!(base, other_stage);
    }

    #[test]
    fn upstream_fingerprints_chain() {
        let first = seg_stage();
        let second = TestStage::new("measure", &["mask"], &["stats"]);

        let mut state_a = UpstreamState::for_input(&InputId::Num(1));
        let fp_a = stage_fingerprint(&first, &threshold_config(5), &state_a);
        state_a.apply(&first, &fp_a);

        let mut state_b = UpstreamState::for_input(&InputId::Num(1));
        let fp_b = stage_fingerprint(&first, &threshold_config(7), &state_b);
        state_b.apply(&first, &fp_b);

        // The second stage's own config is equal; only the upstream differs.
        let downstream_a = stage_fingerprint(&second, &Config::new(), &state_a);
        let downstream_b = stage_fingerprint(&second, &Config::new(), &state_b);
        assert_ne!(downstream_a, downstream_b);
    }
}
