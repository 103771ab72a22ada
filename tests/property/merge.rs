// tests/property/merge.rs

//! Properties of the recursive configuration merge.

use pipetree::config::Config;
use proptest::prelude::*;
use serde_json::{json, Value};

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{1,4}".prop_map(|s| json!(s)),
        any::<bool>().prop_map(|b| json!(b)),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::btree_map("[a-z]{1,3}", inner, 0..4)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    })
}

fn config_strategy() -> impl Strategy<Value = Config> {
    prop::collection::btree_map("[a-z]{1,3}", value_strategy(), 0..4)
        .prop_map(|m| Config::from_value(Value::Object(m.into_iter().collect())))
}

proptest! {
    /// Merging is associative: merging B then C into A equals merging
    /// (B merged with C) into A.
    #[test]
    fn merge_is_associative(a in config_strategy(), b in config_strategy(), c in config_strategy()) {
        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut right = a;
        right.merge(&b.merged(&c));

        prop_assert_eq!(left, right);
    }

    /// Merging a configuration into itself changes nothing.
    #[test]
    fn merge_is_idempotent(a in config_strategy()) {
        let merged = a.merged(&a);
        prop_assert_eq!(merged, a);
    }

    /// Scalar keys defined by the overriding side always win.
    #[test]
    fn overriding_scalars_win(a in config_strategy(), key in "[a-z]{1,3}", value in any::<i64>()) {
        let mut over = Config::new();
        over.set(&key, json!(value));
        let merged = a.merged(&over);
        prop_assert_eq!(merged.get(&key), Some(&json!(value)));
    }

    /// Keys untouched by the overriding side survive at every depth.
    #[test]
    fn unrelated_keys_survive(a in config_strategy(), b in config_strategy()) {
        let merged = a.merged(&b);
        for (key, value) in a.entries() {
            if b.get(key).is_none() {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }
    }

    /// Equal configurations produce equal digests.
    #[test]
    fn digest_is_content_derived(a in config_strategy()) {
        let copy = Config::from_value(a.clone().into_value());
        prop_assert_eq!(a.digest(), copy.digest());
    }
}
