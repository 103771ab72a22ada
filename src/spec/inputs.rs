// src/spec/inputs.rs

//! Input identifier decoding.
//!
//! The `inputs` field of a specification is either a list of identifiers
//! (numbers or names), or a single expression string of comma-separated
//! numbers and ranges, e.g. `"1-3, 5"`.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Identifier of a single input item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputId {
    Num(i64),
    Name(String),
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputId::Num(n) => write!(f, "{n}"),
            InputId::Name(s) => write!(f, "{s}"),
        }
    }
}

/// The `inputs` field as written in a specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputsSpec {
    Expr(String),
    List(Vec<InputId>),
}

impl InputsSpec {
    /// An empty list or a blank expression declares no inputs of its own.
    pub fn is_empty(&self) -> bool {
        match self {
            InputsSpec::Expr(expr) => expr.trim().is_empty(),
            InputsSpec::List(items) => items.is_empty(),
        }
    }
}

/// Decode an `inputs` field into a sorted, deduplicated list of identifiers.
pub fn decode_inputs(spec: &InputsSpec) -> Result<Vec<InputId>> {
    let items: BTreeSet<InputId> = match spec {
        InputsSpec::List(items) => items.iter().cloned().collect(),
        InputsSpec::Expr(expr) => decode_expr(expr)?,
    };
    Ok(items.into_iter().collect())
}

fn decode_expr(expr: &str) -> Result<BTreeSet<InputId>> {
    let range_re = Regex::new(r"^([0-9]+)-([0-9]+)$").unwrap();
    let single_re = Regex::new(r"^[0-9]+$").unwrap();

    let mut items = BTreeSet::new();
    for token in expr.replace(' ', "").split(',') {
        if token.is_empty() {
            continue;
        }

        if single_re.is_match(token) {
            items.insert(InputId::Num(token.parse()?));
            continue;
        }

        if let Some(caps) = range_re.captures(token) {
            let first: i64 = caps[1].parse()?;
            let last: i64 = caps[2].parse()?;
            if first < last {
                items.extend((first..=last).map(InputId::Num));
                continue;
            }
        }

        bail!("cannot parse input token \"{token}\"");
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(ids: &[i64]) -> Vec<InputId> {
        ids.iter().copied().map(InputId::Num).collect()
    }

    #[test]
    fn decodes_lists_sorted_and_deduplicated() {
        let spec = InputsSpec::List(nums(&[3, 1, 2, 3]));
        assert_eq!(decode_inputs(&spec).unwrap(), nums(&[1, 2, 3]));
    }

    #[test]
    fn decodes_range_expressions() {
        let spec = InputsSpec::Expr("1-3, 5".to_string());
        assert_eq!(decode_inputs(&spec).unwrap(), nums(&[1, 2, 3, 5]));
    }

    #[test]
    fn rejects_bad_tokens_and_inverted_ranges() {
        assert!(decode_inputs(&InputsSpec::Expr("a-b".to_string())).is_err());
        assert!(decode_inputs(&InputsSpec::Expr("5-1".to_string())).is_err());
    }

    #[test]
    fn named_inputs_are_kept() {
        let spec = InputsSpec::List(vec![
            InputId::Name("b.png".to_string()),
            InputId::Name("a.png".to_string()),
        ]);
        let decoded = decode_inputs(&spec).unwrap();
        assert_eq!(
            decoded,
            vec![
                InputId::Name("a.png".to_string()),
                InputId::Name("b.png".to_string()),
            ]
        );
    }
}
