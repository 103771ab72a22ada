// src/spec/mod.rs

//! Task specification records.
//!
//! - [`model`] holds the serde model of a task specification and the
//!   field-level inheritance rules.
//! - [`inputs`] decodes input identifier lists and range expressions.
//! - [`loader`] reads specification and base-config files from disk.

pub mod inputs;
pub mod loader;
pub mod model;

pub use inputs::{decode_inputs, InputId, InputsSpec};
pub use loader::{discover, load_base_config, load_spec, SPEC_FILENAME};
pub use model::TaskSpec;
