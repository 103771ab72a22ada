// src/pipeline/mod.rs

//! Stage pipelines.
//!
//! - [`stage`] defines the capability interface of a processing stage and
//!   the registry that maps stage identifiers to implementations.
//! - [`pipeline`] orders stages by their declared data dependencies and
//!   computes execution bounds.
//! - [`executor`] runs a pipeline against one input item, consulting the
//!   stage cache before every stage.

pub mod executor;
pub mod pipeline;
pub mod stage;

pub use executor::{execute_item, ItemContext, StageTiming};
pub use pipeline::Pipeline;
pub use stage::{PipelineData, Stage, StageRegistry};
