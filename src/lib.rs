//! reflow — pulse-driven incremental aggregation for reactive dataflow
//! graphs.
//!
//! The crate's entry point is [`AggregateTransform`]: invoked once per
//! evaluation pulse with a [`ChangeSet`] of added/modified/removed tuples,
//! it maintains grouped summary statistics incrementally and returns the
//! delta of changed group rows.

pub mod config;
pub mod engine;
pub mod error;

// Re-export commonly used types for convenience
pub use engine::accum::{GroupAccumulator, GroupKey, StdRecord};
pub use engine::plan::{AggregateOp, AggregationPlan, FieldSpec, ParamRef};
pub use engine::signal::{Dependencies, SignalMap, SignalResolver};
pub use engine::transform::{AccumMode, AggregateParams, AggregateTransform};
pub use engine::types::{ChangeSet, FastMap, FlowValue, Path, Tuple, TupleId, TupleIds};
pub use error::TransformError;
