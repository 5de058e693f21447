pub mod accum;
pub mod eval;
pub mod plan;
pub mod signal;
pub mod transform;
pub mod types;

pub use accum::{GroupAccumulator, GroupKey, StdRecord};
pub use plan::{AggregateOp, AggregationPlan, FieldSpec, ParamRef};
pub use signal::{Dependencies, SignalMap, SignalResolver};
pub use transform::{AccumMode, AggregateParams, AggregateTransform};
pub use types::{ChangeSet, FastMap, FlowValue, Path, Tuple, TupleId, TupleIds};
