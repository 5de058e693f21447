use crate::engine::types::TupleId;
use smol_str::SmolStr;
use thiserror::Error;

/// Error taxonomy of the aggregate transform.
///
/// No variant is retried anywhere in this crate; every failure propagates to
/// the host scheduler, which decides whether to halt the pipeline.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Bad field/operator/signal reference. Raised at plan-compile or
    /// parameter-parse time, never mid-pulse. Recoverable by supplying
    /// corrected configuration and retrying.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A groupby/value accessor could not read a record. Fatal to the
    /// current pulse: skipping the record would leave the aggregate
    /// silently inconsistent.
    #[error("accessor '{accessor}' failed on tuple {tuple}: {reason}")]
    Accessor {
        accessor: SmolStr,
        tuple: TupleId,
        reason: String,
    },

    /// The accumulator observed state inconsistent with its own invariants
    /// (e.g. removing a value that was never added). Always fatal; indicates
    /// a bug in delta propagation.
    #[error("engine invariant violated: {0}")]
    EngineInvariant(String),
}

impl TransformError {
    pub fn config(msg: impl Into<String>) -> Self {
        TransformError::Configuration(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        TransformError::EngineInvariant(msg.into())
    }

    pub fn accessor(accessor: impl Into<SmolStr>, tuple: TupleId, reason: impl Into<String>) -> Self {
        TransformError::Accessor {
            accessor: accessor.into(),
            tuple,
            reason: reason.into(),
        }
    }
}
