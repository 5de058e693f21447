//! The aggregate transform: translates one pulse's add/modify/remove delta
//! into exact operations against the group accumulator, so the visible
//! aggregate state always equals the aggregate of the current record set.
//!
//! Owns the standardization cache and the accumulator session; both are
//! exclusive to this instance — one pulse at a time, no sharing across
//! transform instances.

use super::accum::{GroupAccumulator, StdRecord};
use super::plan::{self, Accessor, AggregationPlan, FieldSpec, ParamRef};
use super::signal::{Dependencies, SignalResolver};
use super::types::{ChangeSet, FastMap, FlowValue, Tuple, TupleId, TupleIds};
use crate::error::TransformError;
use smallvec::SmallVec;
use smol_str::SmolStr;
use tracing::debug;

/// How records are reduced before accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumMode {
    /// Pass the full record through; dims and measures read it directly.
    #[default]
    Tuple,
    /// Extract a single scalar per record; one global group.
    Value,
    /// Separate groupby/value extraction with stable identity, memoized by
    /// record id.
    Multi,
}

/// Declared transform parameters, assumed schema-valid (see `config`).
#[derive(Debug, Clone, Default)]
pub struct AggregateParams {
    pub groupby: Vec<ParamRef>,
    pub summarize: Vec<FieldSpec>,
}

/// Standardization cache: converts a raw tuple into the minimal shape the
/// accumulator needs. In `multi` mode the entry is memoized by tuple id and
/// doubles as the authoritative record of what is currently accumulated, so
/// retraction always matches the prior admission exactly.
#[derive(Debug)]
struct Standardizer {
    mode: AccumMode,
    group: Accessor,
    value: Accessor,
    cache: FastMap<TupleId, StdRecord>,
}

impl Standardizer {
    fn new(mode: AccumMode) -> Self {
        Self {
            mode,
            group: Accessor::Identity,
            value: Accessor::Identity,
            cache: FastMap::default(),
        }
    }

    /// Standardize the tuple's current data. In `multi` mode this replaces
    /// the cached entry for the tuple's id.
    fn current(&mut self, plan: &AggregationPlan, t: &Tuple) -> Result<StdRecord, TransformError> {
        let rec = self.compute(plan, t.id, &t.data)?;
        if self.mode == AccumMode::Multi {
            self.cache.insert(t.id, rec.clone());
        }
        Ok(rec)
    }

    /// Standardize the representation previously admitted for this tuple:
    /// the cache entry when one exists, otherwise the tuple's pre-pulse
    /// snapshot. Never writes the cache.
    fn previous(&self, plan: &AggregationPlan, t: &Tuple) -> Result<StdRecord, TransformError> {
        if self.mode == AccumMode::Multi {
            if let Some(rec) = self.cache.get(&t.id) {
                return Ok(rec.clone());
            }
        }
        self.compute(plan, t.id, t.previous())
    }

    fn compute(
        &self,
        plan: &AggregationPlan,
        id: TupleId,
        data: &FlowValue,
    ) -> Result<StdRecord, TransformError> {
        let accessor_err =
            |acc: &Accessor, reason: String| TransformError::accessor(acc.describe(), id, reason);

        match self.mode {
            AccumMode::Tuple => {
                let dims = plan
                    .dims
                    .iter()
                    .map(|d| {
                        d.accessor
                            .get(data)
                            .map(FlowValue::clone)
                            .map_err(|reason| accessor_err(&d.accessor, reason))
                    })
                    .collect::<Result<SmallVec<[FlowValue; 2]>, TransformError>>()?;
                Ok(StdRecord::new(id, dims, data.clone()))
            }
            AccumMode::Value => {
                let value = self
                    .value
                    .get(data)
                    .map_err(|reason| accessor_err(&self.value, reason))?;
                Ok(StdRecord::new(id, SmallVec::new(), value.clone()))
            }
            AccumMode::Multi => {
                let group = self
                    .group
                    .get(data)
                    .map_err(|reason| accessor_err(&self.group, reason))?
                    .clone();
                let value = self
                    .value
                    .get(data)
                    .map_err(|reason| accessor_err(&self.value, reason))?
                    .clone();
                let mut dims = SmallVec::new();
                dims.push(group);
                Ok(StdRecord::new(id, dims, value))
            }
        }
    }

    fn evict(&mut self, id: TupleId) {
        self.cache.remove(&id);
    }

    fn clear(&mut self) {
        self.cache.clear();
    }

    #[cfg(test)]
    fn cached(&self, id: TupleId) -> Option<&StdRecord> {
        self.cache.get(&id)
    }
}

/// The aggregate transform node. Invoked synchronously once per evaluation
/// pulse via [`AggregateTransform::transform`].
#[derive(Debug)]
pub struct AggregateTransform {
    params: AggregateParams,
    dependencies: Dependencies,
    std: Standardizer,
    aggr: Option<GroupAccumulator>,
    out_fields: Vec<SmolStr>,
    ids: TupleIds,
}

impl AggregateTransform {
    pub fn new(params: AggregateParams) -> Self {
        let dependencies = plan::signal_dependencies(&params.groupby, &params.summarize);
        Self {
            params,
            dependencies,
            std: Standardizer::new(AccumMode::Tuple),
            aggr: None,
            out_fields: Vec::new(),
            ids: TupleIds::new(),
        }
    }

    /// Select the standardization mode. Must be configured before the first
    /// pulse.
    pub fn with_mode(mut self, mode: AccumMode) -> Self {
        self.std.mode = mode;
        self
    }

    /// Set the groupby/value accessors used by `value` and `multi` modes.
    pub fn with_accessors(mut self, groupby: &str, value: &str) -> Self {
        self.std.group = Accessor::field(groupby);
        self.std.value = Accessor::field(value);
        self
    }

    /// Replace the declared parameters. The live session is kept: the host
    /// must run the next pulse with the reset flag, which reads the old
    /// session's rows out as retractions before the new plan is compiled.
    pub fn set_params(&mut self, params: AggregateParams) {
        self.dependencies = plan::signal_dependencies(&params.groupby, &params.summarize);
        self.params = params;
    }

    /// The signal names that must force a reset when they change, declared
    /// outward to the host scheduler.
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Output field names of the active plan. Empty until the first pulse
    /// compiles a plan.
    pub fn output_fields(&self) -> &[SmolStr] {
        &self.out_fields
    }

    /// Run one evaluation pulse.
    pub fn transform(
        &mut self,
        input: &ChangeSet,
        reset: bool,
        signals: &dyn SignalResolver,
    ) -> Result<ChangeSet, TransformError> {
        debug!(
            stamp = input.stamp,
            adds = input.add.len(),
            mods = input.modify.len(),
            rems = input.remove.len(),
            reset,
            "aggregate pulse"
        );

        let mut output = ChangeSet::derive(input);
        if reset {
            // Compile the replacement plan before tearing anything down: a
            // bad configuration must leave the old session (and its pending
            // retraction) intact for the host's retry.
            let plan = self.compile_plan(signals)?;
            self.reset_session(&mut output);
            self.install_session(plan);
        }

        self.ensure_session(signals)?;
        let mut aggr = match self.aggr.take() {
            Some(aggr) => aggr,
            None => {
                return Err(TransformError::invariant(
                    "accumulator session missing after acquire",
                ))
            }
        };

        let applied = Self::apply_pulse(&mut self.std, &mut aggr, input, reset).map(|()| {
            for field in &self.out_fields {
                output.fields.insert(field.clone());
            }
            aggr.materialize_changes(&mut output);
        });
        self.aggr = Some(aggr);
        applied?;

        Ok(output)
    }

    /// Tear down the current session, retracting every row it has emitted.
    /// Idempotent: without a live session only the cache is dropped.
    fn reset_session(&mut self, output: &mut ChangeSet) {
        if let Some(mut aggr) = self.aggr.take() {
            output.remove.extend(aggr.current_results());
            aggr.clear();
            self.ids = aggr.into_ids();
        }
        self.std.clear();
        self.out_fields.clear();
    }

    /// Acquire the accumulator session, compiling a fresh plan when none is
    /// live.
    fn ensure_session(&mut self, signals: &dyn SignalResolver) -> Result<(), TransformError> {
        if self.aggr.is_none() {
            let plan = self.compile_plan(signals)?;
            self.install_session(plan);
        }
        Ok(())
    }

    fn compile_plan(&self, signals: &dyn SignalResolver) -> Result<AggregationPlan, TransformError> {
        let mut plan = plan::compile(&self.params.groupby, &self.params.summarize, signals)?;
        if self.std.mode != AccumMode::Tuple {
            // The standardizer extracts the measured value up front.
            plan = plan.with_identity_measures();
        }
        Ok(plan)
    }

    /// Bind a compiled plan to a new session. The output-field list is
    /// recomputed on every install — it can change between compilations.
    fn install_session(&mut self, plan: AggregationPlan) {
        self.out_fields = plan.output_fields();
        self.aggr = Some(GroupAccumulator::new(
            plan,
            true,
            std::mem::take(&mut self.ids),
        ));
    }

    fn apply_pulse(
        std: &mut Standardizer,
        aggr: &mut GroupAccumulator,
        input: &ChangeSet,
        reset: bool,
    ) -> Result<(), TransformError> {
        for t in &input.add {
            let rec = std.current(aggr.plan(), t)?;
            aggr.add(&rec)?;
        }

        if reset {
            // Prior state was wholly retracted: modifications rebuild as
            // additions of their current value, and input removals are
            // irrelevant against a cleared accumulator.
            for t in &input.modify {
                let rec = std.current(aggr.plan(), t)?;
                aggr.add(&rec)?;
            }
        } else {
            for t in &input.modify {
                let old = std.previous(aggr.plan(), t)?;
                let new = std.current(aggr.plan(), t)?;
                aggr.modify(&old, &new)?;
            }
            for t in &input.remove {
                let old = std.previous(aggr.plan(), t)?;
                aggr.remove(&old)?;
                std.evict(t.id);
            }
        }
        Ok(())
    }
}
