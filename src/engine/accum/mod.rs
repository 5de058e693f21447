//! The group accumulator engine: owns per-group state for one compiled
//! aggregation plan, applies add/modify/remove operations, and materializes
//! the delta of changed group rows. In streaming mode `materialize_changes`
//! returns only the groups touched since the previous call.

mod measure;

pub use measure::MeasureCell;

use super::eval::composite_key;
use super::plan::AggregationPlan;
use super::types::{ChangeSet, FastMap, FlowValue, Tuple, TupleId, TupleIds};
use crate::error::TransformError;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use smol_str::SmolStr;
use std::hash::BuildHasherDefault;

type TouchedSet = indexmap::IndexSet<GroupKey, BuildHasherDefault<FxHasher>>;

/// Canonical key of a group: the encoded dim values of its members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(SmolStr);

impl GroupKey {
    pub fn from_dims(dims: &[FlowValue]) -> Self {
        GroupKey(composite_key(dims))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A record reduced to the shape the accumulator needs: identity, derived
/// group key, and the value measures read from.
#[derive(Debug, Clone, PartialEq)]
pub struct StdRecord {
    pub id: TupleId,
    pub key: GroupKey,
    pub dims: SmallVec<[FlowValue; 2]>,
    pub value: FlowValue,
}

impl StdRecord {
    pub fn new(id: TupleId, dims: SmallVec<[FlowValue; 2]>, value: FlowValue) -> Self {
        Self {
            id,
            key: GroupKey::from_dims(&dims),
            dims,
            value,
        }
    }
}

#[derive(Debug, Clone)]
struct Group {
    row: Tuple,
    dims: SmallVec<[FlowValue; 2]>,
    count: i64,
    cells: Vec<MeasureCell>,
    members: Option<FastMap<TupleId, FlowValue>>,
    /// Whether this group's row was included in the last materialization.
    present: bool,
}

impl Group {
    fn new(row_id: TupleId, dims: &[FlowValue], plan: &AggregationPlan) -> Self {
        Self {
            row: Tuple::new(row_id, FlowValue::Null),
            dims: dims.iter().cloned().collect(),
            count: 0,
            cells: plan.measures.iter().map(|m| MeasureCell::new(m.collect)).collect(),
            members: plan.needs_members().then(FastMap::default),
            present: false,
        }
    }

    /// Rebuild the output row from current cell state. When `capture_prev`
    /// the old data is kept as the row's previous snapshot, so downstream
    /// consumers can diff a modification.
    fn rebuild_row(&mut self, plan: &AggregationPlan, capture_prev: bool) {
        let mut obj: FastMap<SmolStr, FlowValue> = FastMap::default();
        for (dim, value) in plan.dims.iter().zip(self.dims.iter()) {
            obj.insert(dim.name.clone(), value.clone());
        }
        for (measure, cell) in plan.measures.iter().zip(self.cells.iter()) {
            for out in &measure.outputs {
                obj.insert(out.name.clone(), cell.output(out.op, self.members.as_ref()));
            }
        }

        let data = FlowValue::Object(obj);
        if capture_prev {
            self.row.replace_data(data);
        } else {
            self.row.data = data;
            self.row.clear_prev();
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    plan: AggregationPlan,
    streaming: bool,
    groups: FastMap<GroupKey, Group>,
    touched: TouchedSet,
    ids: TupleIds,
}

impl GroupAccumulator {
    pub fn new(plan: AggregationPlan, streaming: bool, ids: TupleIds) -> Self {
        Self {
            plan,
            streaming,
            groups: FastMap::default(),
            touched: TouchedSet::default(),
            ids,
        }
    }

    pub fn plan(&self) -> &AggregationPlan {
        &self.plan
    }

    /// Number of live groups (at least one member record).
    pub fn group_count(&self) -> usize {
        self.groups.values().filter(|g| g.count > 0).count()
    }

    /// Hand the id allocator back when the session is torn down, so a
    /// rebuilt session never reissues row ids.
    pub fn into_ids(self) -> TupleIds {
        self.ids
    }

    pub fn add(&mut self, rec: &StdRecord) -> Result<(), TransformError> {
        // Apply measure accessors before touching any state, so an accessor
        // failure leaves the group untouched.
        let inputs = self.measure_inputs(rec)?;

        let ids = &mut self.ids;
        let plan = &self.plan;
        let group = self
            .groups
            .entry(rec.key.clone())
            .or_insert_with(|| Group::new(ids.issue(), &rec.dims, plan));

        group.count += 1;
        for (cell, input) in group.cells.iter_mut().zip(inputs) {
            cell.add(rec.id, input);
        }
        if let Some(members) = group.members.as_mut() {
            members.insert(rec.id, rec.value.clone());
        }

        self.touched.insert(rec.key.clone());
        Ok(())
    }

    pub fn remove(&mut self, rec: &StdRecord) -> Result<(), TransformError> {
        let inputs = self.measure_inputs(rec)?;

        let group = self.groups.get_mut(&rec.key).ok_or_else(|| {
            TransformError::invariant(format!(
                "remove of tuple {} targets unknown group '{}'",
                rec.id,
                rec.key.as_str()
            ))
        })?;

        group.count -= 1;
        if group.count < 0 {
            return Err(TransformError::invariant(format!(
                "group '{}' count underflow",
                rec.key.as_str()
            )));
        }
        for (cell, input) in group.cells.iter_mut().zip(inputs) {
            cell.remove(rec.id, input).map_err(TransformError::invariant)?;
        }
        if let Some(members) = group.members.as_mut() {
            if members.remove(&rec.id).is_none() {
                return Err(TransformError::invariant(format!(
                    "tuple {} is not a member of group '{}'",
                    rec.id,
                    rec.key.as_str()
                )));
            }
        }

        self.touched.insert(rec.key.clone());
        Ok(())
    }

    /// Update-in-place: retract the old accumulation representation and
    /// admit the new one. Handles group migration when the key changed.
    pub fn modify(&mut self, old: &StdRecord, new: &StdRecord) -> Result<(), TransformError> {
        self.remove(old)?;
        self.add(new)
    }

    /// Merge pending group-row changes into `output`. Streaming mode emits
    /// only groups touched since the last call; otherwise every live group
    /// is re-emitted as an addition alongside the retractions.
    pub fn materialize_changes(&mut self, output: &mut ChangeSet) {
        let touched: Vec<GroupKey> = self.touched.drain(..).collect();

        for key in touched {
            let Some((present, live)) = self.groups.get(&key).map(|g| (g.present, g.count > 0))
            else {
                continue;
            };

            match (present, live) {
                (_, true) => {
                    if let Some(group) = self.groups.get_mut(&key) {
                        group.rebuild_row(&self.plan, present && self.streaming);
                        group.present = true;
                        if self.streaming {
                            if present {
                                output.modify.push(group.row.clone());
                            } else {
                                output.add.push(group.row.clone());
                            }
                        }
                    }
                }
                (true, false) => {
                    // Group emptied: retract its last materialized row.
                    if let Some(group) = self.groups.remove(&key) {
                        output.remove.push(group.row);
                    }
                }
                (false, false) => {
                    // Added and emptied within one window; never surfaced.
                    self.groups.remove(&key);
                }
            }
        }

        if !self.streaming {
            // Snapshot semantics: re-emit every live group each window.
            let mut rows: Vec<Tuple> = self
                .groups
                .values()
                .filter(|g| g.present)
                .map(|g| g.row.clone())
                .collect();
            rows.sort_unstable_by_key(|t| t.id);
            output.add.extend(rows);
        }

        tracing::trace!(
            adds = output.add.len(),
            mods = output.modify.len(),
            rems = output.remove.len(),
            groups = self.groups.len(),
            "materialized group changes"
        );
    }

    /// Full snapshot of the currently emitted group rows, used only when the
    /// session is being torn down.
    pub fn current_results(&self) -> Vec<Tuple> {
        let mut rows: Vec<Tuple> = self
            .groups
            .values()
            .filter(|g| g.present)
            .map(|g| g.row.clone())
            .collect();
        rows.sort_unstable_by_key(|t| t.id);
        rows
    }

    /// Drop all group state.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.touched.clear();
    }

    fn measure_inputs<'a>(
        &self,
        rec: &'a StdRecord,
    ) -> Result<SmallVec<[&'a FlowValue; 4]>, TransformError> {
        self.plan
            .measures
            .iter()
            .map(|m| {
                m.accessor
                    .get(&rec.value)
                    .map_err(|reason| TransformError::accessor(m.accessor.describe(), rec.id, reason))
            })
            .collect()
    }
}

#[cfg(test)]
mod accum_tests {
    use super::*;
    use crate::engine::plan::{compile, FieldSpec, ParamRef};
    use crate::engine::signal::SignalMap;
    use smallvec::smallvec;

    fn sum_mean_plan() -> AggregationPlan {
        compile(
            &[ParamRef::literal("category")],
            &[FieldSpec::new(
                ParamRef::literal("price"),
                vec![ParamRef::literal("sum"), ParamRef::literal("mean")],
            )],
            &SignalMap::new(),
        )
        .unwrap()
    }

    fn record(id: TupleId, category: &str, price: f64) -> StdRecord {
        StdRecord::new(
            id,
            smallvec![FlowValue::from(category)],
            FlowValue::object([
                (SmolStr::new("category"), FlowValue::from(category)),
                (SmolStr::new("price"), FlowValue::Number(price)),
            ]),
        )
    }

    fn streaming() -> GroupAccumulator {
        GroupAccumulator::new(sum_mean_plan(), true, TupleIds::new())
    }

    fn field_f64(t: &Tuple, name: &str) -> Option<f64> {
        t.get(name).and_then(|v| v.as_f64())
    }

    #[test]
    fn test_adds_materialize_as_group_rows() {
        let mut aggr = streaming();
        aggr.add(&record(1, "a", 10.0)).unwrap();
        aggr.add(&record(2, "a", 20.0)).unwrap();
        aggr.add(&record(3, "b", 5.0)).unwrap();

        let mut out = ChangeSet::new(0);
        aggr.materialize_changes(&mut out);

        assert_eq!(out.add.len(), 2);
        assert!(out.modify.is_empty() && out.remove.is_empty());

        let a = out
            .add
            .iter()
            .find(|t| t.get("category").and_then(|v| v.as_str()) == Some("a"))
            .unwrap();
        assert_eq!(field_f64(a, "sum_price"), Some(30.0));
        assert_eq!(field_f64(a, "mean_price"), Some(15.0));
        assert_eq!(aggr.group_count(), 2);
    }

    #[test]
    fn test_streaming_delta_is_minimal() {
        let mut aggr = streaming();
        aggr.add(&record(1, "a", 10.0)).unwrap();
        aggr.add(&record(2, "b", 5.0)).unwrap();
        aggr.materialize_changes(&mut ChangeSet::new(0));

        // Second window touches only group a
        aggr.add(&record(3, "a", 20.0)).unwrap();
        let mut out = ChangeSet::new(1);
        aggr.materialize_changes(&mut out);

        assert!(out.add.is_empty() && out.remove.is_empty());
        assert_eq!(out.modify.len(), 1);
        let row = &out.modify[0];
        assert_eq!(row.get("category").and_then(|v| v.as_str()), Some("a"));
        assert_eq!(field_f64(row, "sum_price"), Some(30.0));
        // Previous snapshot reflects the pre-window state
        assert_eq!(
            row.previous().get("sum_price").and_then(|v| v.as_f64()),
            Some(10.0)
        );
    }

    #[test]
    fn test_emptied_group_is_retracted() {
        let mut aggr = streaming();
        aggr.add(&record(1, "a", 10.0)).unwrap();
        aggr.materialize_changes(&mut ChangeSet::new(0));

        aggr.remove(&record(1, "a", 10.0)).unwrap();
        let mut out = ChangeSet::new(1);
        aggr.materialize_changes(&mut out);

        assert_eq!(out.remove.len(), 1);
        assert_eq!(
            out.remove[0].get("category").and_then(|v| v.as_str()),
            Some("a")
        );
        assert_eq!(aggr.group_count(), 0);
    }

    #[test]
    fn test_add_then_remove_same_window_never_surfaces() {
        let mut aggr = streaming();
        aggr.add(&record(1, "a", 10.0)).unwrap();
        aggr.remove(&record(1, "a", 10.0)).unwrap();

        let mut out = ChangeSet::new(0);
        aggr.materialize_changes(&mut out);
        assert!(out.is_empty());
        assert_eq!(aggr.group_count(), 0);
    }

    #[test]
    fn test_modify_within_group() {
        let mut aggr = streaming();
        aggr.add(&record(1, "a", 10.0)).unwrap();
        aggr.materialize_changes(&mut ChangeSet::new(0));

        aggr.modify(&record(1, "a", 10.0), &record(1, "a", 25.0)).unwrap();
        let mut out = ChangeSet::new(1);
        aggr.materialize_changes(&mut out);

        assert_eq!(out.modify.len(), 1);
        assert_eq!(field_f64(&out.modify[0], "sum_price"), Some(25.0));
    }

    #[test]
    fn test_modify_migrates_groups() {
        let mut aggr = streaming();
        aggr.add(&record(1, "a", 10.0)).unwrap();
        aggr.add(&record(2, "a", 20.0)).unwrap();
        aggr.materialize_changes(&mut ChangeSet::new(0));

        // Tuple 2 moves from group a to group b
        aggr.modify(&record(2, "a", 20.0), &record(2, "b", 20.0)).unwrap();
        let mut out = ChangeSet::new(1);
        aggr.materialize_changes(&mut out);

        assert_eq!(out.add.len(), 1);
        assert_eq!(out.modify.len(), 1);
        assert!(out.remove.is_empty());
        assert_eq!(field_f64(&out.modify[0], "sum_price"), Some(10.0));
        assert_eq!(
            out.add[0].get("category").and_then(|v| v.as_str()),
            Some("b")
        );
    }

    #[test]
    fn test_row_ids_are_stable_across_windows() {
        let mut aggr = streaming();
        aggr.add(&record(1, "a", 10.0)).unwrap();
        let mut out = ChangeSet::new(0);
        aggr.materialize_changes(&mut out);
        let row_id = out.add[0].id;

        aggr.add(&record(2, "a", 20.0)).unwrap();
        let mut out = ChangeSet::new(1);
        aggr.materialize_changes(&mut out);
        assert_eq!(out.modify[0].id, row_id);
    }

    #[test]
    fn test_remove_unknown_group_is_invariant_error() {
        let mut aggr = streaming();
        let err = aggr.remove(&record(1, "ghost", 1.0)).unwrap_err();
        assert!(matches!(err, TransformError::EngineInvariant(_)));
    }

    #[test]
    fn test_current_results_and_clear() {
        let mut aggr = streaming();
        aggr.add(&record(1, "a", 10.0)).unwrap();
        aggr.add(&record(2, "b", 5.0)).unwrap();
        aggr.materialize_changes(&mut ChangeSet::new(0));

        let rows = aggr.current_results();
        assert_eq!(rows.len(), 2);

        aggr.clear();
        assert_eq!(aggr.group_count(), 0);
        assert!(aggr.current_results().is_empty());
    }

    #[test]
    fn test_snapshot_mode_reemits_all_live_groups() {
        let mut aggr = GroupAccumulator::new(sum_mean_plan(), false, TupleIds::new());
        aggr.add(&record(1, "a", 10.0)).unwrap();
        aggr.add(&record(2, "b", 5.0)).unwrap();
        aggr.materialize_changes(&mut ChangeSet::new(0));

        aggr.add(&record(3, "a", 20.0)).unwrap();
        let mut out = ChangeSet::new(1);
        aggr.materialize_changes(&mut out);

        // Snapshot semantics: both groups come back as adds
        assert_eq!(out.add.len(), 2);
        assert!(out.modify.is_empty());
    }
}
