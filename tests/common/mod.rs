//! Common utilities for reflow integration tests: record builders, pulse
//! builders, a downstream state mirror, and a recompute-from-scratch
//! reference aggregator used by the convergence suite.

#![allow(dead_code)]

use reflow::{
    AggregateParams, ChangeSet, FastMap, FieldSpec, FlowValue, ParamRef, Tuple, TupleId,
};
use serde_json::{json, Value};

/// Build a `{category, price}` record tuple.
pub fn record(id: TupleId, category: &str, price: f64) -> Tuple {
    Tuple::new(id, json!({ "category": category, "price": price }).into())
}

/// Build a record tuple from arbitrary JSON.
pub fn record_from(id: TupleId, data: Value) -> Tuple {
    Tuple::new(id, data.into())
}

/// Build a modified record carrying its pre-pulse snapshot.
pub fn modified(id: TupleId, current: Value, prev: Value) -> Tuple {
    Tuple::with_prev(id, current.into(), prev.into())
}

/// Declare parameters from plain strings:
/// `params(&["category"], &[("price", &["sum", "mean"])])`.
pub fn params(groupby: &[&str], summarize: &[(&str, &[&str])]) -> AggregateParams {
    AggregateParams {
        groupby: groupby.iter().map(|g| ParamRef::literal(*g)).collect(),
        summarize: summarize
            .iter()
            .map(|(field, ops)| {
                FieldSpec::new(
                    ParamRef::literal(*field),
                    ops.iter().map(|o| ParamRef::literal(*o)).collect(),
                )
            })
            .collect(),
    }
}

pub fn f64_field(t: &Tuple, name: &str) -> Option<f64> {
    t.get(name).and_then(|v| v.as_f64())
}

pub fn str_field<'a>(t: &'a Tuple, name: &str) -> Option<&'a str> {
    t.get(name).and_then(|v| v.as_str())
}

/// Find the row in a partition whose `field` equals `value`.
pub fn row_where<'a>(rows: &'a [Tuple], field: &str, value: &str) -> Option<&'a Tuple> {
    rows.iter().find(|t| str_field(t, field) == Some(value))
}

/// Mirror of what a downstream consumer holds after applying each output
/// delta in order.
#[derive(Debug, Default)]
pub struct DownstreamState {
    rows: FastMap<TupleId, FlowValue>,
}

impl DownstreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, out: &ChangeSet) {
        for t in &out.add {
            assert!(
                self.rows.insert(t.id, t.data.clone()).is_none(),
                "row {} added twice",
                t.id
            );
        }
        for t in &out.modify {
            assert!(
                self.rows.insert(t.id, t.data.clone()).is_some(),
                "row {} modified before being added",
                t.id
            );
        }
        for t in &out.remove {
            assert!(
                self.rows.remove(&t.id).is_some(),
                "row {} removed before being added",
                t.id
            );
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = &FlowValue> {
        self.rows.values()
    }

    pub fn row_where(&self, field: &str, value: &str) -> Option<&FlowValue> {
        self.rows
            .values()
            .find(|r| r.get(field).and_then(|v| v.as_str()) == Some(value))
    }
}

/// Recompute-from-scratch reference: groups `(category, price)` records and
/// computes the standard statistics directly from the full record set.
#[derive(Debug, Default)]
pub struct ReferenceAggregator {
    records: FastMap<TupleId, (String, f64)>,
}

#[derive(Debug, PartialEq)]
pub struct ReferenceGroup {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub variance: Option<f64>,
    pub min: f64,
    pub max: f64,
}

impl ReferenceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: TupleId, category: &str, price: f64) {
        self.records.insert(id, (category.to_string(), price));
    }

    pub fn remove(&mut self, id: TupleId) {
        self.records.remove(&id);
    }

    pub fn category_of(&self, id: TupleId) -> Option<&str> {
        self.records.get(&id).map(|(c, _)| c.as_str())
    }

    pub fn price_of(&self, id: TupleId) -> Option<f64> {
        self.records.get(&id).map(|(_, p)| *p)
    }

    pub fn ids(&self) -> Vec<TupleId> {
        let mut ids: Vec<TupleId> = self.records.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn groups(&self) -> FastMap<String, ReferenceGroup> {
        let mut by_category: FastMap<String, Vec<f64>> = FastMap::default();
        for (category, price) in self.records.values() {
            by_category.entry(category.clone()).or_default().push(*price);
        }

        by_category
            .into_iter()
            .map(|(category, prices)| {
                let count = prices.len();
                let sum: f64 = prices.iter().sum();
                let mean = sum / count as f64;
                let variance = (count > 1).then(|| {
                    prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (count - 1) as f64
                });
                let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                (
                    category,
                    ReferenceGroup {
                        count,
                        sum,
                        mean,
                        variance,
                        min,
                        max,
                    },
                )
            })
            .collect()
    }
}

pub fn assert_close(a: f64, b: f64, context: &str) {
    let tolerance = 1e-9 * a.abs().max(b.abs()).max(1.0);
    assert!(
        (a - b).abs() <= tolerance,
        "{}: {} != {}",
        context,
        a,
        b
    );
}
