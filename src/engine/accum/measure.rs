//! Per-measure running statistics. A cell maintains streaming moments that
//! support both update and downdate, so record removal is O(1); ops that
//! cannot be downdated from moments alone (order statistics, distinct,
//! extrema) additionally keep the per-record values.

use crate::engine::eval::{compare_values, value_key};
use crate::engine::plan::AggregateOp;
use crate::engine::types::{FastMap, FastSet, FlowValue, TupleId};

#[derive(Debug, Clone, Default)]
pub struct MeasureCell {
    count: i64,
    missing: i64,
    nonnumeric: i64,
    num: i64,
    sum: f64,
    mean: f64,
    m2: f64,
    collected: Option<Vec<(TupleId, FlowValue)>>,
}

impl MeasureCell {
    pub fn new(collect: bool) -> Self {
        Self {
            collected: collect.then(Vec::new),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn add(&mut self, id: TupleId, value: &FlowValue) {
        self.count += 1;
        if value.is_null() {
            self.missing += 1;
        } else if let Some(x) = value.as_f64() {
            self.num += 1;
            self.sum += x;
            let d = x - self.mean;
            self.mean += d / self.num as f64;
            self.m2 += d * (x - self.mean);
        } else {
            self.nonnumeric += 1;
        }

        if let Some(values) = self.collected.as_mut() {
            values.push((id, value.clone()));
        }
    }

    pub fn remove(&mut self, id: TupleId, value: &FlowValue) -> Result<(), String> {
        self.count -= 1;
        if self.count < 0 {
            return Err(format!("cell count underflow removing tuple {}", id));
        }

        if value.is_null() {
            self.missing -= 1;
            if self.missing < 0 {
                return Err(format!("missing-count underflow removing tuple {}", id));
            }
        } else if let Some(x) = value.as_f64() {
            let n = self.num as f64;
            self.num -= 1;
            if self.num < 0 {
                return Err(format!("numeric-count underflow removing tuple {}", id));
            }
            self.sum -= x;
            if self.num == 0 {
                self.mean = 0.0;
                self.m2 = 0.0;
            } else {
                let new_mean = (n * self.mean - x) / self.num as f64;
                self.m2 -= (x - self.mean) * (x - new_mean);
                self.mean = new_mean;
                if self.m2 < 0.0 {
                    // Floating-point drift; the true sum of squared deviations
                    // is never negative.
                    self.m2 = 0.0;
                }
            }
        } else {
            self.nonnumeric -= 1;
            if self.nonnumeric < 0 {
                return Err(format!("non-numeric-count underflow removing tuple {}", id));
            }
        }

        if let Some(values) = self.collected.as_mut() {
            match values.iter().position(|(vid, _)| *vid == id) {
                Some(pos) => {
                    values.swap_remove(pos);
                }
                None => {
                    return Err(format!("tuple {} was never added to this cell", id));
                }
            }
        }
        Ok(())
    }

    /// Compute one operator's output from the cell's current state.
    pub fn output(
        &self,
        op: AggregateOp,
        members: Option<&FastMap<TupleId, FlowValue>>,
    ) -> FlowValue {
        match op {
            AggregateOp::Count => FlowValue::Number(self.count as f64),
            AggregateOp::Valid => FlowValue::Number((self.count - self.missing) as f64),
            AggregateOp::Missing => FlowValue::Number(self.missing as f64),
            AggregateOp::Sum => FlowValue::Number(self.sum),
            AggregateOp::Mean | AggregateOp::Average => {
                if self.num > 0 {
                    FlowValue::Number(self.mean)
                } else {
                    FlowValue::Null
                }
            }
            AggregateOp::Variance => self.variance(1),
            AggregateOp::Variancep => self.variance(0),
            AggregateOp::Stdev => sqrt_of(self.variance(1)),
            AggregateOp::Stdevp => sqrt_of(self.variance(0)),
            AggregateOp::Values => FlowValue::Array(
                self.collected
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|(_, v)| v.clone())
                    .collect(),
            ),
            AggregateOp::Distinct => {
                let mut seen: FastSet<smol_str::SmolStr> = FastSet::default();
                for (_, v) in self.collected.as_deref().unwrap_or_default() {
                    seen.insert(value_key(v));
                }
                FlowValue::Number(seen.len() as f64)
            }
            AggregateOp::Median => self.quantile(0.5),
            AggregateOp::Q1 => self.quantile(0.25),
            AggregateOp::Q3 => self.quantile(0.75),
            AggregateOp::Modeskew => {
                let stdev = match sqrt_of(self.variance(1)).as_f64() {
                    Some(s) if s > 0.0 => s,
                    _ => return FlowValue::Number(0.0),
                };
                match self.quantile(0.5).as_f64() {
                    Some(median) => FlowValue::Number(3.0 * (self.mean - median) / stdev),
                    None => FlowValue::Number(0.0),
                }
            }
            AggregateOp::Min => self.extremum(true).map(|(_, v)| v.clone()).unwrap_or_default(),
            AggregateOp::Max => self.extremum(false).map(|(_, v)| v.clone()).unwrap_or_default(),
            AggregateOp::Argmin => self.arg_extremum(true, members),
            AggregateOp::Argmax => self.arg_extremum(false, members),
        }
    }

    fn variance(&self, ddof: i64) -> FlowValue {
        if self.num > ddof {
            FlowValue::Number(self.m2 / (self.num - ddof) as f64)
        } else {
            FlowValue::Null
        }
    }

    fn quantile(&self, p: f64) -> FlowValue {
        let mut nums: Vec<f64> = self
            .collected
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|(_, v)| v.as_f64())
            .collect();
        if nums.is_empty() {
            return FlowValue::Null;
        }
        nums.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        // Linear interpolation between closest ranks (type-7)
        let h = (nums.len() - 1) as f64 * p;
        let lo = h.floor() as usize;
        let hi = (lo + 1).min(nums.len() - 1);
        FlowValue::Number(nums[lo] + (nums[hi] - nums[lo]) * (h - lo as f64))
    }

    /// Extremal (id, value) over the collected non-null values.
    fn extremum(&self, min: bool) -> Option<&(TupleId, FlowValue)> {
        self.collected
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|(_, v)| !v.is_null())
            .reduce(|best, cand| {
                let ord = compare_values(Some(&cand.1), Some(&best.1));
                let better = if min { ord.is_lt() } else { ord.is_gt() };
                if better {
                    cand
                } else {
                    best
                }
            })
    }

    fn arg_extremum(
        &self,
        min: bool,
        members: Option<&FastMap<TupleId, FlowValue>>,
    ) -> FlowValue {
        match (self.extremum(min), members) {
            (Some((id, _)), Some(members)) => members.get(id).cloned().unwrap_or_default(),
            _ => FlowValue::Null,
        }
    }
}

fn sqrt_of(v: FlowValue) -> FlowValue {
    match v {
        FlowValue::Number(n) => FlowValue::Number(n.sqrt()),
        other => other,
    }
}
