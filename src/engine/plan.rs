//! Field plan compilation: resolving declared groupby fields and summarize
//! field/op/alias specs — which may reference runtime signals — into a
//! concrete aggregation plan and the ordered list of output field names.

use super::eval::resolve_path;
use super::signal::{Dependencies, SignalResolver};
use super::types::{FlowValue, Path};
use crate::error::TransformError;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

static NULL_VALUE: FlowValue = FlowValue::Null;

/// A parameter entry: either a literal string or a reference to a runtime
/// signal, resolved at plan-compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamRef {
    Literal(SmolStr),
    Signal { signal: SmolStr },
}

impl ParamRef {
    pub fn literal(s: impl Into<SmolStr>) -> Self {
        ParamRef::Literal(s.into())
    }

    pub fn signal(s: impl Into<SmolStr>) -> Self {
        ParamRef::Signal { signal: s.into() }
    }

    pub fn signal_name(&self) -> Option<&SmolStr> {
        match self {
            ParamRef::Literal(_) => None,
            ParamRef::Signal { signal } => Some(signal),
        }
    }

    /// Resolve to a concrete string, reading the signal system when needed.
    pub fn resolve(&self, signals: &dyn SignalResolver) -> Result<SmolStr, TransformError> {
        match self {
            ParamRef::Literal(s) => Ok(s.clone()),
            ParamRef::Signal { signal } => match signals.signal(signal) {
                Some(FlowValue::Str(s)) => Ok(s.clone()),
                Some(other) => Err(TransformError::config(format!(
                    "signal '{}' must resolve to a string, got {}",
                    signal,
                    other.type_name()
                ))),
                None => Err(TransformError::config(format!(
                    "signal '{}' is not defined",
                    signal
                ))),
            },
        }
    }
}

/// One summarize declaration: a source field, the operators to run on it,
/// and optional output aliases (positional, parallel to `ops`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: ParamRef,
    pub ops: Vec<ParamRef>,
    #[serde(default, rename = "as")]
    pub aliases: Vec<ParamRef>,
}

impl FieldSpec {
    pub fn new(field: ParamRef, ops: Vec<ParamRef>) -> Self {
        Self {
            field,
            ops,
            aliases: Vec::new(),
        }
    }
}

/// The closed set of aggregate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Values,
    Count,
    Valid,
    Missing,
    Distinct,
    Sum,
    Mean,
    Average,
    Variance,
    Variancep,
    Stdev,
    Stdevp,
    Median,
    Q1,
    Q3,
    Modeskew,
    Min,
    Max,
    Argmin,
    Argmax,
}

impl AggregateOp {
    pub const ALL: [AggregateOp; 20] = [
        AggregateOp::Values,
        AggregateOp::Count,
        AggregateOp::Valid,
        AggregateOp::Missing,
        AggregateOp::Distinct,
        AggregateOp::Sum,
        AggregateOp::Mean,
        AggregateOp::Average,
        AggregateOp::Variance,
        AggregateOp::Variancep,
        AggregateOp::Stdev,
        AggregateOp::Stdevp,
        AggregateOp::Median,
        AggregateOp::Q1,
        AggregateOp::Q3,
        AggregateOp::Modeskew,
        AggregateOp::Min,
        AggregateOp::Max,
        AggregateOp::Argmin,
        AggregateOp::Argmax,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "values" => AggregateOp::Values,
            "count" => AggregateOp::Count,
            "valid" => AggregateOp::Valid,
            "missing" => AggregateOp::Missing,
            "distinct" => AggregateOp::Distinct,
            "sum" => AggregateOp::Sum,
            "mean" => AggregateOp::Mean,
            "average" => AggregateOp::Average,
            "variance" => AggregateOp::Variance,
            "variancep" => AggregateOp::Variancep,
            "stdev" => AggregateOp::Stdev,
            "stdevp" => AggregateOp::Stdevp,
            "median" => AggregateOp::Median,
            "q1" => AggregateOp::Q1,
            "q3" => AggregateOp::Q3,
            "modeskew" => AggregateOp::Modeskew,
            "min" => AggregateOp::Min,
            "max" => AggregateOp::Max,
            "argmin" => AggregateOp::Argmin,
            "argmax" => AggregateOp::Argmax,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Values => "values",
            AggregateOp::Count => "count",
            AggregateOp::Valid => "valid",
            AggregateOp::Missing => "missing",
            AggregateOp::Distinct => "distinct",
            AggregateOp::Sum => "sum",
            AggregateOp::Mean => "mean",
            AggregateOp::Average => "average",
            AggregateOp::Variance => "variance",
            AggregateOp::Variancep => "variancep",
            AggregateOp::Stdev => "stdev",
            AggregateOp::Stdevp => "stdevp",
            AggregateOp::Median => "median",
            AggregateOp::Q1 => "q1",
            AggregateOp::Q3 => "q3",
            AggregateOp::Modeskew => "modeskew",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Argmin => "argmin",
            AggregateOp::Argmax => "argmax",
        }
    }

    /// Ops that cannot be downdated from running moments alone; their cell
    /// must keep the per-record values.
    pub fn needs_collection(&self) -> bool {
        matches!(
            self,
            AggregateOp::Values
                | AggregateOp::Distinct
                | AggregateOp::Median
                | AggregateOp::Q1
                | AggregateOp::Q3
                | AggregateOp::Modeskew
                | AggregateOp::Min
                | AggregateOp::Max
                | AggregateOp::Argmin
                | AggregateOp::Argmax
        )
    }

    /// Ops whose output is a whole member record, not a statistic of the
    /// measured values.
    pub fn needs_members(&self) -> bool {
        matches!(self, AggregateOp::Argmin | AggregateOp::Argmax)
    }

    /// Default output field name: `count`, or `op_field` for everything else.
    pub fn default_output(&self, field: &str) -> SmolStr {
        match self {
            AggregateOp::Count => SmolStr::new("count"),
            _ => SmolStr::new(format!("{}_{}", self.name(), field)),
        }
    }
}

/// A compiled accessor: one of a closed set of variants, resolved once at
/// plan-compile time and never re-dispatched per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// Pass the value through unchanged.
    Identity,
    /// Walk a dotted path into the value.
    Path(Path),
}

impl Accessor {
    pub fn field(name: &str) -> Self {
        Accessor::Path(Path::new(name))
    }

    pub fn describe(&self) -> SmolStr {
        match self {
            Accessor::Identity => SmolStr::new("<identity>"),
            Accessor::Path(p) => SmolStr::new(p.as_str()),
        }
    }

    /// Apply the accessor. A missing field reads as null; traversing through
    /// an explicit null is an error (the record shape cannot be read), which
    /// the caller surfaces as an `AccessorError` for the pulse.
    pub fn get<'a>(&self, root: &'a FlowValue) -> Result<&'a FlowValue, String> {
        match self {
            Accessor::Identity => Ok(root),
            Accessor::Path(path) => {
                let mut current = root;
                for (i, part) in path.segments().iter().enumerate() {
                    match current {
                        FlowValue::Object(map) => {
                            current = map.get(part).unwrap_or(&NULL_VALUE);
                        }
                        FlowValue::Null if i > 0 => {
                            return Err(format!("null has no field '{}'", part));
                        }
                        FlowValue::Null => {
                            return Err(format!("record is null, cannot read '{}'", part));
                        }
                        // Scalar in the middle of a path reads as missing
                        _ => return Ok(&NULL_VALUE),
                    }
                }
                Ok(current)
            }
        }
    }

    /// Non-failing variant used where absence is acceptable.
    pub fn try_get<'a>(&self, root: &'a FlowValue) -> Option<&'a FlowValue> {
        match self {
            Accessor::Identity => Some(root),
            Accessor::Path(path) => resolve_path(Some(root), path),
        }
    }
}

/// A groupby dimension: output field name plus the accessor deriving it.
#[derive(Debug, Clone)]
pub struct Dim {
    pub name: SmolStr,
    pub accessor: Accessor,
}

/// One resolved (operator, output name) pair of a measure.
#[derive(Debug, Clone)]
pub struct MeasureOutput {
    pub op: AggregateOp,
    pub name: SmolStr,
}

/// A compiled measure: source field, accessor, and its resolved outputs.
#[derive(Debug, Clone)]
pub struct Measure {
    pub field: SmolStr,
    pub accessor: Accessor,
    pub outputs: Vec<MeasureOutput>,
    pub collect: bool,
    pub track_members: bool,
}

/// The compiled aggregation plan. Output field names are fixed for the
/// plan's lifetime: dims first, then every measure output, in declaration
/// order.
#[derive(Debug, Clone, Default)]
pub struct AggregationPlan {
    pub dims: Vec<Dim>,
    pub measures: Vec<Measure>,
    pub wildcard: bool,
}

impl AggregationPlan {
    pub fn output_fields(&self) -> Vec<SmolStr> {
        let mut fields = Vec::with_capacity(
            self.dims.len() + self.measures.iter().map(|m| m.outputs.len()).sum::<usize>(),
        );
        for dim in &self.dims {
            fields.push(dim.name.clone());
        }
        for measure in &self.measures {
            for out in &measure.outputs {
                fields.push(out.name.clone());
            }
        }
        fields
    }

    pub fn needs_members(&self) -> bool {
        self.measures.iter().any(|m| m.track_members)
    }

    /// Rewrite measure accessors to identity; used when the standardizer
    /// already extracts the measured value before the accumulator sees it.
    pub fn with_identity_measures(mut self) -> Self {
        for measure in &mut self.measures {
            measure.accessor = Accessor::Identity;
        }
        self
    }
}

/// Collect every signal name referenced anywhere in the parameters. This is
/// the transform's runtime dependency set, declared outward to the host.
pub fn signal_dependencies(groupby: &[ParamRef], summarize: &[FieldSpec]) -> Dependencies {
    let mut names: Vec<SmolStr> = Vec::new();
    let mut push = |r: &ParamRef| {
        if let Some(name) = r.signal_name() {
            names.push(name.clone());
        }
    };

    for g in groupby {
        push(g);
    }
    for spec in summarize {
        push(&spec.field);
        for op in &spec.ops {
            push(op);
        }
        for alias in &spec.aliases {
            push(alias);
        }
    }
    Dependencies::from_names(names)
}

/// Compile declared parameters into a concrete plan, resolving signal
/// references through the given resolver.
pub fn compile(
    groupby: &[ParamRef],
    summarize: &[FieldSpec],
    signals: &dyn SignalResolver,
) -> Result<AggregationPlan, TransformError> {
    let dims = groupby
        .iter()
        .map(|g| {
            let name = g.resolve(signals)?;
            Ok(Dim {
                accessor: Accessor::field(&name),
                name,
            })
        })
        .collect::<Result<Vec<_>, TransformError>>()?;

    if summarize.is_empty() {
        // Sentinel wildcard plan: group-level cardinality only.
        return Ok(AggregationPlan {
            dims,
            measures: vec![Measure {
                field: SmolStr::new("*"),
                accessor: Accessor::Identity,
                outputs: vec![MeasureOutput {
                    op: AggregateOp::Count,
                    name: SmolStr::new("count"),
                }],
                collect: false,
                track_members: false,
            }],
            wildcard: true,
        });
    }

    let mut measures = Vec::with_capacity(summarize.len());
    for spec in summarize {
        let field = spec.field.resolve(signals)?;

        let mut outputs = Vec::with_capacity(spec.ops.len());
        for (i, op_ref) in spec.ops.iter().enumerate() {
            let op_name = op_ref.resolve(signals)?;
            let op = AggregateOp::parse(&op_name).ok_or_else(|| {
                TransformError::config(format!("unknown aggregate operator '{}'", op_name))
            })?;
            let name = match spec.aliases.get(i) {
                Some(alias) => alias.resolve(signals)?,
                None => op.default_output(&field),
            };
            outputs.push(MeasureOutput { op, name });
        }

        let collect = outputs.iter().any(|o| o.op.needs_collection());
        let track_members = outputs.iter().any(|o| o.op.needs_members());
        measures.push(Measure {
            accessor: Accessor::field(&field),
            field,
            outputs,
            collect,
            track_members,
        });
    }

    Ok(AggregationPlan {
        dims,
        measures,
        wildcard: false,
    })
}
