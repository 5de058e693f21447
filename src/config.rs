//! JSON-facing boundary for the transform's declarative parameters.
//!
//! Accepts the two summarize shapes of the declarative schema — a mapping of
//! field name to operator list, or an explicit array of `{field, ops, as}`
//! objects — and rejects unknown operator names before anything reaches the
//! plan compiler.

use crate::engine::plan::{AggregateOp, FieldSpec, ParamRef};
use crate::engine::transform::AggregateParams;
use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParams {
    #[serde(default)]
    groupby: Vec<ParamRef>,
    #[serde(default)]
    summarize: Option<SummarizeDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SummarizeDecl {
    /// `[{"field": "price", "ops": ["sum"], "as": ["total"]}, ...]`
    Fields(Vec<RawFieldSpec>),
    /// `{"price": ["sum", "mean"], ...}` — declaration order is preserved.
    Map(IndexMap<String, OneOrMany>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFieldSpec {
    field: ParamRef,
    ops: OneOrMany,
    #[serde(default, rename = "as")]
    aliases: Vec<ParamRef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(ParamRef),
    Many(Vec<ParamRef>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<ParamRef> {
        match self {
            OneOrMany::One(r) => vec![r],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Parse and validate declarative parameters.
#[instrument(skip(value))]
pub fn parse_params(value: &Value) -> Result<AggregateParams> {
    let raw: RawParams =
        serde_json::from_value(value.clone()).context("invalid aggregate parameters")?;

    let summarize = match raw.summarize {
        None => Vec::new(),
        Some(SummarizeDecl::Fields(fields)) => fields
            .into_iter()
            .map(|f| {
                finish_spec(FieldSpec {
                    field: f.field,
                    ops: f.ops.into_vec(),
                    aliases: f.aliases,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(SummarizeDecl::Map(map)) => map
            .into_iter()
            .map(|(field, ops)| finish_spec(FieldSpec::new(ParamRef::literal(field), ops.into_vec())))
            .collect::<Result<Vec<_>>>()?,
    };

    Ok(AggregateParams {
        groupby: raw.groupby,
        summarize,
    })
}

fn finish_spec(spec: FieldSpec) -> Result<FieldSpec> {
    if spec.ops.is_empty() {
        return Err(anyhow!("summarize entry requires at least one op"));
    }
    for op in &spec.ops {
        if let ParamRef::Literal(name) = op {
            if AggregateOp::parse(name).is_none() {
                return Err(anyhow!("unknown aggregate operator '{}'", name));
            }
        }
    }
    Ok(spec)
}
