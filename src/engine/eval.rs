//! Value-level helpers shared by accessors and the accumulator: nested path
//! resolution, a total order over the value domain, and canonical value keys
//! used for grouping and distinct counting.

use super::types::{FlowValue, Path};
use smol_str::SmolStr;
use std::cmp::Ordering;

/// Resolve nested value using dot notation path
#[inline(always)]
pub fn resolve_path<'a>(root: Option<&'a FlowValue>, path: &Path) -> Option<&'a FlowValue> {
    let mut current = root;
    for part in &path.0 {
        match current {
            Some(FlowValue::Object(map)) => {
                current = map.get(part);
            }
            _ => return None,
        }
    }
    current
}

/// Compare two FlowValues for ordering. Nulls sort first, then values by
/// type rank, then within-type.
pub fn compare_values(a: Option<&FlowValue>, b: Option<&FlowValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(va), Some(vb)) => match (va, vb) {
            (FlowValue::Null, FlowValue::Null) => Ordering::Equal,
            (FlowValue::Bool(ba), FlowValue::Bool(bb)) => ba.cmp(bb),
            (FlowValue::Number(na), FlowValue::Number(nb)) => {
                na.partial_cmp(nb).unwrap_or(Ordering::Equal)
            }
            (FlowValue::Str(sa), FlowValue::Str(sb)) => sa.cmp(sb),
            (FlowValue::Array(aa), FlowValue::Array(ab)) => {
                let len_cmp = aa.len().cmp(&ab.len());
                if len_cmp != Ordering::Equal {
                    return len_cmp;
                }
                for (ia, ib) in aa.iter().zip(ab.iter()) {
                    let cmp = compare_values(Some(ia), Some(ib));
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                Ordering::Equal
            }
            (FlowValue::Object(oa), FlowValue::Object(ob)) => oa.len().cmp(&ob.len()),
            _ => type_rank(va).cmp(&type_rank(vb)),
        },
    }
}

fn type_rank(v: &FlowValue) -> u8 {
    match v {
        FlowValue::Null => 0,
        FlowValue::Bool(_) => 1,
        FlowValue::Number(_) => 2,
        FlowValue::Str(_) => 3,
        FlowValue::Array(_) => 4,
        FlowValue::Object(_) => 5,
    }
}

/// Canonical string key for a value. Same recursion shape as a structural
/// hash, but kept as a string so group keys stay debuggable in logs.
pub fn value_key(v: &FlowValue) -> SmolStr {
    let mut buf = String::new();
    encode_value(v, &mut buf);
    SmolStr::new(buf)
}

/// Canonical key over a sequence of values (a group's dim values), joined
/// with a unit separator so adjacent values cannot collide.
pub fn composite_key(values: &[FlowValue]) -> SmolStr {
    let mut buf = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            buf.push('\u{1f}');
        }
        encode_value(v, &mut buf);
    }
    SmolStr::new(buf)
}

fn encode_value(v: &FlowValue, buf: &mut String) {
    match v {
        FlowValue::Null => buf.push_str("z:"),
        FlowValue::Bool(b) => {
            buf.push_str("b:");
            buf.push(if *b { '1' } else { '0' });
        }
        FlowValue::Number(n) => {
            buf.push_str("n:");
            buf.push_str(&n.to_string());
        }
        FlowValue::Str(s) => {
            buf.push_str("s:");
            buf.push_str(s.as_str());
        }
        FlowValue::Array(arr) => {
            buf.push_str("a:[");
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push('\u{1f}');
                }
                encode_value(item, buf);
            }
            buf.push(']');
        }
        FlowValue::Object(obj) => {
            // Sort keys so structurally equal objects key identically
            let mut entries: Vec<_> = obj.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            buf.push_str("o:{");
            for (i, (k, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push('\u{1f}');
                }
                buf.push_str(k.as_str());
                buf.push('=');
                encode_value(val, buf);
            }
            buf.push('}');
        }
    }
}
