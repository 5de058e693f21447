use super::{FieldSet, Tuple};
use smol_str::SmolStr;

/// The unit of flow between transforms: one pulse's added, modified and
/// removed tuples, plus the set of output field names the producer may have
/// touched. Downstream consumers use `fields` to decide whether they must
/// re-evaluate at all.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Provenance: the evaluation pulse this delta belongs to.
    pub stamp: u64,
    pub add: Vec<Tuple>,
    pub modify: Vec<Tuple>,
    pub remove: Vec<Tuple>,
    pub fields: FieldSet,
}

impl ChangeSet {
    pub fn new(stamp: u64) -> Self {
        Self {
            stamp,
            ..Self::default()
        }
    }

    /// Start an output delta carrying the input's provenance, with empty
    /// partitions.
    pub fn derive(input: &ChangeSet) -> Self {
        Self::new(input.stamp)
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.modify.is_empty() && self.remove.is_empty()
    }

    /// Total number of tuples across all three partitions.
    pub fn len(&self) -> usize {
        self.add.len() + self.modify.len() + self.remove.len()
    }

    pub fn touches(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn mark_field(&mut self, field: impl Into<SmolStr>) {
        self.fields.insert(field.into());
    }
}

#[cfg(test)]
mod changeset_tests {
    use super::*;
    use crate::engine::types::FlowValue;

    #[test]
    fn test_derive_carries_stamp_only() {
        let mut input = ChangeSet::new(7);
        input.add.push(Tuple::new(1, FlowValue::Null));
        input.mark_field("price");

        let out = ChangeSet::derive(&input);
        assert_eq!(out.stamp, 7);
        assert!(out.is_empty());
        assert!(out.fields.is_empty());
    }

    #[test]
    fn test_len_counts_all_partitions() {
        let mut cs = ChangeSet::new(0);
        cs.add.push(Tuple::new(1, FlowValue::Null));
        cs.modify.push(Tuple::new(2, FlowValue::Null));
        cs.remove.push(Tuple::new(3, FlowValue::Null));

        assert_eq!(cs.len(), 3);
        assert!(!cs.is_empty());
    }

    #[test]
    fn test_field_manifest_is_a_set() {
        let mut cs = ChangeSet::new(0);
        cs.mark_field("sum_price");
        cs.mark_field("sum_price");
        cs.mark_field("category");

        assert_eq!(cs.fields.len(), 2);
        assert!(cs.touches("sum_price"));
        assert!(!cs.touches("mean_price"));
    }

    #[test]
    fn test_field_manifest_preserves_order() {
        let mut cs = ChangeSet::new(0);
        cs.mark_field("category");
        cs.mark_field("sum_price");
        cs.mark_field("mean_price");

        let names: Vec<&str> = cs.fields.iter().map(|f| f.as_str()).collect();
        assert_eq!(names, ["category", "sum_price", "mean_price"]);
    }
}
