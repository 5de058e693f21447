mod changeset;
mod path;
mod tuple;
mod value;

pub use changeset::ChangeSet;
pub use path::Path;
pub use tuple::{Tuple, TupleId, TupleIds};
pub use value::FlowValue;

use rustc_hash::FxHasher;
use smol_str::SmolStr;
use std::hash::BuildHasherDefault;

pub type FastMap<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<FxHasher>>;
pub type FastSet<T> = std::collections::HashSet<T, BuildHasherDefault<FxHasher>>;

/// Ordered set of output field names (declaration order is meaningful).
pub type FieldSet = indexmap::IndexSet<SmolStr, BuildHasherDefault<FxHasher>>;
