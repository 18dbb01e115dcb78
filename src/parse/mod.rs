pub mod hierarchy;
pub mod reference;

pub use reference::{Reference, ReferenceError, Relation, parse_reference, parse_reference_list};
