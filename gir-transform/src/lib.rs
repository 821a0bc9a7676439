//! Transformation passes over the genc machine IR.

mod coalesce;

pub use self::coalesce::{CoalesceOptions, CoalesceSpillFills};
