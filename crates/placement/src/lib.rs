pub mod engine;
pub mod sizegen;

pub use engine::{place_sets, PlacedSet};
pub use sizegen::schedule_for;
