//! Repository layer, entity-scoped database operations.

mod case;

pub use case::*;
