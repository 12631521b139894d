//! Developer tooling: read-only inspection of a live object population.

pub mod inspector;

pub use inspector::{ObjectInfo, ObjectInspector, PopulationSummary};
