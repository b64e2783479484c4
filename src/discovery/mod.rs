//! Schema discovery: the catalog walk, the snapshot it produces and the
//! relationship analysis built on top of it.

pub mod discoverer;
pub mod relationships;
pub mod snapshot;

pub use discoverer::discover;
pub use relationships::{Relationship, RelationshipReport, analyze};
pub use snapshot::{CatalogLookup, SchemaSnapshot, TableDescriptor};
