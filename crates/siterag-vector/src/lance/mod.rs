//! LanceDB-backed content store (feature `lance`).
//!
//! One row per chunk with a nullable fixed-size `vector` column. Tenant and
//! filter predicates are pushed into every query with `only_if`.
pub mod schema;
pub mod store;

pub use schema::DEFAULT_TABLE;
pub use store::LanceStore;
