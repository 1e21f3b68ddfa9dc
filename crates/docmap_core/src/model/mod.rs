//! Attribute mapping and persistence for document-backed types.
//!
//! # Responsibility
//! - Declare per-type attribute mappings (`schema`) built from descriptors
//!   (`attribute`).
//! - Convert typed instances to and from raw documents (`mappable`).
//! - Save and load model instances through the active scope (`persist`).
//!
//! # Invariants
//! - Every model is identified by an `id` attribute holding a `Key`.
//! - Documents are the only shape exchanged with the database.

pub mod attribute;
pub mod error;
pub mod key;
pub mod mappable;
pub mod persist;
pub mod schema;

pub use error::{ModelError, ModelResult};
