//! Schema definitions for the Kvetch storage engine.
//!
//! A [`Schema`] is built once at process start and shared read-only for the
//! lifetime of a router. It is validated eagerly: every name is unique,
//! every index and edge resolves to a declared object type, and every name
//! that becomes a SQL identifier is a plain identifier.
//!
//! # Definitions
//!
//! - [`ObjectTypeDefinition`]: `type_name` ↔ `type_id`
//! - [`IndexDefinition`]: secondary, non-unique index over one attribute
//! - [`StoredIdEdgeDefinition`]: edge derived from a foreign-key-shaped attribute
//! - [`TypeRegistry`]: explicit type-tag → constructor dispatch table

pub mod definitions;
pub mod error;
pub mod index_value;
pub mod registry;
pub mod schema;

pub use definitions::{
    define_int_index, define_object, define_stored_id_edge, define_string_index, IndexDefinition,
    IndexType, ObjectTypeDefinition, StoredIdEdgeDefinition,
};
pub use error::{SchemaError, SchemaResult};
pub use index_value::IndexValue;
pub use registry::TypeRegistry;
pub use schema::{Schema, SchemaDefinition};
