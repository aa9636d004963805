//! Foundation types for the Kvetch object-graph storage engine.
//!
//! Every other Kvetch crate depends on `kvetch-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: globally unique 128-bit object identifier
//! - [`TypeId`]: integer object type tag, fixed at creation
//! - [`Value`] / [`Attributes`]: open attribute map stored on objects and edges
//! - [`ObjectRecord`]: an object as returned by a shard
//! - [`Edge`]: a directed, insertion-ordered association between two objects
//! - [`Page`]: cursor pagination request (`after` + `first`)
//! - [`IdGenerator`]: injected capability for minting new object ids

pub mod error;
pub mod idgen;
pub mod object;
pub mod page;
pub mod record;
pub mod temporal;
pub mod value;

pub use error::TypeError;
pub use idgen::{IdGenerator, RandomIdGenerator, TimeOrderedIdGenerator};
pub use object::ObjectId;
pub use page::Page;
pub use record::{Edge, ObjectRecord, TypeId};
pub use temporal::{now, Timestamp};
pub use value::{Attributes, Value, RESERVED_ATTRIBUTES};
