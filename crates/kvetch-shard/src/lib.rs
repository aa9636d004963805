//! Shard backends for the Kvetch storage engine.
//!
//! A shard holds a disjoint subset of objects together with the index
//! entries and edges co-located with them. The router never talks to storage
//! directly; it only calls the [`ShardBackend`] contract.
//!
//! # Backends
//!
//! - [`InMemoryShard`]: map-based reference implementation for tests and
//!   embedded deployments
//! - `kvetch_sqlite::SqliteShard`: relational implementation (separate crate)
//!
//! # Contract Rules
//!
//! 1. Absence is never an error: lookups return `None` or an empty collection.
//! 2. Constraint violations (duplicate id, duplicate edge, update/delete of an
//!    absent id) are hard errors and are never swallowed.
//! 3. Backend faults (I/O, serialization) propagate as-is.
//! 4. Object scans are ordered by ascending id; edge scans by insertion order.
//! 5. An edge cursor that does not appear in the edge list yields an empty page.

pub mod codec;
pub mod error;
pub mod memory;
pub mod sync;
pub mod traits;

pub use codec::{decode_body, encode_body, BODY_FORMAT_V1};
pub use error::{ShardError, ShardResult};
pub use memory::InMemoryShard;
pub use sync::SyncShard;
pub use traits::{check_batch, check_insert, ShardBackend};
