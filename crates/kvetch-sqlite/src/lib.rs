//! SQLite shard backend for Kvetch.
//!
//! Each shard is one SQLite database (a file, or a private in-memory
//! database for tests). Attribute maps are stored as opaque, versioned body
//! blobs; only ids, type tags, timestamps and index values are columns.
//!
//! Blocking driver calls run on tokio's blocking pool so async callers are
//! never stalled by disk I/O.

pub mod ddl;
pub mod pool;
mod rows;
pub mod shard;

pub use ddl::{build_index, drop_shard_tables, init_shard_tables};
pub use pool::{ConnectionPool, Location};
pub use shard::SqliteShard;
