//! Kvetch: a sharded object-graph storage engine.
//!
//! Objects are schemaless attribute maps tagged with a type id. A static
//! [`Schema`] declares which attributes are indexed and which id-valued
//! attributes imply edges; the [`Kvetch`] router keeps those derived index
//! entries and edges up to date as objects are inserted, updated and deleted.
//!
//! # Placement
//!
//! | data          | lives on the shard of |
//! |---------------|-----------------------|
//! | object        | its own id            |
//! | edge          | its source (`from_id`)|
//! | index entry   | the indexed object    |
//!
//! Single-object operations and edge scans touch one shard. Batched reads
//! touch each distinct owning shard once, concurrently. Type scans and index
//! lookups ask every shard.
//!
//! # Example
//!
//! ```no_run
//! use kvetch::{init_in_memory, define_object, define_int_index, Page, Schema, attrs};
//!
//! # async fn demo() -> kvetch::KvetchResult<()> {
//! let schema = Schema::new(
//!     vec![define_object("Todo", 1000)],
//!     vec![define_int_index("todo_priority", "Todo", "priority")],
//!     vec![],
//! )?;
//! let kvetch = init_in_memory(schema, 3)?;
//! let id = kvetch.insert_object(1000, &attrs! { "priority" => 2 }).await?;
//! assert_eq!(kvetch.get_ids_from_index("todo_priority", 2).await?, vec![id]);
//! let page = kvetch.get_objects_of_type(1000, Page::all().first(10)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod init;
pub mod placement;
pub mod router;

pub use config::{IdGeneratorKind, KvetchConfig, PlacementKind, ShardConfig};
pub use context::{ObjectLoader, RequestContext};
pub use error::{KvetchError, KvetchResult};
pub use init::{
    build_index, create_tables, init_from_config, init_in_memory, nuke, open_shards, router,
    ShardHandle,
};
pub use placement::{ModuloPlacement, ShardPlacement};
pub use router::Kvetch;

// Re-export the types callers need alongside the router
pub use kvetch_schema::{
    define_int_index, define_object, define_stored_id_edge, define_string_index,
    IndexDefinition, IndexType, IndexValue, ObjectTypeDefinition, Schema, SchemaDefinition,
    SchemaError, StoredIdEdgeDefinition, TypeRegistry,
};
pub use kvetch_shard::{InMemoryShard, ShardBackend, ShardError, SyncShard};
pub use kvetch_sqlite::SqliteShard;
pub use kvetch_types::{
    attrs, now, Attributes, Edge, IdGenerator, ObjectId, ObjectRecord, Page, RandomIdGenerator,
    TimeOrderedIdGenerator, Timestamp, TypeId, Value,
};
