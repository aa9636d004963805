//! Building a [`Kvetch`] from configuration, and shard table lifecycle.

use std::sync::Arc;

use futures::future::try_join_all;
use kvetch_schema::{IndexDefinition, IndexValue, Schema};
use kvetch_shard::{InMemoryShard, ShardBackend, ShardResult};
use kvetch_sqlite::SqliteShard;
use kvetch_types::{Page, TimeOrderedIdGenerator, TypeId};
use tracing::{info, warn};

use crate::config::{IdGeneratorKind, KvetchConfig, PlacementKind, ShardConfig};
use crate::error::{KvetchError, KvetchResult};
use crate::placement::ModuloPlacement;
use crate::router::Kvetch;

/// A concrete shard opened from configuration.
///
/// The router only needs [`ShardBackend`]; table management needs to know
/// which backend it is talking to.
#[derive(Clone, Debug)]
pub enum ShardHandle {
    Memory(Arc<InMemoryShard>),
    Sqlite(Arc<SqliteShard>),
}

impl ShardHandle {
    pub fn open(config: &ShardConfig) -> ShardResult<Self> {
        Ok(match config {
            ShardConfig::Memory => ShardHandle::Memory(Arc::new(InMemoryShard::new())),
            ShardConfig::Sqlite { path, pool_size } => {
                ShardHandle::Sqlite(Arc::new(SqliteShard::open(path, *pool_size)?))
            }
        })
    }

    pub fn backend(&self) -> Arc<dyn ShardBackend> {
        match self {
            ShardHandle::Memory(shard) => shard.clone(),
            ShardHandle::Sqlite(shard) => shard.clone(),
        }
    }

    /// Create tables if missing. Nothing to do for memory shards.
    pub async fn init_tables(&self, schema: &Schema) -> ShardResult<()> {
        match self {
            ShardHandle::Memory(_) => Ok(()),
            ShardHandle::Sqlite(shard) => shard.init_tables(schema).await,
        }
    }

    /// Drop all stored data.
    pub async fn drop_tables(&self, schema: &Schema) -> ShardResult<()> {
        match self {
            ShardHandle::Memory(shard) => shard.clear(),
            ShardHandle::Sqlite(shard) => shard.drop_tables(schema).await,
        }
    }

    /// Backfill `index` from this shard's objects of `type_id`. Returns
    /// entries written.
    pub async fn build_index(&self, index: &IndexDefinition, type_id: TypeId) -> ShardResult<usize> {
        match self {
            ShardHandle::Sqlite(shard) => shard.build_index(index, type_id).await,
            ShardHandle::Memory(shard) => {
                let objects = shard.get_objects_of_type(type_id, Page::all()).await?;
                let mut written = 0;
                for (id, record) in objects {
                    // other indexes on the type are not consulted
                    match record.get(&index.indexed_attr) {
                        Some(value) if value.is_present() => {
                            let value = IndexValue::from_value(index, value)?;
                            shard.insert_index_entry(index, &value, id).await?;
                            written += 1;
                        }
                        _ => {}
                    }
                }
                Ok(written)
            }
        }
    }
}

/// Open every configured shard, in order.
pub fn open_shards(config: &KvetchConfig) -> KvetchResult<Vec<ShardHandle>> {
    config
        .shards
        .iter()
        .enumerate()
        .map(|(i, shard)| ShardHandle::open(shard).map_err(KvetchError::shard(i, "open")))
        .collect()
}

/// Router over already-opened shards, configured as `config` says.
pub fn router(config: &KvetchConfig, shards: &[ShardHandle]) -> KvetchResult<Kvetch> {
    let schema = config.schema()?;
    let kvetch = Kvetch::new(schema, shards.iter().map(ShardHandle::backend).collect())?;
    let kvetch = match config.placement {
        PlacementKind::Modulo => kvetch.with_placement(ModuloPlacement),
    };
    Ok(match config.id_generator {
        IdGeneratorKind::Random => kvetch,
        IdGeneratorKind::TimeOrdered => kvetch.with_id_generator(TimeOrderedIdGenerator),
    })
}

/// Open shards, create any missing tables, and return a ready router.
pub async fn init_from_config(config: &KvetchConfig) -> KvetchResult<Kvetch> {
    let schema = config.schema()?;
    let shards = open_shards(config)?;
    create_tables(&shards, &schema).await?;
    let kvetch = router(config, &shards)?;
    info!(shards = shards.len(), "kvetch ready");
    Ok(kvetch)
}

/// A router over `shard_count` fresh in-memory shards.
pub fn init_in_memory(schema: Schema, shard_count: usize) -> KvetchResult<Kvetch> {
    let shards = (0..shard_count)
        .map(|_| Arc::new(InMemoryShard::new()) as Arc<dyn ShardBackend>)
        .collect();
    Kvetch::new(schema, shards)
}

pub async fn create_tables(shards: &[ShardHandle], schema: &Schema) -> KvetchResult<()> {
    try_join_all(shards.iter().enumerate().map(|(i, shard)| async move {
        shard
            .init_tables(schema)
            .await
            .map_err(KvetchError::shard(i, "init_tables"))
    }))
    .await?;
    Ok(())
}

/// Drop and recreate every table on every shard. All data is lost.
pub async fn nuke(shards: &[ShardHandle], schema: &Schema) -> KvetchResult<()> {
    warn!(shards = shards.len(), "dropping all shard data");
    try_join_all(shards.iter().enumerate().map(|(i, shard)| async move {
        shard
            .drop_tables(schema)
            .await
            .map_err(KvetchError::shard(i, "drop_tables"))
    }))
    .await?;
    create_tables(shards, schema).await
}

/// Backfill `index_name` on every shard. Rerunning duplicates entries.
pub async fn build_index(
    shards: &[ShardHandle],
    schema: &Schema,
    index_name: &str,
) -> KvetchResult<usize> {
    let index = schema.index(index_name)?;
    let type_id = schema.indexed_type_id(index).ok_or_else(|| {
        KvetchError::Config(format!("index {index_name} covers an undeclared type"))
    })?;
    let counts = try_join_all(shards.iter().enumerate().map(|(i, shard)| async move {
        shard
            .build_index(index, type_id)
            .await
            .map_err(KvetchError::shard(i, "build_index"))
    }))
    .await?;
    let total: usize = counts.iter().sum();
    info!(index = index_name, entries = total, "index built");
    Ok(total)
}
