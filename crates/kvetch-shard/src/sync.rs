//! Blocking facade over an async shard.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kvetch_schema::{IndexDefinition, IndexValue, StoredIdEdgeDefinition};
use kvetch_types::{Attributes, Edge, ObjectId, ObjectRecord, Page, TypeId};
use tokio::runtime::{Builder, Runtime};

use crate::error::{ShardError, ShardResult};
use crate::traits::ShardBackend;

/// Drives a [`ShardBackend`] on a private current-thread runtime so that
/// synchronous code (scripts, migrations, tests) can call it directly.
///
/// Must not be used from inside another tokio runtime.
pub struct SyncShard {
    shard: Arc<dyn ShardBackend>,
    runtime: Runtime,
}

impl SyncShard {
    pub fn new(shard: Arc<dyn ShardBackend>) -> ShardResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ShardError::backend("runtime", e))?;
        Ok(Self { shard, runtime })
    }

    pub fn inner(&self) -> &Arc<dyn ShardBackend> {
        &self.shard
    }

    pub fn get_object(&self, id: ObjectId) -> ShardResult<Option<ObjectRecord>> {
        self.runtime.block_on(self.shard.get_object(id))
    }

    pub fn get_objects(
        &self,
        ids: &[ObjectId],
    ) -> ShardResult<HashMap<ObjectId, Option<ObjectRecord>>> {
        self.runtime.block_on(self.shard.get_objects(ids))
    }

    pub fn get_objects_of_type(
        &self,
        type_id: TypeId,
        page: Page,
    ) -> ShardResult<BTreeMap<ObjectId, ObjectRecord>> {
        self.runtime
            .block_on(self.shard.get_objects_of_type(type_id, page))
    }

    pub fn insert_object(
        &self,
        new_id: ObjectId,
        type_id: TypeId,
        attributes: &Attributes,
    ) -> ShardResult<ObjectId> {
        self.runtime
            .block_on(self.shard.insert_object(new_id, type_id, attributes))
    }

    pub fn insert_objects(
        &self,
        new_ids: &[ObjectId],
        type_id: TypeId,
        attributes: &[Attributes],
    ) -> ShardResult<Vec<ObjectId>> {
        self.runtime
            .block_on(self.shard.insert_objects(new_ids, type_id, attributes))
    }

    pub fn update_object(&self, id: ObjectId, partial: &Attributes) -> ShardResult<()> {
        self.runtime.block_on(self.shard.update_object(id, partial))
    }

    pub fn delete_object(&self, id: ObjectId) -> ShardResult<()> {
        self.runtime.block_on(self.shard.delete_object(id))
    }

    pub fn insert_index_entry(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
        target_id: ObjectId,
    ) -> ShardResult<()> {
        self.runtime
            .block_on(self.shard.insert_index_entry(index, value, target_id))
    }

    pub fn delete_index_entry(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
        target_id: ObjectId,
    ) -> ShardResult<()> {
        self.runtime
            .block_on(self.shard.delete_index_entry(index, value, target_id))
    }

    pub fn get_index_entries(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
    ) -> ShardResult<Vec<ObjectId>> {
        self.runtime
            .block_on(self.shard.get_index_entries(index, value))
    }

    pub fn insert_edge(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        to_id: ObjectId,
        payload: &Attributes,
    ) -> ShardResult<()> {
        self.runtime
            .block_on(self.shard.insert_edge(edge, from_id, to_id, payload))
    }

    pub fn get_edges(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        page: Page,
    ) -> ShardResult<Vec<Edge>> {
        self.runtime
            .block_on(self.shard.get_edges(edge, from_id, page))
    }

    pub fn get_edge_ids(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        page: Page,
    ) -> ShardResult<Vec<ObjectId>> {
        self.runtime
            .block_on(self.shard.get_edge_ids(edge, from_id, page))
    }
}

impl std::fmt::Debug for SyncShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncShard")
            .field("shard", &self.shard.describe())
            .finish()
    }
}
