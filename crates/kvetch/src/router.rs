use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::future::{try_join, try_join_all};
use kvetch_schema::{IndexDefinition, IndexValue, Schema, StoredIdEdgeDefinition};
use kvetch_shard::{ShardBackend, ShardError};
use kvetch_types::{
    Attributes, Edge, IdGenerator, ObjectId, ObjectRecord, Page, RandomIdGenerator, TypeId,
};
use tracing::debug;

use crate::error::{KvetchError, KvetchResult};
use crate::placement::{ModuloPlacement, ShardPlacement};

type DerivedEdge<'a> = (&'a StoredIdEdgeDefinition, ObjectId);
type DerivedEntry<'a> = (&'a IndexDefinition, IndexValue);

/// Routes object, edge and index operations to the shard that owns them.
///
/// - Objects live on `placement(id)`.
/// - Edges live on the shard of their source (`from_id`).
/// - Index entries live on the shard of the indexed object, so an index
///   lookup must ask every shard.
///
/// Work that touches independent shards is issued concurrently. The first
/// failing shard call fails the whole operation and drops the others.
pub struct Kvetch {
    schema: Arc<Schema>,
    shards: Vec<Arc<dyn ShardBackend>>,
    placement: Arc<dyn ShardPlacement>,
    id_gen: Arc<dyn IdGenerator>,
}

impl Kvetch {
    /// Route over `shards` with modulo placement and random ids.
    pub fn new(schema: Schema, shards: Vec<Arc<dyn ShardBackend>>) -> KvetchResult<Self> {
        if shards.is_empty() {
            return Err(KvetchError::Config("at least one shard is required".into()));
        }
        Ok(Self {
            schema: Arc::new(schema),
            shards,
            placement: Arc::new(ModuloPlacement),
            id_gen: Arc::new(RandomIdGenerator),
        })
    }

    pub fn with_placement(mut self, placement: impl ShardPlacement + 'static) -> Self {
        self.placement = Arc::new(placement);
        self
    }

    pub fn with_id_generator(mut self, id_gen: impl IdGenerator + 'static) -> Self {
        self.id_gen = Arc::new(id_gen);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shards(&self) -> &[Arc<dyn ShardBackend>] {
        &self.shards
    }

    pub fn get_shard_id_from_obj_id(&self, id: ObjectId) -> usize {
        self.placement.shard_for(id, self.shards.len())
    }

    pub fn get_shard_from_obj_id(&self, id: ObjectId) -> &Arc<dyn ShardBackend> {
        &self.shards[self.get_shard_id_from_obj_id(id)]
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    pub async fn get_object(&self, id: ObjectId) -> KvetchResult<Option<ObjectRecord>> {
        let shard_id = self.get_shard_id_from_obj_id(id);
        self.shards[shard_id]
            .get_object(id)
            .await
            .map_err(KvetchError::shard(shard_id, "get_object"))
    }

    /// Batched read. One concurrent call per distinct owning shard; every
    /// requested id appears in the result.
    pub async fn get_objects(
        &self,
        ids: &[ObjectId],
    ) -> KvetchResult<HashMap<ObjectId, Option<ObjectRecord>>> {
        let mut by_shard: BTreeMap<usize, Vec<ObjectId>> = BTreeMap::new();
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if seen.insert(*id) {
                by_shard
                    .entry(self.get_shard_id_from_obj_id(*id))
                    .or_default()
                    .push(*id);
            }
        }
        debug!(ids = seen.len(), shards = by_shard.len(), "get_objects fan-out");

        let results = try_join_all(by_shard.iter().map(|(&shard_id, shard_ids)| async move {
            self.shards[shard_id]
                .get_objects(shard_ids)
                .await
                .map_err(KvetchError::shard(shard_id, "get_objects"))
        }))
        .await?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Objects of `type_id` across all shards, ascending by id.
    pub async fn get_objects_of_type(
        &self,
        type_id: TypeId,
        page: Page,
    ) -> KvetchResult<BTreeMap<ObjectId, ObjectRecord>> {
        let pages = try_join_all(self.shards.iter().enumerate().map(|(shard_id, shard)| async move {
            shard
                .get_objects_of_type(type_id, page)
                .await
                .map_err(KvetchError::shard(shard_id, "get_objects_of_type"))
        }))
        .await?;
        // each shard already honoured `first`, so the merged head is exact
        let merged: BTreeMap<_, _> = pages.into_iter().flatten().collect();
        Ok(page.truncate(merged.into_iter()).collect())
    }

    /// Insert a new object, then its derived edges and index entries.
    ///
    /// Edge and index writes run concurrently once the object is stored.
    pub async fn insert_object(
        &self,
        type_id: TypeId,
        attributes: &Attributes,
    ) -> KvetchResult<ObjectId> {
        let edges = self.derived_edges(type_id, attributes)?;
        let entries = self.schema.applicable_indexes(type_id, attributes)?;

        let new_id = self.id_gen.generate();
        let shard_id = self.get_shard_id_from_obj_id(new_id);
        self.shards[shard_id]
            .insert_object(new_id, type_id, attributes)
            .await
            .map_err(KvetchError::shard(shard_id, "insert_object"))?;

        self.write_derived(new_id, &edges, &entries).await?;
        debug!(
            id = %new_id,
            type_id,
            shard = shard_id,
            edges = edges.len(),
            index_entries = entries.len(),
            "inserted object"
        );
        Ok(new_id)
    }

    /// Batch insert. Only supported when the router has a single shard.
    pub async fn insert_objects(
        &self,
        type_id: TypeId,
        attributes: &[Attributes],
    ) -> KvetchResult<Vec<ObjectId>> {
        if self.shards.len() > 1 {
            return Err(KvetchError::Unsupported(format!(
                "batch insert across {} shards",
                self.shards.len()
            )));
        }
        if attributes.is_empty() {
            return Ok(Vec::new());
        }
        let derived = attributes
            .iter()
            .map(|attrs| -> KvetchResult<_> {
                Ok((
                    self.derived_edges(type_id, attrs)?,
                    self.schema.applicable_indexes(type_id, attrs)?,
                ))
            })
            .collect::<KvetchResult<Vec<_>>>()?;

        let new_ids: Vec<ObjectId> = attributes.iter().map(|_| self.id_gen.generate()).collect();
        self.shards[0]
            .insert_objects(&new_ids, type_id, attributes)
            .await
            .map_err(KvetchError::shard(0, "insert_objects"))?;

        for (new_id, (edges, entries)) in new_ids.iter().zip(&derived) {
            self.write_derived(*new_id, edges, entries).await?;
        }
        debug!(count = new_ids.len(), type_id, "inserted object batch");
        Ok(new_ids)
    }

    /// Merge `partial` into a stored object and move any index entries whose
    /// value changed. Edges are not re-derived.
    pub async fn update_object(&self, id: ObjectId, partial: &Attributes) -> KvetchResult<()> {
        let shard_id = self.get_shard_id_from_obj_id(id);
        let shard = &self.shards[shard_id];
        let current = self.fetch_existing(shard_id, id, "update_object").await?;

        let mut merged = current.attributes.clone();
        merged.extend(partial.iter().map(|(k, v)| (k.clone(), v.clone())));
        let before = self.schema.applicable_indexes(current.type_id, &current.attributes)?;
        let after = self.schema.applicable_indexes(current.type_id, &merged)?;

        shard
            .update_object(id, partial)
            .await
            .map_err(KvetchError::shard(shard_id, "update_object"))?;

        let removals = try_join_all(
            before
                .iter()
                .filter(|entry| !after.contains(*entry))
                .map(|(index, value)| async move {
                    shard
                        .delete_index_entry(index, value, id)
                        .await
                        .map_err(KvetchError::shard(shard_id, "delete_index_entry"))
                }),
        );
        let additions = try_join_all(
            after
                .iter()
                .filter(|entry| !before.contains(*entry))
                .map(|(index, value)| async move {
                    shard
                        .insert_index_entry(index, value, id)
                        .await
                        .map_err(KvetchError::shard(shard_id, "insert_index_entry"))
                }),
        );
        try_join(removals, additions).await?;
        Ok(())
    }

    /// Delete an object and every index entry it contributed.
    ///
    /// Edges from or to the object are left in place.
    pub async fn delete_object(&self, id: ObjectId) -> KvetchResult<()> {
        let shard_id = self.get_shard_id_from_obj_id(id);
        let shard = &self.shards[shard_id];
        let current = self.fetch_existing(shard_id, id, "delete_object").await?;
        let entries = self.schema.applicable_indexes(current.type_id, &current.attributes)?;

        shard
            .delete_object(id)
            .await
            .map_err(KvetchError::shard(shard_id, "delete_object"))?;
        try_join_all(entries.iter().map(|(index, value)| async move {
            shard
                .delete_index_entry(index, value, id)
                .await
                .map_err(KvetchError::shard(shard_id, "delete_index_entry"))
        }))
        .await?;
        debug!(id = %id, index_entries = entries.len(), "deleted object");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Indexes
    // -----------------------------------------------------------------------

    /// Ids of objects whose indexed attribute equals `value`, ascending and
    /// deduplicated. Asks every shard.
    pub async fn get_ids_from_index(
        &self,
        index_name: &str,
        value: impl Into<IndexValue>,
    ) -> KvetchResult<Vec<ObjectId>> {
        let index = self.schema.index(index_name)?;
        let value = value.into();
        value.check(index)?;
        let value = &value;

        let per_shard = try_join_all(self.shards.iter().enumerate().map(|(shard_id, shard)| async move {
            shard
                .get_index_entries(index, value)
                .await
                .map_err(KvetchError::shard(shard_id, "get_index_entries"))
        }))
        .await?;
        let ids: BTreeSet<ObjectId> = per_shard.into_iter().flatten().collect();
        debug!(index = index_name, hits = ids.len(), "index lookup");
        Ok(ids.into_iter().collect())
    }

    /// First id from [`get_ids_from_index`](Self::get_ids_from_index).
    pub async fn get_id_from_index(
        &self,
        index_name: &str,
        value: impl Into<IndexValue>,
    ) -> KvetchResult<Option<ObjectId>> {
        let ids = self.get_ids_from_index(index_name, value).await?;
        Ok(ids.into_iter().next())
    }

    /// Objects found through an index, ascending by id. Entries whose object
    /// no longer exists are skipped.
    pub async fn get_from_index(
        &self,
        index_name: &str,
        value: impl Into<IndexValue>,
    ) -> KvetchResult<Vec<ObjectRecord>> {
        let ids = self.get_ids_from_index(index_name, value).await?;
        let mut objects = self.get_objects(&ids).await?;
        Ok(ids
            .iter()
            .filter_map(|id| objects.remove(id).flatten())
            .collect())
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    pub async fn get_edges(
        &self,
        edge_name: &str,
        from_id: ObjectId,
        page: Page,
    ) -> KvetchResult<Vec<Edge>> {
        let edge = self.schema.edge(edge_name)?;
        let shard_id = self.get_shard_id_from_obj_id(from_id);
        self.shards[shard_id]
            .get_edges(edge, from_id, page)
            .await
            .map_err(KvetchError::shard(shard_id, "get_edges"))
    }

    pub async fn get_edge_ids(
        &self,
        edge_name: &str,
        from_id: ObjectId,
        page: Page,
    ) -> KvetchResult<Vec<ObjectId>> {
        let edges = self.get_edges(edge_name, from_id, page).await?;
        Ok(edges.into_iter().map(|e| e.to_id).collect())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn derived_edges(
        &self,
        type_id: TypeId,
        attributes: &Attributes,
    ) -> KvetchResult<Vec<DerivedEdge<'_>>> {
        let mut out = Vec::new();
        for edge in self.schema.edges_stored_on(type_id) {
            match attributes.get(&edge.stored_id_attr) {
                Some(value) if value.is_present() => {
                    let from_id = value.as_id().ok_or_else(|| KvetchError::InvalidEdgeSource {
                        edge: edge.edge_name.clone(),
                        attr: edge.stored_id_attr.clone(),
                        kind: value.kind(),
                    })?;
                    out.push((edge, from_id));
                }
                _ => {}
            }
        }
        Ok(out)
    }

    async fn write_derived(
        &self,
        new_id: ObjectId,
        edges: &[DerivedEdge<'_>],
        entries: &[DerivedEntry<'_>],
    ) -> KvetchResult<()> {
        let payload = &Attributes::new();
        let object_shard = self.get_shard_id_from_obj_id(new_id);

        let edge_writes = try_join_all(edges.iter().map(|&(edge, from_id)| {
            let shard_id = self.get_shard_id_from_obj_id(from_id);
            async move {
                self.shards[shard_id]
                    .insert_edge(edge, from_id, new_id, payload)
                    .await
                    .map_err(KvetchError::shard(shard_id, "insert_edge"))
            }
        }));
        let index_writes = try_join_all(entries.iter().map(|(index, value)| async move {
            self.shards[object_shard]
                .insert_index_entry(index, value, new_id)
                .await
                .map_err(KvetchError::shard(object_shard, "insert_index_entry"))
        }));
        try_join(edge_writes, index_writes).await?;
        Ok(())
    }

    async fn fetch_existing(
        &self,
        shard_id: usize,
        id: ObjectId,
        operation: &'static str,
    ) -> KvetchResult<ObjectRecord> {
        self.shards[shard_id]
            .get_object(id)
            .await
            .map_err(KvetchError::shard(shard_id, operation))?
            .ok_or_else(|| KvetchError::shard(shard_id, operation)(ShardError::MissingObject(id)))
    }
}

impl std::fmt::Debug for Kvetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shards: Vec<String> = self.shards.iter().map(|s| s.describe()).collect();
        f.debug_struct("Kvetch")
            .field("shards", &shards)
            .field("placement", &self.placement.describe())
            .finish()
    }
}
