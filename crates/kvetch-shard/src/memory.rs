use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use kvetch_schema::{IndexDefinition, IndexValue, StoredIdEdgeDefinition};
use kvetch_types::{now, Attributes, Edge, ObjectId, ObjectRecord, Page, Timestamp, TypeId};
use tracing::debug;

use crate::error::{ShardError, ShardResult};
use crate::traits::{check_batch, check_insert, ShardBackend};

/// In-memory, map-based shard.
///
/// Reference implementation of [`ShardBackend`]: the relational backend must
/// produce identical results for the same operation sequence. Every
/// operation completes without suspending.
pub struct InMemoryShard {
    inner: RwLock<ShardState>,
}

#[derive(Default)]
struct ShardState {
    objects: BTreeMap<ObjectId, ObjectRecord>,
    /// index name -> value -> entries
    indexes: HashMap<String, HashMap<IndexValue, Vec<IndexEntry>>>,
    /// edge id -> from id -> edges in insertion order
    edges: HashMap<i64, HashMap<ObjectId, Vec<Edge>>>,
}

#[derive(Clone, Debug)]
struct IndexEntry {
    target_id: ObjectId,
    #[allow(dead_code)]
    inserted_at: Timestamp,
}

impl InMemoryShard {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ShardState::default()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every object, index entry and edge.
    pub fn clear(&self) -> ShardResult<()> {
        *self.write("clear")? = ShardState::default();
        Ok(())
    }

    fn read(&self, operation: &'static str) -> ShardResult<RwLockReadGuard<'_, ShardState>> {
        self.inner
            .read()
            .map_err(|_| ShardError::backend(operation, "shard lock poisoned"))
    }

    fn write(&self, operation: &'static str) -> ShardResult<RwLockWriteGuard<'_, ShardState>> {
        self.inner
            .write()
            .map_err(|_| ShardError::backend(operation, "shard lock poisoned"))
    }
}

impl Default for InMemoryShard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryShard")
            .field("object_count", &self.len())
            .finish()
    }
}

fn new_record(id: ObjectId, type_id: TypeId, attributes: &Attributes, at: Timestamp) -> ObjectRecord {
    ObjectRecord {
        id,
        type_id,
        created: at,
        updated: at,
        attributes: attributes.clone(),
    }
}

#[async_trait]
impl ShardBackend for InMemoryShard {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn get_object(&self, id: ObjectId) -> ShardResult<Option<ObjectRecord>> {
        let state = self.read("get_object")?;
        Ok(state.objects.get(&id).cloned())
    }

    async fn get_objects(
        &self,
        ids: &[ObjectId],
    ) -> ShardResult<HashMap<ObjectId, Option<ObjectRecord>>> {
        if ids.is_empty() {
            return Err(ShardError::InvalidArgument("get_objects needs at least one id".into()));
        }
        let state = self.read("get_objects")?;
        Ok(ids
            .iter()
            .map(|id| (*id, state.objects.get(id).cloned()))
            .collect())
    }

    async fn get_objects_of_type(
        &self,
        type_id: TypeId,
        page: Page,
    ) -> ShardResult<BTreeMap<ObjectId, ObjectRecord>> {
        let state = self.read("get_objects_of_type")?;
        let lower = page.after.map_or(Bound::Unbounded, Bound::Excluded);
        let matching = state
            .objects
            .range((lower, Bound::Unbounded))
            .filter(|(_, record)| record.type_id == type_id)
            .map(|(id, record)| (*id, record.clone()));
        Ok(page.truncate(matching).collect())
    }

    async fn insert_object(
        &self,
        new_id: ObjectId,
        type_id: TypeId,
        attributes: &Attributes,
    ) -> ShardResult<ObjectId> {
        check_insert(attributes)?;
        let mut state = self.write("insert_object")?;
        if state.objects.contains_key(&new_id) {
            return Err(ShardError::DuplicateObject(new_id));
        }
        state
            .objects
            .insert(new_id, new_record(new_id, type_id, attributes, now()));
        debug!(id = %new_id, type_id, "memory shard insert");
        Ok(new_id)
    }

    async fn insert_objects(
        &self,
        new_ids: &[ObjectId],
        type_id: TypeId,
        attributes: &[Attributes],
    ) -> ShardResult<Vec<ObjectId>> {
        check_batch(new_ids, attributes)?;
        let mut state = self.write("insert_objects")?;
        if let Some(existing) = new_ids.iter().find(|id| state.objects.contains_key(*id)) {
            return Err(ShardError::DuplicateObject(*existing));
        }
        let at = now();
        for (id, attrs) in new_ids.iter().zip(attributes) {
            state.objects.insert(*id, new_record(*id, type_id, attrs, at));
        }
        Ok(new_ids.to_vec())
    }

    async fn update_object(&self, id: ObjectId, partial: &Attributes) -> ShardResult<()> {
        check_insert(partial)?;
        let mut state = self.write("update_object")?;
        let record = state
            .objects
            .get_mut(&id)
            .ok_or(ShardError::MissingObject(id))?;
        record.merge(partial, now());
        Ok(())
    }

    async fn delete_object(&self, id: ObjectId) -> ShardResult<()> {
        let mut state = self.write("delete_object")?;
        state
            .objects
            .remove(&id)
            .map(|_| ())
            .ok_or(ShardError::MissingObject(id))
    }

    async fn insert_index_entry(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
        target_id: ObjectId,
    ) -> ShardResult<()> {
        value.check(index)?;
        let mut state = self.write("insert_index_entry")?;
        state
            .indexes
            .entry(index.index_name.clone())
            .or_default()
            .entry(value.clone())
            .or_default()
            .push(IndexEntry {
                target_id,
                inserted_at: now(),
            });
        Ok(())
    }

    async fn delete_index_entry(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
        target_id: ObjectId,
    ) -> ShardResult<()> {
        let mut state = self.write("delete_index_entry")?;
        if let Some(values) = state.indexes.get_mut(&index.index_name) {
            if let Some(entries) = values.get_mut(value) {
                entries.retain(|e| e.target_id != target_id);
                if entries.is_empty() {
                    values.remove(value);
                }
            }
        }
        Ok(())
    }

    async fn get_index_entries(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
    ) -> ShardResult<Vec<ObjectId>> {
        let state = self.read("get_index_entries")?;
        let mut ids: Vec<ObjectId> = state
            .indexes
            .get(&index.index_name)
            .and_then(|values| values.get(value))
            .map(|entries| entries.iter().map(|e| e.target_id).collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    async fn insert_edge(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        to_id: ObjectId,
        payload: &Attributes,
    ) -> ShardResult<()> {
        let mut state = self.write("insert_edge")?;
        let list = state
            .edges
            .entry(edge.edge_id)
            .or_default()
            .entry(from_id)
            .or_default();
        if list.iter().any(|e| e.to_id == to_id) {
            return Err(ShardError::DuplicateEdge {
                edge_id: edge.edge_id,
                from_id,
                to_id,
            });
        }
        list.push(Edge {
            edge_id: edge.edge_id,
            from_id,
            to_id,
            created: now(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn get_edges(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        page: Page,
    ) -> ShardResult<Vec<Edge>> {
        let state = self.read("get_edges")?;
        let list: &[Edge] = state
            .edges
            .get(&edge.edge_id)
            .and_then(|by_from| by_from.get(&from_id))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let start = match page.after {
            None => 0,
            Some(cursor) => list
                .iter()
                .position(|e| e.to_id == cursor)
                .map_or(list.len(), |pos| pos + 1),
        };
        Ok(page.truncate(list[start..].iter().cloned()).collect())
    }
}
