use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use kvetch_schema::{IndexDefinition, IndexValue, StoredIdEdgeDefinition};
use kvetch_types::{Attributes, Edge, ObjectId, ObjectRecord, Page, TypeId, RESERVED_ATTRIBUTES};

use crate::error::{ShardError, ShardResult};

/// Storage operations every shard backend supports.
///
/// All implementations must satisfy these invariants:
/// - "Not found" is `Ok(None)` / an empty collection, never an error.
/// - `insert_object` fails with [`ShardError::DuplicateObject`] if the id
///   exists; `update_object`/`delete_object` fail with
///   [`ShardError::MissingObject`] if it does not.
/// - `get_objects_of_type` is ordered by ascending id and excludes every id
///   `<= page.after`.
/// - `get_edges` is ordered by insertion. `page.after` names a `to_id`; the
///   page starts after it, and an unknown cursor yields an empty page.
/// - `get_index_entries` returns target ids in ascending order.
/// - Operations on one shard observe a linearized view of that shard.
#[async_trait]
pub trait ShardBackend: Send + Sync {
    /// Short description for logs and errors.
    fn describe(&self) -> String;

    async fn get_object(&self, id: ObjectId) -> ShardResult<Option<ObjectRecord>>;

    /// One entry per requested id. `ids` must be non-empty.
    async fn get_objects(
        &self,
        ids: &[ObjectId],
    ) -> ShardResult<HashMap<ObjectId, Option<ObjectRecord>>>;

    async fn get_objects_of_type(
        &self,
        type_id: TypeId,
        page: Page,
    ) -> ShardResult<BTreeMap<ObjectId, ObjectRecord>>;

    async fn insert_object(
        &self,
        new_id: ObjectId,
        type_id: TypeId,
        attributes: &Attributes,
    ) -> ShardResult<ObjectId>;

    /// Batch insert. Either every object is inserted or none is.
    async fn insert_objects(
        &self,
        new_ids: &[ObjectId],
        type_id: TypeId,
        attributes: &[Attributes],
    ) -> ShardResult<Vec<ObjectId>>;

    /// Shallow-merge `partial` onto the stored attributes.
    async fn update_object(&self, id: ObjectId, partial: &Attributes) -> ShardResult<()>;

    async fn delete_object(&self, id: ObjectId) -> ShardResult<()>;

    async fn insert_index_entry(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
        target_id: ObjectId,
    ) -> ShardResult<()>;

    /// Remove every entry `(value -> target_id)` from `index`.
    async fn delete_index_entry(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
        target_id: ObjectId,
    ) -> ShardResult<()>;

    async fn get_index_entries(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
    ) -> ShardResult<Vec<ObjectId>>;

    async fn insert_edge(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        to_id: ObjectId,
        payload: &Attributes,
    ) -> ShardResult<()>;

    async fn get_edges(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        page: Page,
    ) -> ShardResult<Vec<Edge>>;

    /// `to_id` projection of [`get_edges`](ShardBackend::get_edges).
    async fn get_edge_ids(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        page: Page,
    ) -> ShardResult<Vec<ObjectId>> {
        let edges = self.get_edges(edge, from_id, page).await?;
        Ok(edges.into_iter().map(|e| e.to_id).collect())
    }
}

/// Reject attribute maps that try to write engine-owned keys.
pub fn check_insert(attributes: &Attributes) -> ShardResult<()> {
    if let Some(key) = RESERVED_ATTRIBUTES
        .iter()
        .find(|key| attributes.contains_key(**key))
    {
        return Err(ShardError::InvalidArgument(format!(
            "attribute {key:?} is reserved"
        )));
    }
    Ok(())
}

/// Preconditions shared by every backend's `insert_objects`.
pub fn check_batch(new_ids: &[ObjectId], attributes: &[Attributes]) -> ShardResult<()> {
    if new_ids.len() != attributes.len() {
        return Err(ShardError::InvalidArgument(format!(
            "{} ids for {} attribute maps",
            new_ids.len(),
            attributes.len()
        )));
    }
    let mut seen = HashSet::with_capacity(new_ids.len());
    for id in new_ids {
        if !seen.insert(*id) {
            return Err(ShardError::DuplicateObject(*id));
        }
    }
    attributes.iter().try_for_each(check_insert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvetch_types::attrs;

    #[test]
    fn reserved_keys_are_rejected() {
        assert!(check_insert(&attrs! { "num" => 1 }).is_ok());
        assert!(matches!(
            check_insert(&attrs! { "obj_id" => 1 }),
            Err(ShardError::InvalidArgument(_))
        ));
        assert!(matches!(
            check_insert(&attrs! { "type_id" => 1 }),
            Err(ShardError::InvalidArgument(_))
        ));
    }

    #[test]
    fn batch_checks_lengths_and_duplicates() {
        let a = ObjectId::from_u128(1);
        let b = ObjectId::from_u128(2);
        assert!(check_batch(&[a, b], &[attrs! {}, attrs! {}]).is_ok());
        assert!(matches!(
            check_batch(&[a], &[attrs! {}, attrs! {}]),
            Err(ShardError::InvalidArgument(_))
        ));
        assert!(matches!(
            check_batch(&[a, a], &[attrs! {}, attrs! {}]),
            Err(ShardError::DuplicateObject(id)) if id == a
        ));
    }
}
