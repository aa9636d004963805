//! Per-request object cache.
//!
//! A [`RequestContext`] is created for one request and dropped with it. Its
//! [`ObjectLoader`] memoizes reads, so there is no process-wide cache to
//! reset. Only [`ObjectLoader::load_many`] batches: its misses go to the
//! router in one `get_objects` call. Concurrent single `load` calls are not
//! coalesced and each miss costs its own router call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kvetch_schema::TypeRegistry;
use kvetch_types::{Attributes, ObjectId, ObjectRecord, TypeId};
use tracing::debug;

use crate::error::KvetchResult;
use crate::router::Kvetch;

type Cache = HashMap<ObjectId, Option<ObjectRecord>>;

/// Memoizing loader in front of a [`Kvetch`].
///
/// Absence is cached too: a second `load` of a missing id does not reach a
/// shard.
pub struct ObjectLoader {
    kvetch: Arc<Kvetch>,
    cache: Mutex<Cache>,
}

impl ObjectLoader {
    pub fn new(kvetch: Arc<Kvetch>) -> Self {
        Self {
            kvetch,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        // the map is never left half-written, so a poisoned lock is still usable
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn load(&self, id: ObjectId) -> KvetchResult<Option<ObjectRecord>> {
        let mut found = self.load_many(&[id]).await?;
        Ok(found.remove(&id).flatten())
    }

    /// Load many ids with at most one batched router call for the misses.
    pub async fn load_many(
        &self,
        ids: &[ObjectId],
    ) -> KvetchResult<HashMap<ObjectId, Option<ObjectRecord>>> {
        let misses: Vec<ObjectId> = {
            let cache = self.cache();
            ids.iter().filter(|id| !cache.contains_key(*id)).copied().collect()
        };
        if !misses.is_empty() {
            debug!(requested = ids.len(), misses = misses.len(), "loader batch");
            let fetched = self.kvetch.get_objects(&misses).await?;
            self.cache().extend(fetched);
        }
        let cache = self.cache();
        Ok(ids
            .iter()
            .map(|id| (*id, cache.get(id).cloned().flatten()))
            .collect())
    }

    /// Load and convert through `registry`. `None` when the object is absent
    /// or its type has no registered constructor.
    pub async fn load_as<T>(
        &self,
        registry: &TypeRegistry<T>,
        id: ObjectId,
    ) -> KvetchResult<Option<T>> {
        Ok(self
            .load(id)
            .await?
            .and_then(|record| registry.construct(record)))
    }

    /// Seed the cache with a record the caller already holds.
    pub fn prime(&self, record: ObjectRecord) {
        self.cache().insert(record.id, Some(record));
    }

    pub fn clear(&self, id: ObjectId) {
        self.cache().remove(&id);
    }

    pub fn clear_all(&self) {
        self.cache().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache().len()
    }
}

/// State scoped to one request: the router plus a fresh loader.
///
/// Mutations go through the context so the loader never serves a stale copy
/// of an object this request changed.
pub struct RequestContext {
    kvetch: Arc<Kvetch>,
    loader: ObjectLoader,
}

impl RequestContext {
    pub fn new(kvetch: Arc<Kvetch>) -> Self {
        Self {
            loader: ObjectLoader::new(Arc::clone(&kvetch)),
            kvetch,
        }
    }

    pub fn kvetch(&self) -> &Kvetch {
        &self.kvetch
    }

    pub fn loader(&self) -> &ObjectLoader {
        &self.loader
    }

    pub async fn insert_object(
        &self,
        type_id: TypeId,
        attributes: &Attributes,
    ) -> KvetchResult<ObjectId> {
        let id = self.kvetch.insert_object(type_id, attributes).await?;
        // a cached miss for a freshly minted id would be wrong
        self.loader.clear(id);
        Ok(id)
    }

    pub async fn update_object(&self, id: ObjectId, partial: &Attributes) -> KvetchResult<()> {
        self.loader.clear(id);
        self.kvetch.update_object(id, partial).await
    }

    pub async fn delete_object(&self, id: ObjectId) -> KvetchResult<()> {
        self.loader.clear(id);
        self.kvetch.delete_object(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::init_in_memory;
    use kvetch_schema::{define_object, Schema};
    use kvetch_types::{attrs, Value};

    fn kvetch() -> Arc<Kvetch> {
        let schema = Schema::new(
            vec![define_object("Todo", 1000), define_object("User", 1001)],
            vec![],
            vec![],
        )
        .unwrap();
        Arc::new(init_in_memory(schema, 3).unwrap())
    }

    #[tokio::test]
    async fn loads_are_memoized_per_context() {
        let kvetch = kvetch();
        let ctx = RequestContext::new(Arc::clone(&kvetch));
        let id = ctx.insert_object(1000, &attrs! { "title" => "a" }).await.unwrap();

        let first = ctx.loader().load(id).await.unwrap().unwrap();
        assert_eq!(ctx.loader().cached_len(), 1);

        // a write behind the context's back is not observed
        kvetch.update_object(id, &attrs! { "title" => "b" }).await.unwrap();
        let cached = ctx.loader().load(id).await.unwrap().unwrap();
        assert_eq!(cached, first);

        // a fresh context sees it
        let fresh = RequestContext::new(kvetch);
        let record = fresh.loader().load(id).await.unwrap().unwrap();
        assert_eq!(record.get("title"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn writes_through_the_context_invalidate() {
        let ctx = RequestContext::new(kvetch());
        let id = ctx.insert_object(1000, &attrs! { "title" => "a" }).await.unwrap();
        ctx.loader().load(id).await.unwrap();

        ctx.update_object(id, &attrs! { "title" => "b" }).await.unwrap();
        let record = ctx.loader().load(id).await.unwrap().unwrap();
        assert_eq!(record.get("title"), Some(&Value::from("b")));

        ctx.delete_object(id).await.unwrap();
        assert!(ctx.loader().load(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_many_reports_every_id() {
        let ctx = RequestContext::new(kvetch());
        let a = ctx.insert_object(1000, &attrs! {}).await.unwrap();
        let b = ctx.insert_object(1001, &attrs! {}).await.unwrap();
        let ghost = ObjectId::from_u128(5);

        let got = ctx.loader().load_many(&[a, b, ghost, a]).await.unwrap();
        assert_eq!(got.len(), 3);
        assert!(got[&a].is_some() && got[&b].is_some());
        assert!(got[&ghost].is_none());
        assert_eq!(ctx.loader().cached_len(), 3);

        ctx.loader().clear_all();
        assert_eq!(ctx.loader().cached_len(), 0);
    }

    #[tokio::test]
    async fn typed_loads_go_through_the_registry() {
        #[derive(Debug, PartialEq)]
        enum Node {
            Todo(String),
        }

        let ctx = RequestContext::new(kvetch());
        let mut registry = TypeRegistry::new();
        registry
            .register_named(ctx.kvetch().schema(), "Todo", |record| {
                Node::Todo(
                    record
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                )
            })
            .unwrap();

        let todo = ctx.insert_object(1000, &attrs! { "title" => "ship" }).await.unwrap();
        let user = ctx.insert_object(1001, &attrs! {}).await.unwrap();
        assert_eq!(
            ctx.loader().load_as(&registry, todo).await.unwrap(),
            Some(Node::Todo("ship".into()))
        );
        assert_eq!(ctx.loader().load_as(&registry, user).await.unwrap(), None);
    }

    #[test]
    fn primed_records_skip_the_router() {
        let ctx = RequestContext::new(kvetch());
        let t = kvetch_types::now();
        let record = ObjectRecord {
            id: ObjectId::from_u128(9),
            type_id: 1000,
            created: t,
            updated: t,
            attributes: attrs! {},
        };
        ctx.loader().prime(record);
        assert_eq!(ctx.loader().cached_len(), 1);
        ctx.loader().clear(ObjectId::from_u128(9));
        assert_eq!(ctx.loader().cached_len(), 0);
    }
}
