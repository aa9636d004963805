use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use kvetch_schema::{IndexDefinition, IndexValue, Schema, StoredIdEdgeDefinition};
use kvetch_shard::{
    check_batch, check_insert, decode_body, encode_body, ShardBackend, ShardError, ShardResult,
};
use kvetch_types::{now, Attributes, Edge, ObjectId, ObjectRecord, Page, TypeId};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::debug;

use crate::ddl;
use crate::pool::{begin_write, ConnectionPool, Location};
use crate::rows::{
    from_micros, id_from_blob, id_param, index_param, is_unique_violation, limit_param, micros,
    ObjectRow, OBJECT_COLUMNS,
};

/// Upper bound on bound parameters per `IN (...)` lookup.
const MAX_IN_PARAMS: usize = 500;

/// A shard stored in one SQLite database.
///
/// Tables must exist before use; see [`SqliteShard::init_tables`].
#[derive(Debug)]
pub struct SqliteShard {
    pool: ConnectionPool,
}

impl SqliteShard {
    /// Open a file-backed shard with `pool_size` connections.
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> ShardResult<Self> {
        Ok(Self {
            pool: ConnectionPool::open(path, pool_size)?,
        })
    }

    /// A shard backed by a private in-memory database.
    pub fn in_memory() -> ShardResult<Self> {
        Ok(Self {
            pool: ConnectionPool::in_memory()?,
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub async fn init_tables(&self, schema: &Schema) -> ShardResult<()> {
        let schema = schema.clone();
        self.pool
            .run("init_tables", move |conn| ddl::init_shard_tables(conn, &schema))
            .await
    }

    pub async fn drop_tables(&self, schema: &Schema) -> ShardResult<()> {
        let schema = schema.clone();
        self.pool
            .run("drop_tables", move |conn| ddl::drop_shard_tables(conn, &schema))
            .await
    }

    /// Backfill `index` from the objects already stored on this shard.
    pub async fn build_index(&self, index: &IndexDefinition, type_id: TypeId) -> ShardResult<usize> {
        let index = index.clone();
        self.pool
            .run("build_index", move |conn| ddl::build_index(conn, &index, type_id))
            .await
    }
}

type EdgeRow = (Vec<u8>, i64, Option<Vec<u8>>);

fn read_edge_row(row: &Row<'_>) -> rusqlite::Result<EdgeRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

#[async_trait]
impl ShardBackend for SqliteShard {
    fn describe(&self) -> String {
        match self.pool.location() {
            Location::File(path) => format!("sqlite:{}", path.display()),
            Location::Memory => "sqlite::memory:".to_string(),
        }
    }

    async fn get_object(&self, id: ObjectId) -> ShardResult<Option<ObjectRecord>> {
        let op = "get_object";
        let row = self
            .pool
            .run(op, move |conn| {
                conn.query_row(
                    &format!("SELECT {OBJECT_COLUMNS} FROM kvetch_objects WHERE obj_id = ?1"),
                    params![id_param(&id)],
                    ObjectRow::read,
                )
                .optional()
                .map_err(|e| ShardError::backend(op, e))
            })
            .await?;
        row.map(ObjectRow::into_record).transpose()
    }

    async fn get_objects(
        &self,
        ids: &[ObjectId],
    ) -> ShardResult<HashMap<ObjectId, Option<ObjectRecord>>> {
        if ids.is_empty() {
            return Err(ShardError::InvalidArgument("get_objects needs at least one id".into()));
        }
        let op = "get_objects";
        let wanted = ids.to_vec();
        let rows = self
            .pool
            .run(op, move |conn| {
                let mut rows = Vec::new();
                for chunk in wanted.chunks(MAX_IN_PARAMS) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    let mut stmt = conn
                        .prepare_cached(&format!(
                            "SELECT {OBJECT_COLUMNS} FROM kvetch_objects WHERE obj_id IN ({placeholders})"
                        ))
                        .map_err(|e| ShardError::backend(op, e))?;
                    let found = stmt
                        .query_map(params_from_iter(chunk.iter().map(id_param)), ObjectRow::read)
                        .map_err(|e| ShardError::backend(op, e))?;
                    for row in found {
                        rows.push(row.map_err(|e| ShardError::backend(op, e))?);
                    }
                }
                Ok(rows)
            })
            .await?;

        let mut out: HashMap<ObjectId, Option<ObjectRecord>> =
            ids.iter().map(|id| (*id, None)).collect();
        for row in rows {
            let record = row.into_record()?;
            out.insert(record.id, Some(record));
        }
        Ok(out)
    }

    async fn get_objects_of_type(
        &self,
        type_id: TypeId,
        page: Page,
    ) -> ShardResult<BTreeMap<ObjectId, ObjectRecord>> {
        let op = "get_objects_of_type";
        // the empty blob sorts before every id
        let after = page.after.as_ref().map(id_param).unwrap_or_default();
        let limit = limit_param(page.first);
        let rows = self
            .pool
            .run(op, move |conn| {
                let mut stmt = conn
                    .prepare_cached(&format!(
                        "SELECT {OBJECT_COLUMNS} FROM kvetch_objects
                         WHERE type_id = ?1 AND obj_id > ?2
                         ORDER BY obj_id LIMIT ?3"
                    ))
                    .map_err(|e| ShardError::backend(op, e))?;
                let rows = stmt
                    .query_map(params![type_id, after, limit], ObjectRow::read)
                    .map_err(|e| ShardError::backend(op, e))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ShardError::backend(op, e))
            })
            .await?;
        rows.into_iter()
            .map(|row| row.into_record().map(|r| (r.id, r)))
            .collect()
    }

    async fn insert_object(
        &self,
        new_id: ObjectId,
        type_id: TypeId,
        attributes: &Attributes,
    ) -> ShardResult<ObjectId> {
        check_insert(attributes)?;
        let op = "insert_object";
        let body = encode_body(attributes)?;
        let at = micros(&now());
        self.pool
            .run(op, move |conn| {
                conn.execute(
                    "INSERT INTO kvetch_objects (obj_id, type_id, created, updated, body)
                     VALUES (?1, ?2, ?3, ?3, ?4)",
                    params![id_param(&new_id), type_id, at, body],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        ShardError::DuplicateObject(new_id)
                    } else {
                        ShardError::backend(op, e)
                    }
                })
            })
            .await?;
        debug!(id = %new_id, type_id, "sqlite shard insert");
        Ok(new_id)
    }

    async fn insert_objects(
        &self,
        new_ids: &[ObjectId],
        type_id: TypeId,
        attributes: &[Attributes],
    ) -> ShardResult<Vec<ObjectId>> {
        check_batch(new_ids, attributes)?;
        let op = "insert_objects";
        let bodies = attributes
            .iter()
            .map(encode_body)
            .collect::<ShardResult<Vec<_>>>()?;
        let ids = new_ids.to_vec();
        let at = micros(&now());
        self.pool
            .run(op, move |conn| {
                let tx = begin_write(conn, op)?;
                {
                    let mut stmt = tx
                        .prepare_cached(
                            "INSERT INTO kvetch_objects (obj_id, type_id, created, updated, body)
                             VALUES (?1, ?2, ?3, ?3, ?4)",
                        )
                        .map_err(|e| ShardError::backend(op, e))?;
                    for (id, body) in ids.iter().zip(&bodies) {
                        stmt.execute(params![id_param(id), type_id, at, body])
                            .map_err(|e| {
                                if is_unique_violation(&e) {
                                    ShardError::DuplicateObject(*id)
                                } else {
                                    ShardError::backend(op, e)
                                }
                            })?;
                    }
                }
                tx.commit().map_err(|e| ShardError::backend(op, e))?;
                Ok(ids)
            })
            .await
    }

    async fn update_object(&self, id: ObjectId, partial: &Attributes) -> ShardResult<()> {
        check_insert(partial)?;
        let op = "update_object";
        let partial = partial.clone();
        self.pool
            .run(op, move |conn| {
                let tx = begin_write(conn, op)?;
                let body: Option<Vec<u8>> = tx
                    .query_row(
                        "SELECT body FROM kvetch_objects WHERE obj_id = ?1",
                        params![id_param(&id)],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|e| ShardError::backend(op, e))?
                    .ok_or(ShardError::MissingObject(id))?;
                let mut attributes = decode_body(body.as_deref())?;
                attributes.extend(partial);
                tx.execute(
                    "UPDATE kvetch_objects SET body = ?1, updated = ?2 WHERE obj_id = ?3",
                    params![encode_body(&attributes)?, micros(&now()), id_param(&id)],
                )
                .map_err(|e| ShardError::backend(op, e))?;
                tx.commit().map_err(|e| ShardError::backend(op, e))
            })
            .await
    }

    async fn delete_object(&self, id: ObjectId) -> ShardResult<()> {
        let op = "delete_object";
        let changed = self
            .pool
            .run(op, move |conn| {
                conn.execute(
                    "DELETE FROM kvetch_objects WHERE obj_id = ?1",
                    params![id_param(&id)],
                )
                .map_err(|e| ShardError::backend(op, e))
            })
            .await?;
        if changed == 0 {
            return Err(ShardError::MissingObject(id));
        }
        Ok(())
    }

    async fn insert_index_entry(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
        target_id: ObjectId,
    ) -> ShardResult<()> {
        value.check(index)?;
        let op = "insert_index_entry";
        let sql = ddl::insert_entry_sql(index);
        let value = index_param(value);
        let at = micros(&now());
        self.pool
            .run(op, move |conn| {
                conn.execute(&sql, params![value, id_param(&target_id), at])
                    .map(|_| ())
                    .map_err(|e| ShardError::backend(op, e))
            })
            .await
    }

    async fn delete_index_entry(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
        target_id: ObjectId,
    ) -> ShardResult<()> {
        let op = "delete_index_entry";
        let sql = format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = ?1 AND target_id = ?2",
            index.index_name, index.indexed_attr
        );
        let value = index_param(value);
        self.pool
            .run(op, move |conn| {
                conn.execute(&sql, params![value, id_param(&target_id)])
                    .map(|_| ())
                    .map_err(|e| ShardError::backend(op, e))
            })
            .await
    }

    async fn get_index_entries(
        &self,
        index: &IndexDefinition,
        value: &IndexValue,
    ) -> ShardResult<Vec<ObjectId>> {
        let op = "get_index_entries";
        let sql = format!(
            "SELECT target_id FROM \"{}\" WHERE \"{}\" = ?1 ORDER BY target_id",
            index.index_name, index.indexed_attr
        );
        let value = index_param(value);
        let blobs = self
            .pool
            .run(op, move |conn| {
                let mut stmt = conn
                    .prepare_cached(&sql)
                    .map_err(|e| ShardError::backend(op, e))?;
                let rows = stmt
                    .query_map(params![value], |row| row.get::<_, Vec<u8>>(0))
                    .map_err(|e| ShardError::backend(op, e))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ShardError::backend(op, e))
            })
            .await?;
        blobs.iter().map(|b| id_from_blob(b)).collect()
    }

    async fn insert_edge(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        to_id: ObjectId,
        payload: &Attributes,
    ) -> ShardResult<()> {
        let op = "insert_edge";
        let edge_id = edge.edge_id;
        let body = encode_body(payload)?;
        let at = micros(&now());
        self.pool
            .run(op, move |conn| {
                conn.execute(
                    "INSERT INTO kvetch_edges (edge_id, from_id, to_id, created, updated, body)
                     VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
                    params![edge_id, id_param(&from_id), id_param(&to_id), at, body],
                )
                .map(|_| ())
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        ShardError::DuplicateEdge {
                            edge_id,
                            from_id,
                            to_id,
                        }
                    } else {
                        ShardError::backend(op, e)
                    }
                })
            })
            .await
    }

    async fn get_edges(
        &self,
        edge: &StoredIdEdgeDefinition,
        from_id: ObjectId,
        page: Page,
    ) -> ShardResult<Vec<Edge>> {
        let op = "get_edges";
        let edge_id = edge.edge_id;
        let limit = limit_param(page.first);
        let cursor = page.after.as_ref().map(id_param);
        let rows = self
            .pool
            .run(op, move |conn| {
                let rows = match cursor {
                    // an unknown cursor makes the subquery NULL, which matches nothing
                    Some(cursor) => {
                        let mut stmt = conn
                            .prepare_cached(
                                "SELECT to_id, created, body FROM kvetch_edges
                                 WHERE edge_id = ?1 AND from_id = ?2 AND row_id > (
                                     SELECT row_id FROM kvetch_edges
                                     WHERE edge_id = ?1 AND from_id = ?2 AND to_id = ?3)
                                 ORDER BY row_id LIMIT ?4",
                            )
                            .map_err(|e| ShardError::backend(op, e))?;
                        let rows = stmt
                            .query_map(params![edge_id, id_param(&from_id), cursor, limit], read_edge_row)
                            .map_err(|e| ShardError::backend(op, e))?;
                        rows.collect::<Result<Vec<_>, _>>()
                    }
                    None => {
                        let mut stmt = conn
                            .prepare_cached(
                                "SELECT to_id, created, body FROM kvetch_edges
                                 WHERE edge_id = ?1 AND from_id = ?2
                                 ORDER BY row_id LIMIT ?3",
                            )
                            .map_err(|e| ShardError::backend(op, e))?;
                        let rows = stmt
                            .query_map(params![edge_id, id_param(&from_id), limit], read_edge_row)
                            .map_err(|e| ShardError::backend(op, e))?;
                        rows.collect::<Result<Vec<_>, _>>()
                    }
                };
                rows.map_err(|e| ShardError::backend(op, e))
            })
            .await?;

        rows.into_iter()
            .map(|(to_id, created, body)| {
                Ok(Edge {
                    edge_id,
                    from_id,
                    to_id: id_from_blob(&to_id)?,
                    created: from_micros(created)?,
                    payload: decode_body(body.as_deref())?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvetch_schema::{define_int_index, define_object, define_stored_id_edge, define_string_index};
    use kvetch_types::{attrs, Value};

    fn schema() -> Schema {
        Schema::new(
            vec![define_object("Test", 1000)],
            vec![
                define_int_index("num_index", "Test", "num"),
                define_string_index("name_index", "Test", "name"),
            ],
            vec![define_stored_id_edge("related_edge", 12345, "related_id", "Test")],
        )
        .unwrap()
    }

    async fn shard() -> SqliteShard {
        let shard = SqliteShard::in_memory().unwrap();
        shard.init_tables(&schema()).await.unwrap();
        shard
    }

    #[tokio::test]
    async fn object_lifecycle() {
        let shard = shard().await;
        let id = ObjectId::from_u128(0xabc);
        shard
            .insert_object(id, 1000, &attrs! { "num" => 4, "name" => "four" })
            .await
            .unwrap();
        let record = shard.get_object(id).await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.type_id, 1000);
        assert_eq!(record.created, record.updated);
        assert_eq!(record.get("name"), Some(&Value::from("four")));

        shard.update_object(id, &attrs! { "num" => 5 }).await.unwrap();
        let record = shard.get_object(id).await.unwrap().unwrap();
        assert_eq!(record.get("num"), Some(&Value::Int(5)));
        assert_eq!(record.get("name"), Some(&Value::from("four")));

        shard.delete_object(id).await.unwrap();
        assert!(shard.get_object(id).await.unwrap().is_none());
        assert!(matches!(
            shard.delete_object(id).await,
            Err(ShardError::MissingObject(_))
        ));
        assert!(matches!(
            shard.update_object(id, &attrs! {}).await,
            Err(ShardError::MissingObject(_))
        ));
    }

    #[tokio::test]
    async fn duplicates_map_to_constraint_errors() {
        let shard = shard().await;
        let (a, b) = (ObjectId::from_u128(1), ObjectId::from_u128(2));
        shard.insert_object(a, 1000, &attrs! {}).await.unwrap();
        assert!(matches!(
            shard.insert_object(a, 1000, &attrs! {}).await,
            Err(ShardError::DuplicateObject(id)) if id == a
        ));

        let edge = schema().edge("related_edge").unwrap().clone();
        shard.insert_edge(&edge, a, b, &attrs! {}).await.unwrap();
        assert!(matches!(
            shard.insert_edge(&edge, a, b, &attrs! {}).await,
            Err(ShardError::DuplicateEdge { .. })
        ));
    }

    #[tokio::test]
    async fn batch_insert_rolls_back_on_conflict() {
        let shard = shard().await;
        let ids: Vec<_> = (1..=3).map(ObjectId::from_u128).collect();
        shard.insert_object(ids[1], 1000, &attrs! {}).await.unwrap();
        let err = shard
            .insert_objects(&ids, 1000, &[attrs! {}, attrs! {}, attrs! {}])
            .await
            .unwrap_err();
        assert!(matches!(err, ShardError::DuplicateObject(id) if id == ids[1]));
        assert!(shard.get_object(ids[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_objects_in_many_chunks() {
        let shard = shard().await;
        let ids: Vec<_> = (1..=(MAX_IN_PARAMS as u128 + 20)).map(ObjectId::from_u128).collect();
        let attributes: Vec<_> = ids.iter().map(|_| attrs! { "num" => 1 }).collect();
        shard.insert_objects(&ids[..MAX_IN_PARAMS], 1000, &attributes[..MAX_IN_PARAMS])
            .await
            .unwrap();
        let got = shard.get_objects(&ids).await.unwrap();
        assert_eq!(got.len(), ids.len());
        assert_eq!(got.values().filter(|r| r.is_some()).count(), MAX_IN_PARAMS);
        assert!(got[&ids[MAX_IN_PARAMS]].is_none());
    }

    #[tokio::test]
    async fn build_index_backfills_present_values() {
        let shard = shard().await;
        let index = schema().index("num_index").unwrap().clone();
        let (a, b, c) = (ObjectId::from_u128(3), ObjectId::from_u128(1), ObjectId::from_u128(2));
        shard.insert_object(a, 1000, &attrs! { "num" => 4 }).await.unwrap();
        shard.insert_object(b, 1000, &attrs! { "num" => 4 }).await.unwrap();
        shard.insert_object(c, 1000, &attrs! { "name" => "no num" }).await.unwrap();

        assert_eq!(shard.build_index(&index, 1000).await.unwrap(), 2);
        assert_eq!(shard.get_index_entries(&index, &4.into()).await.unwrap(), vec![b, a]);
        // not reconciled: a second run appends again
        assert_eq!(shard.build_index(&index, 1000).await.unwrap(), 2);
        assert_eq!(shard.get_index_entries(&index, &4.into()).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn file_backed_shard_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard0.db");
        let id = ObjectId::from_u128(99);
        {
            let shard = SqliteShard::open(&path, 2).unwrap();
            shard.init_tables(&schema()).await.unwrap();
            shard.insert_object(id, 1000, &attrs! { "num" => 1 }).await.unwrap();
            assert!(shard.describe().starts_with("sqlite:"));
        }
        let shard = SqliteShard::open(&path, 2).unwrap();
        let record = shard.get_object(id).await.unwrap().unwrap();
        assert_eq!(record.get("num"), Some(&Value::Int(1)));
        shard.drop_tables(&schema()).await.unwrap();
        assert!(shard.get_object(id).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_updates_on_a_pooled_file_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let shard = std::sync::Arc::new(SqliteShard::open(dir.path().join("busy.db"), 4).unwrap());
        shard.init_tables(&schema()).await.unwrap();
        let id = ObjectId::from_u128(7);
        shard.insert_object(id, 1000, &attrs! {}).await.unwrap();

        let writers: Vec<_> = (0..200i64)
            .map(|i| {
                let shard = std::sync::Arc::clone(&shard);
                tokio::spawn(async move {
                    shard
                        .update_object(id, &attrs! { format!("k{i}") => i })
                        .await
                })
            })
            .collect();
        let batches: Vec<_> = (0..8u128)
            .map(|b| {
                let shard = std::sync::Arc::clone(&shard);
                tokio::spawn(async move {
                    let ids = [ObjectId::from_u128(100 + b * 2), ObjectId::from_u128(101 + b * 2)];
                    shard
                        .insert_objects(&ids, 1000, &[attrs! { "num" => 1 }, attrs! {}])
                        .await
                })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }
        for batch in batches {
            batch.await.unwrap().unwrap();
        }

        let record = shard.get_object(id).await.unwrap().unwrap();
        assert_eq!(record.attributes.len(), 200);
        assert_eq!(record.get("k199"), Some(&Value::Int(199)));
        let all = shard.get_objects_of_type(1000, Page::all()).await.unwrap();
        assert_eq!(all.len(), 17);

        let index = schema().index("num_index").unwrap().clone();
        assert_eq!(shard.build_index(&index, 1000).await.unwrap(), 8);
    }
}
