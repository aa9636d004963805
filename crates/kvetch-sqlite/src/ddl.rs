//! Table layout of a SQLite shard.
//!
//! Every shard holds one object table, one edge table and one table per
//! declared index. All statements are idempotent so they can be rerun against
//! a shard that is already (partially) initialised.

use kvetch_schema::{IndexDefinition, IndexType, IndexValue, Schema};
use kvetch_shard::{decode_body, ShardError, ShardResult};
use kvetch_types::{now, TypeId};
use rusqlite::{params, Connection};
use tracing::info;

use crate::pool::begin_write;
use crate::rows::{index_param, micros};

pub const OBJECTS_TABLE: &str = "kvetch_objects";
pub const EDGES_TABLE: &str = "kvetch_edges";

const CREATE_OBJECTS: &str = "
CREATE TABLE IF NOT EXISTS kvetch_objects (
    row_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    obj_id  BLOB    NOT NULL UNIQUE,
    type_id INTEGER NOT NULL,
    created INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    body    BLOB
);
CREATE INDEX IF NOT EXISTS kvetch_objects_by_type ON kvetch_objects (type_id, obj_id);
";

const CREATE_EDGES: &str = "
CREATE TABLE IF NOT EXISTS kvetch_edges (
    row_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    edge_id INTEGER NOT NULL,
    from_id BLOB    NOT NULL,
    to_id   BLOB    NOT NULL,
    created INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    body    BLOB,
    UNIQUE (edge_id, from_id, to_id)
);
CREATE INDEX IF NOT EXISTS kvetch_edges_by_source ON kvetch_edges (edge_id, from_id, row_id);
";

fn column_type(index: &IndexDefinition) -> &'static str {
    match index.index_type {
        IndexType::String => "TEXT",
        IndexType::Int => "INTEGER",
    }
}

/// `CREATE` statements for one index table.
pub fn index_table_sql(index: &IndexDefinition) -> String {
    let table = &index.index_name;
    let attr = &index.indexed_attr;
    format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
    row_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    \"{attr}\" {} NOT NULL,
    target_id BLOB    NOT NULL,
    created   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS \"{table}_by_value\" ON \"{table}\" (\"{attr}\", target_id);
",
        column_type(index)
    )
}

pub(crate) fn insert_entry_sql(index: &IndexDefinition) -> String {
    format!(
        "INSERT INTO \"{}\" (\"{}\", target_id, created) VALUES (?1, ?2, ?3)",
        index.index_name, index.indexed_attr
    )
}

/// Create the object, edge and index tables for `schema`.
pub fn init_shard_tables(conn: &Connection, schema: &Schema) -> ShardResult<()> {
    let mut sql = String::from(CREATE_OBJECTS);
    sql.push_str(CREATE_EDGES);
    for index in schema.indexes() {
        sql.push_str(&index_table_sql(index));
    }
    conn.execute_batch(&sql)
        .map_err(|e| ShardError::backend("init_shard_tables", e))?;
    info!(indexes = schema.indexes().len(), "initialised shard tables");
    Ok(())
}

/// Drop every table [`init_shard_tables`] creates. Missing tables are skipped.
pub fn drop_shard_tables(conn: &Connection, schema: &Schema) -> ShardResult<()> {
    let mut sql = format!("DROP TABLE IF EXISTS {OBJECTS_TABLE};\nDROP TABLE IF EXISTS {EDGES_TABLE};\n");
    for index in schema.indexes() {
        sql.push_str(&format!("DROP TABLE IF EXISTS \"{}\";\n", index.index_name));
    }
    conn.execute_batch(&sql)
        .map_err(|e| ShardError::backend("drop_shard_tables", e))?;
    info!("dropped shard tables");
    Ok(())
}

/// Backfill `index` from every stored object of `type_id`.
///
/// Inserts one entry per object whose indexed attribute is present. Entries
/// are appended, not reconciled: running this twice duplicates them.
/// Returns the number of entries written.
pub fn build_index(
    conn: &mut Connection,
    index: &IndexDefinition,
    type_id: TypeId,
) -> ShardResult<usize> {
    let op = "build_index";
    let tx = begin_write(conn, op)?;
    let mut entries = Vec::new();
    {
        let mut stmt = tx
            .prepare("SELECT obj_id, body FROM kvetch_objects WHERE type_id = ?1 ORDER BY obj_id")
            .map_err(|e| ShardError::backend(op, e))?;
        let rows = stmt
            .query_map(params![type_id], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Option<Vec<u8>>>(1)?))
            })
            .map_err(|e| ShardError::backend(op, e))?;
        for row in rows {
            let (obj_id, body) = row.map_err(|e| ShardError::backend(op, e))?;
            let attributes = decode_body(body.as_deref())?;
            match attributes.get(&index.indexed_attr) {
                Some(value) if value.is_present() => {
                    entries.push((IndexValue::from_value(index, value)?, obj_id));
                }
                _ => {}
            }
        }
    }
    {
        let mut insert = tx
            .prepare(&insert_entry_sql(index))
            .map_err(|e| ShardError::backend(op, e))?;
        let created = micros(&now());
        for (value, obj_id) in &entries {
            insert
                .execute(params![index_param(value), obj_id, created])
                .map_err(|e| ShardError::backend(op, e))?;
        }
    }
    tx.commit().map_err(|e| ShardError::backend(op, e))?;
    info!(index = %index.index_name, entries = entries.len(), "built index");
    Ok(entries.len())
}
