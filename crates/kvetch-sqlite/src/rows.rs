//! Column conversions between Kvetch types and SQLite storage classes.

use chrono::DateTime;
use kvetch_schema::IndexValue;
use kvetch_shard::{decode_body, ShardError, ShardResult};
use kvetch_types::{ObjectId, ObjectRecord, Timestamp, TypeId};
use rusqlite::ffi;
use rusqlite::types::Value as SqlValue;
use rusqlite::Row;

pub(crate) fn id_param(id: &ObjectId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub(crate) fn id_from_blob(blob: &[u8]) -> ShardResult<ObjectId> {
    ObjectId::from_slice(blob).map_err(|e| ShardError::Corrupt(e.to_string()))
}

pub(crate) fn micros(ts: &Timestamp) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(value: i64) -> ShardResult<Timestamp> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| ShardError::Corrupt(format!("timestamp out of range: {value}")))
}

pub(crate) fn index_param(value: &IndexValue) -> SqlValue {
    match value {
        IndexValue::Str(s) => SqlValue::Text(s.clone()),
        IndexValue::Int(i) => SqlValue::Integer(*i),
    }
}

/// `first` as a SQLite `LIMIT`; `-1` means unbounded.
pub(crate) fn limit_param(first: Option<usize>) -> i64 {
    first.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Columns selected for an object, in this order.
pub(crate) const OBJECT_COLUMNS: &str = "obj_id, type_id, created, updated, body";

/// An object row as read, before decoding.
pub(crate) struct ObjectRow {
    obj_id: Vec<u8>,
    type_id: TypeId,
    created: i64,
    updated: i64,
    body: Option<Vec<u8>>,
}

impl ObjectRow {
    pub(crate) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            obj_id: row.get(0)?,
            type_id: row.get(1)?,
            created: row.get(2)?,
            updated: row.get(3)?,
            body: row.get(4)?,
        })
    }

    pub(crate) fn into_record(self) -> ShardResult<ObjectRecord> {
        Ok(ObjectRecord {
            id: id_from_blob(&self.obj_id)?,
            type_id: self.type_id,
            created: from_micros(self.created)?,
            updated: from_micros(self.updated)?,
            attributes: decode_body(self.body.as_deref())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvetch_types::now;

    #[test]
    fn timestamps_survive_micros() {
        let t = now();
        assert_eq!(from_micros(micros(&t)).unwrap(), t);
        assert!(from_micros(i64::MAX).is_err());
    }

    #[test]
    fn limits() {
        assert_eq!(limit_param(None), -1);
        assert_eq!(limit_param(Some(0)), 0);
        assert_eq!(limit_param(Some(3)), 3);
    }

    #[test]
    fn short_blob_is_corrupt() {
        assert!(matches!(id_from_blob(&[1, 2, 3]), Err(ShardError::Corrupt(_))));
        let id = ObjectId::from_u128(77);
        assert_eq!(id_from_blob(&id_param(&id)).unwrap(), id);
    }
}
