use serde::{Deserialize, Serialize};

use crate::object::ObjectId;
use crate::temporal::Timestamp;
use crate::value::{Attributes, Value};

/// Integer tag identifying an object's type. Never changes after creation.
pub type TypeId = i64;

/// A stored object as returned by a shard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub type_id: TypeId,
    pub created: Timestamp,
    pub updated: Timestamp,
    pub attributes: Attributes,
}

impl ObjectRecord {
    /// Look up a single attribute.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attributes.get(attr)
    }

    /// Shallow-merge `partial` over the current attributes.
    pub fn merge(&mut self, partial: &Attributes, updated: Timestamp) {
        for (key, value) in partial {
            self.attributes.insert(key.clone(), value.clone());
        }
        self.updated = updated;
    }
}

/// A directed edge `from_id -> to_id`, ordered by insertion within its source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: i64,
    pub from_id: ObjectId,
    pub to_id: ObjectId,
    pub created: Timestamp,
    pub payload: Attributes,
}
