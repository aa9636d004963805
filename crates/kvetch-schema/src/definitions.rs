use serde::{Deserialize, Serialize};

use kvetch_types::TypeId;

/// Associates an object type name with its integer tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTypeDefinition {
    pub type_name: String,
    pub type_id: TypeId,
}

/// Column type of an index's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    String,
    Int,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::String => "string",
            IndexType::Int => "int",
        }
    }
}

/// Secondary, non-unique index over one attribute of one object type.
///
/// Every object of `indexed_type` whose `indexed_attr` is present gets an
/// entry `(attribute value -> object id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub index_name: String,
    pub indexed_type: String,
    pub indexed_attr: String,
    pub index_type: IndexType,
}

/// An edge derived from a foreign-key-shaped attribute.
///
/// When an object of type `stored_on_type` is inserted with an id value in
/// `stored_id_attr`, the router records `attr value -> new object id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdEdgeDefinition {
    pub edge_name: String,
    pub edge_id: i64,
    pub stored_id_attr: String,
    pub stored_on_type: String,
}

pub fn define_object(type_name: impl Into<String>, type_id: TypeId) -> ObjectTypeDefinition {
    ObjectTypeDefinition {
        type_name: type_name.into(),
        type_id,
    }
}

pub fn define_string_index(
    index_name: impl Into<String>,
    indexed_type: impl Into<String>,
    indexed_attr: impl Into<String>,
) -> IndexDefinition {
    IndexDefinition {
        index_name: index_name.into(),
        indexed_type: indexed_type.into(),
        indexed_attr: indexed_attr.into(),
        index_type: IndexType::String,
    }
}

pub fn define_int_index(
    index_name: impl Into<String>,
    indexed_type: impl Into<String>,
    indexed_attr: impl Into<String>,
) -> IndexDefinition {
    IndexDefinition {
        index_name: index_name.into(),
        indexed_type: indexed_type.into(),
        indexed_attr: indexed_attr.into(),
        index_type: IndexType::Int,
    }
}

pub fn define_stored_id_edge(
    edge_name: impl Into<String>,
    edge_id: i64,
    stored_id_attr: impl Into<String>,
    stored_on_type: impl Into<String>,
) -> StoredIdEdgeDefinition {
    StoredIdEdgeDefinition {
        edge_name: edge_name.into(),
        edge_id,
        stored_id_attr: stored_id_attr.into(),
        stored_on_type: stored_on_type.into(),
    }
}
