use kvetch_types::TypeId;

/// Errors raised while building or querying a schema.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate object type name: {0}")]
    DuplicateTypeName(String),

    #[error("duplicate object type id: {0}")]
    DuplicateTypeId(TypeId),

    #[error("duplicate index name: {0}")]
    DuplicateIndex(String),

    /// Two index names map to the same case-insensitive SQL name.
    #[error("index name {0} collides with another index's SQL table or index name")]
    IndexNameCollision(String),

    #[error("duplicate edge name: {0}")]
    DuplicateEdge(String),

    #[error("duplicate edge id {edge_id} (edge {edge_name})")]
    DuplicateEdgeId { edge_name: String, edge_id: i64 },

    /// An index or edge names an object type the schema does not declare.
    #[error("{owner} refers to unknown object type {type_name}")]
    UnknownObjectType { owner: String, type_name: String },

    #[error("unknown index: {0}")]
    UnknownIndex(String),

    #[error("unknown edge: {0}")]
    UnknownEdge(String),

    #[error("invalid identifier {0:?}: must match [A-Za-z_][A-Za-z0-9_]* and not be reserved")]
    InvalidIdentifier(String),

    #[error("index {index} expects a {expected} value, got {actual}")]
    IndexValueMismatch {
        index: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("type id {0} is already registered")]
    AlreadyRegistered(TypeId),
}

/// Convenience alias for schema results.
pub type SchemaResult<T> = Result<T, SchemaError>;
