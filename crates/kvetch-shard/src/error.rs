use kvetch_schema::SchemaError;
use kvetch_types::ObjectId;

/// Errors from shard backend operations.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    /// An object with this id already exists.
    #[error("object already exists: {0}")]
    DuplicateObject(ObjectId),

    /// Update or delete targeted an id the shard does not hold.
    #[error("object does not exist: {0}")]
    MissingObject(ObjectId),

    /// The `(edge_id, from_id, to_id)` triple is already stored.
    #[error("edge {edge_id} {from_id} -> {to_id} already exists")]
    DuplicateEdge {
        edge_id: i64,
        from_id: ObjectId,
        to_id: ObjectId,
    },

    /// The caller violated an operation precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Attribute body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data is malformed.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Connection, lock or driver failure inside the backend.
    #[error("backend failure during {operation}: {reason}")]
    Backend {
        operation: &'static str,
        reason: String,
    },
}

impl ShardError {
    pub fn backend(operation: &'static str, reason: impl ToString) -> Self {
        ShardError::Backend {
            operation,
            reason: reason.to_string(),
        }
    }

    /// Whether this error reports a violated uniqueness or existence constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            ShardError::DuplicateObject(_)
                | ShardError::MissingObject(_)
                | ShardError::DuplicateEdge { .. }
        )
    }
}

/// Result alias for shard operations.
pub type ShardResult<T> = Result<T, ShardError>;
