use kvetch_schema::SchemaError;
use kvetch_shard::ShardError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvetchError {
    /// A shard call failed. Fan-out operations report the first failure.
    #[error("shard {shard} failed during {operation}: {source}")]
    Shard {
        shard: usize,
        operation: &'static str,
        source: ShardError,
    },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// An edge's id attribute holds something other than an object id.
    #[error("edge {edge}: attribute {attr:?} holds a {kind} value, expected an object id")]
    InvalidEdgeSource {
        edge: String,
        attr: String,
        kind: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl KvetchError {
    pub(crate) fn shard(shard: usize, operation: &'static str) -> impl FnOnce(ShardError) -> Self {
        move |source| KvetchError::Shard {
            shard,
            operation,
            source,
        }
    }

    /// The underlying shard error, if this failure came from a shard.
    pub fn shard_error(&self) -> Option<&ShardError> {
        match self {
            KvetchError::Shard { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type KvetchResult<T> = Result<T, KvetchError>;
