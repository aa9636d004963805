//! Mapping from object ids to shards.

use kvetch_types::ObjectId;

/// Chooses the shard that owns an object.
///
/// Implementations must be deterministic: an id always maps to the same
/// shard for a given shard count. Edges live on the shard of their source
/// object and index entries on the shard of the indexed object, so every
/// placement decision in the router goes through this one function.
pub trait ShardPlacement: Send + Sync {
    /// Index in `0..shard_count` of the shard owning `id`.
    fn shard_for(&self, id: ObjectId, shard_count: usize) -> usize;

    fn describe(&self) -> String;
}

/// `id mod shard_count`.
///
/// Not consistent hashing: changing the shard count remaps nearly every
/// existing id, so the count is fixed for the life of a dataset.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModuloPlacement;

impl ShardPlacement for ModuloPlacement {
    fn shard_for(&self, id: ObjectId, shard_count: usize) -> usize {
        if shard_count <= 1 {
            return 0;
        }
        (id.as_u128() % shard_count as u128) as usize
    }

    fn describe(&self) -> String {
        "modulo".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulo_uses_the_integer_value() {
        let p = ModuloPlacement;
        assert_eq!(p.shard_for(ObjectId::from_u128(7), 3), 1);
        assert_eq!(p.shard_for(ObjectId::from_u128(9), 3), 0);
        assert_eq!(p.shard_for(ObjectId::from_u128(u128::MAX), 1), 0);
        assert_eq!(p.shard_for(ObjectId::from_u128(u128::MAX), 2), 1);
    }

    #[test]
    fn placement_is_stable() {
        let p = ModuloPlacement;
        let id = ObjectId::from_u128(0x1234_5678_9abc_def0);
        assert_eq!(p.shard_for(id, 5), p.shard_for(id, 5));
        assert!(p.shard_for(id, 5) < 5);
    }
}
