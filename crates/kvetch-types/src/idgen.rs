use uuid::Uuid;

use crate::object::ObjectId;

/// Source of fresh object ids. Implementations must be collision resistant.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> ObjectId;
}

/// Uniformly random 128-bit ids. Spreads evenly under `id mod shard_count`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> ObjectId {
        ObjectId::from_u128(rand::random::<u128>())
    }
}

/// UUIDv7 ids: millisecond timestamp prefix followed by random bits, so
/// ids sort roughly by creation time.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeOrderedIdGenerator;

impl IdGenerator for TimeOrderedIdGenerator {
    fn generate(&self) -> ObjectId {
        ObjectId::from(Uuid::now_v7())
    }
}
