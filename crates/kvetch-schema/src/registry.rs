use std::collections::HashMap;

use kvetch_types::{ObjectRecord, TypeId};

use crate::error::{SchemaError, SchemaResult};
use crate::schema::Schema;

type Constructor<T> = Box<dyn Fn(ObjectRecord) -> T + Send + Sync>;

/// Explicit dispatch table from an object's type tag to a typed constructor.
///
/// Layers above the engine register one constructor per type at startup and
/// then turn raw [`ObjectRecord`]s into their own types without any
/// name-based lookup.
pub struct TypeRegistry<T> {
    constructors: HashMap<TypeId, Constructor<T>>,
}

impl<T> TypeRegistry<T> {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor for `type_id`. Each tag may be registered once.
    pub fn register<F>(&mut self, type_id: TypeId, constructor: F) -> SchemaResult<&mut Self>
    where
        F: Fn(ObjectRecord) -> T + Send + Sync + 'static,
    {
        if self.constructors.contains_key(&type_id) {
            return Err(SchemaError::AlreadyRegistered(type_id));
        }
        self.constructors.insert(type_id, Box::new(constructor));
        Ok(self)
    }

    /// Register by type name, resolved through `schema`.
    pub fn register_named<F>(
        &mut self,
        schema: &Schema,
        type_name: &str,
        constructor: F,
    ) -> SchemaResult<&mut Self>
    where
        F: Fn(ObjectRecord) -> T + Send + Sync + 'static,
    {
        let type_id = schema
            .type_id_of(type_name)
            .ok_or_else(|| SchemaError::UnknownObjectType {
                owner: "type registry".into(),
                type_name: type_name.to_string(),
            })?;
        self.register(type_id, constructor)
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.constructors.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Build a typed value. `None` when the record's type is not registered.
    pub fn construct(&self, record: ObjectRecord) -> Option<T> {
        self.constructors
            .get(&record.type_id)
            .map(|constructor| constructor(record))
    }
}

impl<T> Default for TypeRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TypeRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.constructors.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("TypeRegistry").field("type_ids", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::define_object;
    use kvetch_types::{attrs, now, ObjectId};

    #[derive(Debug, PartialEq)]
    enum Node {
        User(String),
        Todo(i64),
    }

    fn record(type_id: TypeId) -> ObjectRecord {
        let t = now();
        ObjectRecord {
            id: ObjectId::from_u128(1),
            type_id,
            created: t,
            updated: t,
            attributes: attrs! { "name" => "ada", "num" => 3 },
        }
    }

    #[test]
    fn dispatches_by_type_tag() {
        let schema = Schema::new(
            vec![define_object("User", 1), define_object("Todo", 2)],
            vec![],
            vec![],
        )
        .unwrap();
        let mut registry = TypeRegistry::new();
        registry
            .register_named(&schema, "User", |r| {
                Node::User(r.get("name").and_then(|v| v.as_str()).unwrap_or_default().into())
            })
            .unwrap()
            .register(2, |r| Node::Todo(r.get("num").and_then(|v| v.as_int()).unwrap_or(0)))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.construct(record(1)), Some(Node::User("ada".into())));
        assert_eq!(registry.construct(record(2)), Some(Node::Todo(3)));
        assert_eq!(registry.construct(record(3)), None);
    }

    #[test]
    fn double_registration_fails() {
        let mut registry: TypeRegistry<()> = TypeRegistry::new();
        registry.register(1, |_| ()).unwrap();
        assert_eq!(
            registry.register(1, |_| ()).unwrap_err(),
            SchemaError::AlreadyRegistered(1)
        );
        assert!(registry.contains(1));
    }

    #[test]
    fn unknown_type_name_fails() {
        let mut registry: TypeRegistry<()> = TypeRegistry::new();
        let err = registry
            .register_named(&Schema::empty(), "Ghost", |_| ())
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownObjectType { .. }));
    }
}
