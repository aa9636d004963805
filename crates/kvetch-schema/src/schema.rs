use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use kvetch_types::{Attributes, TypeId};

use crate::definitions::{IndexDefinition, ObjectTypeDefinition, StoredIdEdgeDefinition};
use crate::error::{SchemaError, SchemaResult};
use crate::index_value::IndexValue;

/// Table names owned by the relational backend; index tables may not use them.
/// SQL names the relational backend creates for every shard.
const RESERVED_TABLES: [&str; 4] = [
    "kvetch_objects",
    "kvetch_edges",
    "kvetch_objects_by_type",
    "kvetch_edges_by_source",
];
const RESERVED_COLUMNS: [&str; 3] = ["row_id", "target_id", "created"];

/// Unvalidated schema description, as written in configuration files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub objects: Vec<ObjectTypeDefinition>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    #[serde(default)]
    pub edges: Vec<StoredIdEdgeDefinition>,
}

/// Immutable, validated aggregate of object, index and edge definitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDefinition", into = "SchemaDefinition")]
pub struct Schema {
    objects: Vec<ObjectTypeDefinition>,
    indexes: Vec<IndexDefinition>,
    edges: Vec<StoredIdEdgeDefinition>,
    type_ids: HashMap<String, TypeId>,
    index_lookup: HashMap<String, usize>,
    edge_lookup: HashMap<String, usize>,
}

impl Schema {
    /// Validate and build a schema.
    pub fn new(
        objects: Vec<ObjectTypeDefinition>,
        indexes: Vec<IndexDefinition>,
        edges: Vec<StoredIdEdgeDefinition>,
    ) -> SchemaResult<Self> {
        let mut type_ids = HashMap::new();
        let mut seen_ids = HashSet::new();
        for obj in &objects {
            if !seen_ids.insert(obj.type_id) {
                return Err(SchemaError::DuplicateTypeId(obj.type_id));
            }
            if type_ids.insert(obj.type_name.clone(), obj.type_id).is_some() {
                return Err(SchemaError::DuplicateTypeName(obj.type_name.clone()));
            }
        }

        let mut index_lookup = HashMap::new();
        // SQL identifiers are case-insensitive; each index owns a table and
        // a `<name>_by_value` index
        let mut sql_names = HashSet::new();
        for (pos, index) in indexes.iter().enumerate() {
            check_identifier(&index.index_name)?;
            check_identifier(&index.indexed_attr)?;
            if !type_ids.contains_key(&index.indexed_type) {
                return Err(SchemaError::UnknownObjectType {
                    owner: format!("index {}", index.index_name),
                    type_name: index.indexed_type.clone(),
                });
            }
            if index_lookup.insert(index.index_name.clone(), pos).is_some() {
                return Err(SchemaError::DuplicateIndex(index.index_name.clone()));
            }
            let table = index.index_name.to_ascii_lowercase();
            let by_value = format!("{table}_by_value");
            if !sql_names.insert(table) | !sql_names.insert(by_value) {
                return Err(SchemaError::IndexNameCollision(index.index_name.clone()));
            }
        }

        let mut edge_lookup = HashMap::new();
        let mut edge_ids = HashSet::new();
        for (pos, edge) in edges.iter().enumerate() {
            if !type_ids.contains_key(&edge.stored_on_type) {
                return Err(SchemaError::UnknownObjectType {
                    owner: format!("edge {}", edge.edge_name),
                    type_name: edge.stored_on_type.clone(),
                });
            }
            if edge_lookup.insert(edge.edge_name.clone(), pos).is_some() {
                return Err(SchemaError::DuplicateEdge(edge.edge_name.clone()));
            }
            if !edge_ids.insert(edge.edge_id) {
                return Err(SchemaError::DuplicateEdgeId {
                    edge_name: edge.edge_name.clone(),
                    edge_id: edge.edge_id,
                });
            }
        }

        Ok(Self {
            objects,
            indexes,
            edges,
            type_ids,
            index_lookup,
            edge_lookup,
        })
    }

    /// A schema with no definitions.
    pub fn empty() -> Self {
        Self {
            objects: Vec::new(),
            indexes: Vec::new(),
            edges: Vec::new(),
            type_ids: HashMap::new(),
            index_lookup: HashMap::new(),
            edge_lookup: HashMap::new(),
        }
    }

    pub fn objects(&self) -> &[ObjectTypeDefinition] {
        &self.objects
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn edges(&self) -> &[StoredIdEdgeDefinition] {
        &self.edges
    }

    /// Resolve an object type name to its tag.
    pub fn type_id_of(&self, type_name: &str) -> Option<TypeId> {
        self.type_ids.get(type_name).copied()
    }

    pub fn object_type(&self, type_id: TypeId) -> Option<&ObjectTypeDefinition> {
        self.objects.iter().find(|o| o.type_id == type_id)
    }

    pub fn index(&self, index_name: &str) -> SchemaResult<&IndexDefinition> {
        self.index_lookup
            .get(index_name)
            .map(|&pos| &self.indexes[pos])
            .ok_or_else(|| SchemaError::UnknownIndex(index_name.to_string()))
    }

    pub fn edge(&self, edge_name: &str) -> SchemaResult<&StoredIdEdgeDefinition> {
        self.edge_lookup
            .get(edge_name)
            .map(|&pos| &self.edges[pos])
            .ok_or_else(|| SchemaError::UnknownEdge(edge_name.to_string()))
    }

    pub fn edge_by_id(&self, edge_id: i64) -> Option<&StoredIdEdgeDefinition> {
        self.edges.iter().find(|e| e.edge_id == edge_id)
    }

    /// The tag of the type an index covers.
    pub fn indexed_type_id(&self, index: &IndexDefinition) -> Option<TypeId> {
        self.type_id_of(&index.indexed_type)
    }

    /// Indexes declared over objects of `type_id`.
    pub fn indexes_for_type(&self, type_id: TypeId) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes
            .iter()
            .filter(move |index| self.indexed_type_id(index) == Some(type_id))
    }

    /// Edges whose id attribute lives on objects of `type_id`.
    pub fn edges_stored_on(
        &self,
        type_id: TypeId,
    ) -> impl Iterator<Item = &StoredIdEdgeDefinition> {
        self.edges
            .iter()
            .filter(move |edge| self.type_id_of(&edge.stored_on_type) == Some(type_id))
    }

    /// Every index entry an object of `type_id` with `attributes` contributes.
    ///
    /// An index applies when its type matches and the indexed attribute is
    /// present (see [`kvetch_types::Value::is_present`]). Insert, update and
    /// delete all derive their bookkeeping from this one predicate.
    pub fn applicable_indexes<'a>(
        &'a self,
        type_id: TypeId,
        attributes: &Attributes,
    ) -> SchemaResult<Vec<(&'a IndexDefinition, IndexValue)>> {
        let mut out = Vec::new();
        for index in self.indexes_for_type(type_id) {
            match attributes.get(&index.indexed_attr) {
                Some(value) if value.is_present() => {
                    out.push((index, IndexValue::from_value(index, value)?));
                }
                _ => {}
            }
        }
        Ok(out)
    }
}

impl TryFrom<SchemaDefinition> for Schema {
    type Error = SchemaError;

    fn try_from(def: SchemaDefinition) -> SchemaResult<Self> {
        Schema::new(def.objects, def.indexes, def.edges)
    }
}

impl From<Schema> for SchemaDefinition {
    fn from(schema: Schema) -> Self {
        SchemaDefinition {
            objects: schema.objects,
            indexes: schema.indexes,
            edges: schema.edges,
        }
    }
}

fn check_identifier(name: &str) -> SchemaResult<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    let reserved = RESERVED_TABLES
        .iter()
        .chain(&RESERVED_COLUMNS)
        .any(|t| t.eq_ignore_ascii_case(name))
        || name.to_ascii_lowercase().starts_with("sqlite_");
    if head_ok && tail_ok && !reserved {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::*;
    use kvetch_types::{attrs, Value};

    fn test_schema() -> Schema {
        Schema::new(
            vec![define_object("Test", 2345), define_object("Other", 99)],
            vec![
                define_int_index("num_index", "Test", "num"),
                define_string_index("name_index", "Test", "name"),
                define_int_index("other_num", "Other", "num"),
            ],
            vec![define_stored_id_edge("related_edge", 12345, "related_id", "Test")],
        )
        .unwrap()
    }

    #[test]
    fn lookups_resolve() {
        let schema = test_schema();
        assert_eq!(schema.type_id_of("Test"), Some(2345));
        assert_eq!(schema.type_id_of("Nope"), None);
        assert_eq!(schema.index("num_index").unwrap().indexed_attr, "num");
        assert_eq!(schema.edge("related_edge").unwrap().edge_id, 12345);
        assert_eq!(schema.edge_by_id(12345).unwrap().edge_name, "related_edge");
        assert_eq!(schema.object_type(99).unwrap().type_name, "Other");
        assert_eq!(
            schema.index("missing").unwrap_err(),
            SchemaError::UnknownIndex("missing".into())
        );
        assert_eq!(
            schema.edge("missing").unwrap_err(),
            SchemaError::UnknownEdge("missing".into())
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Schema::new(
            vec![define_object("Test", 1)],
            vec![
                define_int_index("idx", "Test", "a"),
                define_int_index("idx", "Test", "b"),
            ],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateIndex("idx".into()));

        let err = Schema::new(
            vec![define_object("Test", 1)],
            vec![],
            vec![
                define_stored_id_edge("e", 1, "a", "Test"),
                define_stored_id_edge("e", 2, "b", "Test"),
            ],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateEdge("e".into()));

        let err = Schema::new(
            vec![define_object("A", 1), define_object("B", 1)],
            vec![],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateTypeId(1));
    }

    #[test]
    fn index_names_must_differ_ignoring_case() {
        let objects = vec![define_object("Test", 1), define_object("Other", 2)];
        let err = Schema::new(
            objects.clone(),
            vec![
                define_int_index("Num", "Test", "num"),
                define_int_index("num", "Other", "num"),
            ],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::IndexNameCollision("num".into()));

        // `a` already owns the SQL index `a_by_value`
        let err = Schema::new(
            objects.clone(),
            vec![
                define_int_index("a", "Test", "x"),
                define_string_index("A_BY_VALUE", "Other", "y"),
            ],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::IndexNameCollision("A_BY_VALUE".into()));

        let err = Schema::new(
            objects.clone(),
            vec![
                define_int_index("b_by_value", "Test", "x"),
                define_int_index("b", "Other", "y"),
            ],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::IndexNameCollision("b".into()));

        assert!(Schema::new(
            objects,
            vec![
                define_int_index("num", "Test", "num"),
                define_int_index("num2", "Other", "num"),
            ],
            vec![],
        )
        .is_ok());
    }

    #[test]
    fn unknown_types_are_rejected_eagerly() {
        let err = Schema::new(
            vec![define_object("Test", 1)],
            vec![define_int_index("idx", "Ghost", "a")],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownObjectType { .. }));

        let err = Schema::new(
            vec![define_object("Test", 1)],
            vec![],
            vec![define_stored_id_edge("e", 1, "a", "Ghost")],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownObjectType { .. }));
    }

    #[test]
    fn identifiers_are_checked() {
        for bad in [
            "1abc",
            "drop table",
            "",
            "kvetch_objects",
            "KVETCH_EDGES_BY_SOURCE",
            "a-b",
            "Target_Id",
            "sqlite_master",
        ] {
            let err = Schema::new(
                vec![define_object("Test", 1)],
                vec![define_int_index(bad, "Test", "num")],
                vec![],
            )
            .unwrap_err();
            assert_eq!(err, SchemaError::InvalidIdentifier(bad.into()));
        }
    }

    #[test]
    fn applicable_indexes_follow_presence() {
        let schema = test_schema();
        let hits = schema
            .applicable_indexes(2345, &attrs! { "num" => 4, "name" => "" })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.index_name, "num_index");
        assert_eq!(hits[0].1, IndexValue::Int(4));

        let hits = schema
            .applicable_indexes(2345, &attrs! { "num" => Value::Null, "name" => "Jane" })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.index_name, "name_index");

        // index on another type never applies
        let hits = schema.applicable_indexes(99, &attrs! { "name" => "x" }).unwrap();
        assert!(hits.is_empty());

        assert!(schema
            .applicable_indexes(2345, &attrs! { "num" => "four" })
            .is_err());
    }

    #[test]
    fn edges_stored_on_filters_by_type() {
        let schema = test_schema();
        assert_eq!(schema.edges_stored_on(2345).count(), 1);
        assert_eq!(schema.edges_stored_on(99).count(), 0);
    }

    #[test]
    fn parses_from_toml() {
        let text = r#"
            [[objects]]
            type_name = "Test"
            type_id = 1000

            [[indexes]]
            index_name = "num_index"
            indexed_type = "Test"
            indexed_attr = "num"
            index_type = "int"

            [[edges]]
            edge_name = "related_edge"
            edge_id = 12345
            stored_id_attr = "related_id"
            stored_on_type = "Test"
        "#;
        let schema: Schema = toml::from_str(text).unwrap();
        assert_eq!(schema.type_id_of("Test"), Some(1000));
        assert_eq!(schema.indexes().len(), 1);
        assert_eq!(schema.edges().len(), 1);

        let bad = r#"
            [[indexes]]
            index_name = "num_index"
            indexed_type = "Missing"
            indexed_attr = "num"
            index_type = "int"
        "#;
        assert!(toml::from_str::<Schema>(bad).is_err());
    }
}
