use std::fmt;

use serde::{Deserialize, Serialize};

use kvetch_types::Value;

use crate::definitions::{IndexDefinition, IndexType};
use crate::error::{SchemaError, SchemaResult};

/// A typed index key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexValue {
    Str(String),
    Int(i64),
}

impl IndexValue {
    /// Convert an attribute value into the key type `index` declares.
    pub fn from_value(index: &IndexDefinition, value: &Value) -> SchemaResult<Self> {
        match (index.index_type, value) {
            (IndexType::String, Value::String(s)) => Ok(IndexValue::Str(s.clone())),
            (IndexType::Int, Value::Int(v)) => Ok(IndexValue::Int(*v)),
            (expected, actual) => Err(SchemaError::IndexValueMismatch {
                index: index.index_name.clone(),
                expected: expected.as_str(),
                actual: actual.kind(),
            }),
        }
    }

    /// Check that a caller-supplied key matches the index's column type.
    pub fn check(&self, index: &IndexDefinition) -> SchemaResult<()> {
        let actual = match self {
            IndexValue::Str(_) => IndexType::String,
            IndexValue::Int(_) => IndexType::Int,
        };
        if actual == index.index_type {
            Ok(())
        } else {
            Err(SchemaError::IndexValueMismatch {
                index: index.index_name.clone(),
                expected: index.index_type.as_str(),
                actual: actual.as_str(),
            })
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Str(s) => write!(f, "{s:?}"),
            IndexValue::Int(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        IndexValue::Str(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        IndexValue::Str(v)
    }
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        IndexValue::Int(v)
    }
}

impl From<i32> for IndexValue {
    fn from(v: i32) -> Self {
        IndexValue::Int(v.into())
    }
}

impl From<IndexValue> for Value {
    fn from(v: IndexValue) -> Self {
        match v {
            IndexValue::Str(s) => Value::String(s),
            IndexValue::Int(i) => Value::Int(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{define_int_index, define_string_index};

    #[test]
    fn matching_types_convert() {
        let idx = define_int_index("num_index", "Test", "num");
        assert_eq!(IndexValue::from_value(&idx, &Value::Int(4)).unwrap(), IndexValue::Int(4));
        let idx = define_string_index("name_index", "Test", "name");
        assert_eq!(
            IndexValue::from_value(&idx, &Value::from("Joe")).unwrap(),
            IndexValue::from("Joe")
        );
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let idx = define_int_index("num_index", "Test", "num");
        let err = IndexValue::from_value(&idx, &Value::from("four")).unwrap_err();
        assert_eq!(
            err,
            SchemaError::IndexValueMismatch {
                index: "num_index".into(),
                expected: "int",
                actual: "string",
            }
        );
        assert!(IndexValue::from("x").check(&idx).is_err());
        assert!(IndexValue::from(1).check(&idx).is_ok());
    }
}
